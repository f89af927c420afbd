use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use quorum_market_data::{ConsensusResult, SourceStatus};

use crate::{error::ApiResult, main_lib::AppState};

/// Best available consensus for one symbol.
async fn get_consensus(
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ConsensusResult>> {
    let result = state.consensus_service.get_consensus(&symbol).await?;
    Ok(Json(result))
}

async fn get_source_status(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, SourceStatus>> {
    Json(state.consensus_service.get_source_status())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/consensus/{symbol}", get(get_consensus))
        .route("/sources", get(get_source_status))
}
