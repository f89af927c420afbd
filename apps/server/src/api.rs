use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::main_lib::AppState;

mod consensus;
mod health;

pub fn app_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    let api = Router::new().merge(consensus::router());

    Router::new()
        .nest("/api/v1", api)
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
