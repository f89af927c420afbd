use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quorum_market_data::InvalidSymbolError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
}

impl From<InvalidSymbolError> for ApiError {
    fn from(error: InvalidSymbolError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        tracing::debug!("Rejected request: {}", self);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
