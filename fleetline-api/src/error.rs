use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fleetline_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::InvalidInterval(_) => AppError::ValidationError(message),
            CoreError::ResourceUnavailable { .. }
            | CoreError::TripLocked { .. }
            | CoreError::ResourceInUse { .. }
            | CoreError::InvalidTransition { .. } => AppError::ConflictError(message),
            CoreError::ResourceNotFound { .. } | CoreError::TripNotFound(_) => {
                AppError::NotFoundError(message)
            }
            CoreError::PersistenceFailure(_) | CoreError::PartialReconciliationFailure(_) => {
                AppError::InternalServerError(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
