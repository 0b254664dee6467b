use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Engine-level error taxonomy.
///
/// `Configuration` and `Validation` are client-correctable; `Generation`
/// signals an unusable upstream generator; `Persistence` is always fatal and
/// is never retried here (retry policy, if any, belongs to the store).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid quiz configuration: {0}")]
    Configuration(String),

    #[error("question generation failed: {0}")]
    Generation(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("not authorized to access this resource")]
    Forbidden,

    #[error("storage error: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Configuration(_) | EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Generation(_) => StatusCode::BAD_GATEWAY,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Forbidden => StatusCode::FORBIDDEN,
            EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Storage failures are logged in full but surfaced opaquely.
            EngineError::Persistence(source) => {
                tracing::error!("persistence failure: {:#}", source);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<mongodb::error::Error> for EngineError {
    fn from(err: mongodb::error::Error) -> Self {
        EngineError::Persistence(anyhow::Error::new(err))
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        EngineError::Persistence(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Persistence(anyhow::Error::new(err))
    }
}
