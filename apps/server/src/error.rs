use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Respuesta mal formada: {0}")]
    MalformedPayload(String),

    /// Some of the submission inserts failed; the ones listed in `written`
    /// are already stored.
    #[error("No se pudieron guardar todas las respuestas")]
    PartialWrite {
        written: Vec<String>,
        failed: Vec<String>,
    },

    #[error("Sincronización no disponible: {0}")]
    MirrorUnavailable(String),

    #[error("Error interno: {0}")]
    Internal(String),
}

impl From<bienestar_core::Error> for ApiError {
    fn from(err: bienestar_core::Error) -> Self {
        match err {
            bienestar_core::Error::MalformedPayload(message) => Self::MalformedPayload(message),
            bienestar_core::Error::Json(e) => Self::MalformedPayload(e.to_string()),
            bienestar_core::Error::Config(message) => Self::MirrorUnavailable(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PartialWrite { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::MirrorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = match &self {
            ApiError::PartialWrite { written, failed } => json!({
                "mensaje": self.to_string(),
                "escritas": written,
                "fallidas": failed,
            }),
            _ => json!({ "mensaje": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
