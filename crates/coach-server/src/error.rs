//! Error types and HTTP error responses for the coach API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Application-level error type.
#[derive(Debug)]
pub enum ApiError {
    /// The request was malformed or failed validation.
    BadRequest(String),
    /// The services have not finished initializing.
    NotReady,
    /// The LLM API or the vector store failed.
    Upstream(String),
    /// Anything else.
    Internal(String),
}

/// JSON body returned on error.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Solicitud inválida", Some(msg)),
            ApiError::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                "El servicio aún no está listo. Por favor, intenta de nuevo en unos momentos.",
                None,
            ),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "Error del servicio externo", Some(msg)),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error interno del servidor",
                Some(msg),
            ),
        };

        let body = ErrorBody {
            error: error.to_string(),
            detail,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl ApiError {
    /// Map a service failure: upstream API errors become 502, the rest 500.
    pub fn from_service(e: anyhow::Error) -> Self {
        let message = format!("{:#}", e);
        if message.contains("API error") || message.contains("Qdrant") {
            ApiError::Upstream(message)
        } else {
            ApiError::Internal(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_upstream_classification() {
        let err = ApiError::from_service(anyhow!("Chat API error 429: rate limited"));
        assert!(matches!(err, ApiError::Upstream(_)));

        let err = ApiError::from_service(anyhow!("something else broke"));
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
