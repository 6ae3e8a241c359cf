use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tessera_core::TicketingError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error(transparent)]
    Ticketing(#[from] TicketingError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// HTTP status for each ticketing failure
pub fn status_for(err: &TicketingError) -> StatusCode {
    match err {
        TicketingError::InvalidRequest(_) | TicketingError::EventUnavailable(_) => StatusCode::BAD_REQUEST,
        TicketingError::SoldOut { .. } => StatusCode::CONFLICT,
        TicketingError::NotFound(_) => StatusCode::NOT_FOUND,
        TicketingError::PaymentIncomplete(_) => StatusCode::PAYMENT_REQUIRED,
        TicketingError::Gateway(_) => StatusCode::BAD_GATEWAY,
        TicketingError::Storage(_) | TicketingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Ticketing(err) => {
                let status = status_for(&err);
                if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
                    tracing::error!("Internal Server Error: {}", err);
                    (status, err.code(), "Internal Server Error".to_string())
                } else {
                    if status == StatusCode::BAD_GATEWAY {
                        tracing::warn!("Payment gateway failure: {}", err);
                    }
                    (status, err.code(), err.to_string())
                }
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
