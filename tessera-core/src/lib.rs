pub mod notify;
pub mod payment;
pub mod repository;
pub mod webhook;

use uuid::Uuid;

/// Error taxonomy shared by the issuance and validation workflow.
///
/// Idempotent replays and negative validation outcomes are not errors; they
/// are reported through `IssueStatus` and `ValidationOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum TicketingError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Event unavailable: {0}")]
    EventUnavailable(String),
    #[error("Sold out: {requested} ticket(s) requested for event {event_id}")]
    SoldOut { event_id: Uuid, requested: u32 },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Payment not completed: {0}")]
    PaymentIncomplete(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl TicketingError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            TicketingError::InvalidRequest(_) => "invalid_request",
            TicketingError::EventUnavailable(_) => "event_unavailable",
            TicketingError::SoldOut { .. } => "sold_out",
            TicketingError::NotFound(_) => "not_found",
            TicketingError::PaymentIncomplete(_) => "payment_incomplete",
            TicketingError::Gateway(_) => "gateway_error",
            TicketingError::Storage(_) => "storage_error",
            TicketingError::Internal(_) => "internal_error",
        }
    }
}

pub type TicketingResult<T> = Result<T, TicketingError>;
