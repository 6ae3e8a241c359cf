use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessera_shared::{Booking, Ticket};

/// Delivers ticket emails and operator alerts. Best effort: callers log
/// failures and never propagate them.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_ticket_email(
        &self,
        booking: &Booking,
        ticket: &Ticket,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Raised when money was taken but tickets could not be issued.
    async fn send_failure_alert(
        &self,
        payment_reference: &str,
        reason: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// External attendance tracking (the sheet the door team works from).
#[async_trait]
pub trait AttendanceLog: Send + Sync {
    async fn record_issuance(&self, ticket: &Ticket) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn record_validation(
        &self,
        ticket: &Ticket,
        at: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
