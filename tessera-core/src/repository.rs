use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessera_shared::{Booking, Event, PaymentStatus, Ticket};
use uuid::Uuid;

use crate::TicketingResult;

/// Per-event seat counter. Both operations are a single atomic
/// read-modify-write against the backing store.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Take `count` seats if at least that many remain. Returns `false`
    /// without touching the counter otherwise.
    async fn reserve(&self, event_id: Uuid, count: u32) -> TicketingResult<bool>;

    /// Give back `count` seats, never exceeding the event's total.
    async fn release(&self, event_id: Uuid, count: u32) -> TicketingResult<()>;
}

/// Repository trait for event data access
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create_event(&self, event: &Event) -> TicketingResult<()>;

    async fn get_event(&self, id: Uuid) -> TicketingResult<Option<Event>>;

    async fn list_events(&self) -> TicketingResult<Vec<Event>>;
}

/// Outcome of persisting an issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceCommit {
    Committed,
    /// Another writer had already marked this payment reference paid.
    AlreadyPaid,
}

/// Repository trait for booking data access
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Store a booking awaiting payment. The payment reference must be unused.
    async fn save_pending(&self, booking: &Booking) -> TicketingResult<()>;

    async fn get_booking(&self, id: Uuid) -> TicketingResult<Option<Booking>>;

    async fn find_by_payment_reference(&self, reference: &str) -> TicketingResult<Option<Booking>>;

    /// Move a booking that is not yet paid to `status`. Returns `false` when
    /// the booking is missing or already paid.
    async fn mark_unpaid_status(&self, reference: &str, status: PaymentStatus) -> TicketingResult<bool>;

    /// Persist `booking` as paid together with `tickets` as one unit.
    /// Either everything is written or nothing is.
    async fn commit_issuance(&self, booking: &Booking, tickets: &[Ticket]) -> TicketingResult<IssuanceCommit>;
}

/// Repository trait for ticket data access
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn tickets_for_booking(&self, booking_id: Uuid) -> TicketingResult<Vec<Ticket>>;

    async fn find_by_code(&self, code: &str) -> TicketingResult<Option<Ticket>>;

    /// Conditional `valid -> used`. Returns the updated ticket, or `None` if
    /// no valid ticket with that code exists.
    async fn mark_used(
        &self,
        code: &str,
        used_at: DateTime<Utc>,
        validated_by: Option<&str>,
    ) -> TicketingResult<Option<Ticket>>;

    /// Conditional `valid -> cancelled`.
    async fn cancel_ticket(&self, code: &str) -> TicketingResult<Option<Ticket>>;
}

/// Everything the issuance and validation workflow needs from storage.
pub trait TicketStore: InventoryLedger + EventRepository + BookingRepository + TicketRepository {}

impl<T> TicketStore for T where T: InventoryLedger + EventRepository + BookingRepository + TicketRepository {}
