use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};
use tessera_catalog::InMemoryInventory;
use tessera_core::repository::{
    BookingRepository, EventRepository, IssuanceCommit, InventoryLedger, TicketRepository,
};
use tessera_core::{TicketingError, TicketingResult};
use tessera_shared::{Booking, Event, PaymentStatus, Ticket, TicketStatus};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    bookings: HashMap<Uuid, Booking>,
    by_reference: HashMap<String, Uuid>,
    tickets: HashMap<String, Ticket>,
    by_booking: HashMap<Uuid, Vec<String>>,
}

/// Single-process store for development and tests.
///
/// Bookings and tickets share one mutex so an issuance commit is all or
/// nothing. Seat counts live in lock-free counters and are overlaid onto
/// events on read.
pub struct MemoryStore {
    inventory: InMemoryInventory,
    events: RwLock<HashMap<Uuid, Event>>,
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inventory: InMemoryInventory::new(),
            events: RwLock::new(HashMap::new()),
            tables: Mutex::new(Tables::default()),
        }
    }

    fn tables(&self) -> TicketingResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| TicketingError::Storage("memory store lock poisoned".to_string()))
    }

    fn with_live_count(&self, mut event: Event) -> Event {
        if let Some(level) = self.inventory.level(&event.id) {
            event.available_tickets = level.available;
        }
        event
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn reserve(&self, event_id: Uuid, count: u32) -> TicketingResult<bool> {
        self.inventory.reserve(event_id, count).await
    }

    async fn release(&self, event_id: Uuid, count: u32) -> TicketingResult<()> {
        self.inventory.release(event_id, count).await
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn create_event(&self, event: &Event) -> TicketingResult<()> {
        let mut events = self
            .events
            .write()
            .map_err(|_| TicketingError::Storage("memory store lock poisoned".to_string()))?;
        if events.contains_key(&event.id) {
            return Err(TicketingError::InvalidRequest(format!("event {} already exists", event.id)));
        }
        self.inventory
            .initialize(event.id, event.total_tickets, event.available_tickets)?;
        events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> TicketingResult<Option<Event>> {
        let event = self
            .events
            .read()
            .map_err(|_| TicketingError::Storage("memory store lock poisoned".to_string()))?
            .get(&id)
            .cloned();
        Ok(event.map(|e| self.with_live_count(e)))
    }

    async fn list_events(&self) -> TicketingResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .map_err(|_| TicketingError::Storage("memory store lock poisoned".to_string()))?
            .values()
            .cloned()
            .collect();
        events.sort_by_key(|e| e.starts_at);
        Ok(events.into_iter().map(|e| self.with_live_count(e)).collect())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn save_pending(&self, booking: &Booking) -> TicketingResult<()> {
        let mut tables = self.tables()?;
        if tables.by_reference.contains_key(&booking.payment_reference) {
            return Err(TicketingError::InvalidRequest(format!(
                "payment reference {} is already in use",
                booking.payment_reference
            )));
        }
        tables
            .by_reference
            .insert(booking.payment_reference.clone(), booking.id);
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> TicketingResult<Option<Booking>> {
        Ok(self.tables()?.bookings.get(&id).cloned())
    }

    async fn find_by_payment_reference(&self, reference: &str) -> TicketingResult<Option<Booking>> {
        let tables = self.tables()?;
        Ok(tables
            .by_reference
            .get(reference)
            .and_then(|id| tables.bookings.get(id))
            .cloned())
    }

    async fn mark_unpaid_status(&self, reference: &str, status: PaymentStatus) -> TicketingResult<bool> {
        if status == PaymentStatus::Paid {
            return Err(TicketingError::Internal("paid status is set by issuance only".to_string()));
        }
        let mut tables = self.tables()?;
        let Some(id) = tables.by_reference.get(reference).copied() else {
            return Ok(false);
        };
        match tables.bookings.get_mut(&id) {
            Some(booking) if !booking.is_paid() => {
                booking.payment_status = status;
                booking.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit_issuance(&self, booking: &Booking, tickets: &[Ticket]) -> TicketingResult<IssuanceCommit> {
        let mut tables = self.tables()?;

        if let Some(existing_id) = tables.by_reference.get(&booking.payment_reference).copied() {
            let existing = tables.bookings.get(&existing_id);
            if existing.is_some_and(|b| b.is_paid()) {
                return Ok(IssuanceCommit::AlreadyPaid);
            }
            if existing_id != booking.id {
                return Err(TicketingError::Internal(format!(
                    "payment reference {} belongs to booking {}",
                    booking.payment_reference, existing_id
                )));
            }
        }

        // Check everything before writing anything.
        for ticket in tickets {
            if tables.tickets.contains_key(&ticket.ticket_code) {
                return Err(TicketingError::Storage(format!(
                    "duplicate ticket code {}",
                    ticket.ticket_code
                )));
            }
        }

        let mut paid = booking.clone();
        paid.payment_status = PaymentStatus::Paid;
        tables
            .by_reference
            .insert(paid.payment_reference.clone(), paid.id);
        tables.bookings.insert(paid.id, paid);

        let codes = tables.by_booking.entry(booking.id).or_default();
        codes.extend(tickets.iter().map(|t| t.ticket_code.clone()));
        for ticket in tickets {
            tables.tickets.insert(ticket.ticket_code.clone(), ticket.clone());
        }

        Ok(IssuanceCommit::Committed)
    }
}

#[async_trait]
impl TicketRepository for MemoryStore {
    async fn tickets_for_booking(&self, booking_id: Uuid) -> TicketingResult<Vec<Ticket>> {
        let tables = self.tables()?;
        Ok(tables
            .by_booking
            .get(&booking_id)
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(|code| tables.tickets.get(code).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_by_code(&self, code: &str) -> TicketingResult<Option<Ticket>> {
        Ok(self.tables()?.tickets.get(code).cloned())
    }

    async fn mark_used(
        &self,
        code: &str,
        used_at: DateTime<Utc>,
        validated_by: Option<&str>,
    ) -> TicketingResult<Option<Ticket>> {
        let mut tables = self.tables()?;
        match tables.tickets.get_mut(code) {
            Some(ticket) if ticket.status == TicketStatus::Valid => {
                ticket.mark_used(used_at, validated_by.map(str::to_string));
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn cancel_ticket(&self, code: &str) -> TicketingResult<Option<Ticket>> {
        let mut tables = self.tables()?;
        match tables.tickets.get_mut(code) {
            Some(ticket) if ticket.status == TicketStatus::Valid => {
                ticket.status = TicketStatus::Cancelled;
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }
}
