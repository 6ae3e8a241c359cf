use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tessera_core::repository::{
    BookingRepository, EventRepository, IssuanceCommit, InventoryLedger, TicketRepository,
};
use tessera_core::{TicketingError, TicketingResult};
use tessera_shared::{Attendee, Booking, Event, PaymentStatus, Ticket, TicketStatus};
use tracing::warn;
use uuid::Uuid;

/// PostgreSQL-backed store. Every state transition is a single conditional
/// statement, so concurrent processes cannot oversell or double-admit.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(e: sqlx::Error) -> TicketingError {
    TicketingError::Storage(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn to_db_count(count: u32) -> TicketingResult<i32> {
    i32::try_from(count).map_err(|_| TicketingError::InvalidRequest(format!("count {} out of range", count)))
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    title: String,
    venue: Option<String>,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    price: i64,
    currency: String,
    total_tickets: i32,
    available_tickets: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            title: row.title,
            venue: row.venue,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            price: row.price,
            currency: row.currency,
            total_tickets: row.total_tickets.max(0) as u32,
            available_tickets: row.available_tickets.max(0) as u32,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    event_id: Uuid,
    payment_reference: String,
    quantity: i32,
    attendee: Json<Attendee>,
    additional_attendees: Json<Vec<Attendee>>,
    total_amount: i64,
    currency: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = TicketingError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let payment_status = row
            .payment_status
            .parse::<PaymentStatus>()
            .map_err(TicketingError::Storage)?;
        Ok(Booking {
            id: row.id,
            event_id: row.event_id,
            payment_reference: row.payment_reference,
            quantity: row.quantity.max(0) as u32,
            attendee: row.attendee.0,
            additional_attendees: row.additional_attendees.0,
            total_amount: row.total_amount,
            currency: row.currency,
            payment_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    booking_id: Uuid,
    event_id: Uuid,
    ticket_code: String,
    attendee_name: String,
    status: String,
    used_at: Option<DateTime<Utc>>,
    validated_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = TicketingError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<TicketStatus>().map_err(TicketingError::Storage)?;
        Ok(Ticket {
            id: row.id,
            booking_id: row.booking_id,
            event_id: row.event_id,
            ticket_code: row.ticket_code,
            attendee_name: row.attendee_name,
            status,
            used_at: row.used_at,
            validated_by: row.validated_by,
            created_at: row.created_at,
        })
    }
}

const EVENT_COLUMNS: &str = "id, title, venue, starts_at, ends_at, price, currency, total_tickets, \
     available_tickets, is_active, created_at";
const BOOKING_COLUMNS: &str = "id, event_id, payment_reference, quantity, attendee, additional_attendees, \
     total_amount, currency, payment_status, created_at, updated_at";
const TICKET_COLUMNS: &str = "id, booking_id, event_id, ticket_code, attendee_name, status, used_at, \
     validated_by, created_at";

impl PgStore {
    async fn event_exists(&self, event_id: Uuid) -> TicketingResult<bool> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(exists)
    }
}

#[async_trait]
impl InventoryLedger for PgStore {
    async fn reserve(&self, event_id: Uuid, count: u32) -> TicketingResult<bool> {
        let count = to_db_count(count)?;
        let result = sqlx::query(
            "UPDATE events SET available_tickets = available_tickets - $2 \
             WHERE id = $1 AND available_tickets >= $2",
        )
        .bind(event_id)
        .bind(count)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.event_exists(event_id).await? {
            return Err(TicketingError::NotFound(format!("inventory for event {}", event_id)));
        }
        Ok(false)
    }

    async fn release(&self, event_id: Uuid, count: u32) -> TicketingResult<()> {
        let count = to_db_count(count)?;
        let result = sqlx::query(
            "UPDATE events SET available_tickets = LEAST(total_tickets, available_tickets + $2) \
             WHERE id = $1",
        )
        .bind(event_id)
        .bind(count)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(TicketingError::NotFound(format!("inventory for event {}", event_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl EventRepository for PgStore {
    async fn create_event(&self, event: &Event) -> TicketingResult<()> {
        if event.available_tickets > event.total_tickets {
            return Err(TicketingError::InvalidRequest(
                "available tickets exceed total".to_string(),
            ));
        }

        sqlx::query(
            "INSERT INTO events (id, title, venue, starts_at, ends_at, price, currency, total_tickets, \
             available_tickets, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.venue)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .bind(event.price)
        .bind(&event.currency)
        .bind(to_db_count(event.total_tickets)?)
        .bind(to_db_count(event.available_tickets)?)
        .bind(event.is_active)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TicketingError::InvalidRequest(format!("event {} already exists", event.id))
            } else {
                storage(e)
            }
        })?;
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> TicketingResult<Option<Event>> {
        let row: Option<EventRow> = sqlx::query_as(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(Event::from))
    }

    async fn list_events(&self) -> TicketingResult<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM events ORDER BY starts_at",
            EVENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.into_iter().map(Event::from).collect())
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn save_pending(&self, booking: &Booking) -> TicketingResult<()> {
        sqlx::query(
            "INSERT INTO bookings (id, event_id, payment_reference, quantity, attendee, additional_attendees, \
             total_amount, currency, payment_status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(booking.id)
        .bind(booking.event_id)
        .bind(&booking.payment_reference)
        .bind(to_db_count(booking.quantity)?)
        .bind(Json(&booking.attendee))
        .bind(Json(&booking.additional_attendees))
        .bind(booking.total_amount)
        .bind(&booking.currency)
        .bind(booking.payment_status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TicketingError::InvalidRequest(format!(
                    "payment reference {} is already in use",
                    booking.payment_reference
                ))
            } else {
                storage(e)
            }
        })?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> TicketingResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_by_payment_reference(&self, reference: &str) -> TicketingResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE payment_reference = $1",
            BOOKING_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.map(Booking::try_from).transpose()
    }

    async fn mark_unpaid_status(&self, reference: &str, status: PaymentStatus) -> TicketingResult<bool> {
        if status == PaymentStatus::Paid {
            return Err(TicketingError::Internal("paid status is set by issuance only".to_string()));
        }
        let result = sqlx::query(
            "UPDATE bookings SET payment_status = $2, updated_at = NOW() \
             WHERE payment_reference = $1 AND payment_status <> 'paid'",
        )
        .bind(reference)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit_issuance(&self, booking: &Booking, tickets: &[Ticket]) -> TicketingResult<IssuanceCommit> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        // Upsert that refuses to touch a booking which is already paid.
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            "INSERT INTO bookings (id, event_id, payment_reference, quantity, attendee, additional_attendees, \
             total_amount, currency, payment_status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'paid', $9, $10) \
             ON CONFLICT (payment_reference) DO UPDATE \
             SET payment_status = 'paid', quantity = EXCLUDED.quantity, updated_at = EXCLUDED.updated_at \
             WHERE bookings.payment_status <> 'paid' \
             RETURNING id",
        )
        .bind(booking.id)
        .bind(booking.event_id)
        .bind(&booking.payment_reference)
        .bind(to_db_count(booking.quantity)?)
        .bind(Json(&booking.attendee))
        .bind(Json(&booking.additional_attendees))
        .bind(booking.total_amount)
        .bind(&booking.currency)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let Some((booking_id,)) = claimed else {
            tx.rollback().await.map_err(storage)?;
            return Ok(IssuanceCommit::AlreadyPaid);
        };
        if booking_id != booking.id {
            tx.rollback().await.map_err(storage)?;
            return Err(TicketingError::Internal(format!(
                "payment reference {} belongs to booking {}",
                booking.payment_reference, booking_id
            )));
        }

        for ticket in tickets {
            sqlx::query(
                "INSERT INTO tickets (id, booking_id, event_id, ticket_code, attendee_name, status, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(ticket.id)
            .bind(ticket.booking_id)
            .bind(ticket.event_id)
            .bind(&ticket.ticket_code)
            .bind(&ticket.attendee_name)
            .bind(ticket.status.as_str())
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    warn!(ticket_code = %ticket.ticket_code, "Ticket code collision");
                }
                storage(e)
            })?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(IssuanceCommit::Committed)
    }
}

#[async_trait]
impl TicketRepository for PgStore {
    async fn tickets_for_booking(&self, booking_id: Uuid) -> TicketingResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE booking_id = $1 ORDER BY created_at, ticket_code",
            TICKET_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn find_by_code(&self, code: &str) -> TicketingResult<Option<Ticket>> {
        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {} FROM tickets WHERE ticket_code = $1", TICKET_COLUMNS))
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        row.map(Ticket::try_from).transpose()
    }

    async fn mark_used(
        &self,
        code: &str,
        used_at: DateTime<Utc>,
        validated_by: Option<&str>,
    ) -> TicketingResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "UPDATE tickets SET status = 'used', used_at = $2, validated_by = $3 \
             WHERE ticket_code = $1 AND status = 'valid' RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(code)
        .bind(used_at)
        .bind(validated_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.map(Ticket::try_from).transpose()
    }

    async fn cancel_ticket(&self, code: &str) -> TicketingResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "UPDATE tickets SET status = 'cancelled' \
             WHERE ticket_code = $1 AND status = 'valid' RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.map(Ticket::try_from).transpose()
    }
}
