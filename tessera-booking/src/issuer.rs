use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tessera_catalog::SalesPolicy;
use tessera_core::repository::{IssuanceCommit, TicketStore};
use tessera_core::{TicketingError, TicketingResult};
use tessera_shared::{Attendee, Booking, Event, PaymentStatus, Ticket};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::codes::generate_ticket_code;
use crate::dispatch::{Notification, NotificationDispatcher};
use crate::locks::KeyedLocks;

/// Everything needed to turn a confirmed payment into tickets.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub payment_reference: String,
    pub event_id: Uuid,
    pub quantity: u32,
    pub attendee: Attendee,
    pub additional_attendees: Vec<Attendee>,
    pub total_amount: i64,
    pub currency: String,
}

impl IssueRequest {
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            payment_reference: booking.payment_reference.clone(),
            event_id: booking.event_id,
            quantity: booking.quantity,
            attendee: booking.attendee.clone(),
            additional_attendees: booking.additional_attendees.clone(),
            total_amount: booking.total_amount,
            currency: booking.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Issued,
    /// The payment reference had already been honoured; nothing new was created.
    AlreadyIssued,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueOutcome {
    pub status: IssueStatus,
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
}

/// Turns a confirmed payment into exactly one paid booking and its tickets.
///
/// Calls for the same payment reference are serialized in-process; the store
/// enforces the same uniqueness across processes.
pub struct TicketIssuer {
    store: Arc<dyn TicketStore>,
    dispatcher: NotificationDispatcher,
    policy: SalesPolicy,
    locks: KeyedLocks,
}

impl TicketIssuer {
    pub fn new(store: Arc<dyn TicketStore>, dispatcher: NotificationDispatcher, policy: SalesPolicy) -> Self {
        Self {
            store,
            dispatcher,
            policy,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn issue_tickets(&self, request: IssueRequest) -> TicketingResult<IssueOutcome> {
        self.validate(&request)?;
        let reference = request.payment_reference.as_str();

        let _guard = self.locks.lock(reference).await;

        let prior = self.store.find_by_payment_reference(reference).await?;
        if let Some(booking) = prior.as_ref().filter(|b| b.is_paid()) {
            info!(payment_reference = reference, booking_id = %booking.id, "Payment already honoured");
            return self.existing(booking.clone()).await;
        }

        let event = match self.saleable_event(request.event_id).await {
            Ok(event) => event,
            Err(e) => {
                if let TicketingError::EventUnavailable(reason) = &e {
                    warn!(payment_reference = reference, event_id = %request.event_id, "Paid for an event no longer on sale");
                    self.dispatcher.dispatch(Notification::IssuanceFailed {
                        payment_reference: reference.to_string(),
                        reason: reason.clone(),
                    });
                }
                return Err(e);
            }
        };

        if !self.store.reserve(event.id, request.quantity).await? {
            warn!(
                payment_reference = reference,
                event_id = %event.id,
                requested = request.quantity,
                "Sold out after payment"
            );
            self.dispatcher.dispatch(Notification::IssuanceFailed {
                payment_reference: reference.to_string(),
                reason: format!("sold out: {} ticket(s) requested", request.quantity),
            });
            return Err(TicketingError::SoldOut {
                event_id: event.id,
                requested: request.quantity,
            });
        }

        let booking = paid_booking(&request, prior);
        let tickets: Vec<Ticket> = (0..request.quantity as usize)
            .map(|seat| {
                Ticket::new(
                    booking.id,
                    event.id,
                    generate_ticket_code(),
                    booking.attendee_name_for_seat(seat).to_string(),
                )
            })
            .collect();

        match self.store.commit_issuance(&booking, &tickets).await {
            Ok(IssuanceCommit::Committed) => {}
            Ok(IssuanceCommit::AlreadyPaid) => {
                // Another process won the race for this reference.
                self.compensate(event.id, request.quantity).await;
                let winner = self
                    .store
                    .find_by_payment_reference(reference)
                    .await?
                    .ok_or_else(|| {
                        TicketingError::Internal(format!("booking for {} vanished after commit", reference))
                    })?;
                return self.existing(winner).await;
            }
            Err(e) => {
                error!(payment_reference = reference, "Failed to persist issuance: {}", e);
                self.compensate(event.id, request.quantity).await;
                self.dispatcher.dispatch(Notification::IssuanceFailed {
                    payment_reference: reference.to_string(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        }

        info!(
            payment_reference = reference,
            booking_id = %booking.id,
            event_id = %event.id,
            tickets = tickets.len(),
            "Tickets issued"
        );
        self.dispatcher.dispatch(Notification::TicketsIssued {
            booking: booking.clone(),
            tickets: tickets.clone(),
        });

        Ok(IssueOutcome {
            status: IssueStatus::Issued,
            booking,
            tickets,
        })
    }

    async fn saleable_event(&self, event_id: Uuid) -> TicketingResult<Event> {
        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| TicketingError::EventUnavailable(format!("event {} does not exist", event_id)))?;
        self.policy.ensure_on_sale(&event, Utc::now())?;
        Ok(event)
    }

    fn validate(&self, request: &IssueRequest) -> TicketingResult<()> {
        if request.payment_reference.trim().is_empty() {
            return Err(TicketingError::InvalidRequest("payment reference is required".to_string()));
        }
        // The per-booking maximum is a checkout rule; paid orders are only
        // bounded by inventory.
        if request.quantity == 0 {
            return Err(TicketingError::InvalidRequest("quantity must be at least 1".to_string()));
        }
        if request.attendee.name.trim().is_empty() {
            return Err(TicketingError::InvalidRequest("attendee name is required".to_string()));
        }
        Ok(())
    }

    async fn existing(&self, booking: Booking) -> TicketingResult<IssueOutcome> {
        let tickets = self.store.tickets_for_booking(booking.id).await?;
        Ok(IssueOutcome {
            status: IssueStatus::AlreadyIssued,
            booking,
            tickets,
        })
    }

    async fn compensate(&self, event_id: Uuid, count: u32) {
        if let Err(e) = self.store.release(event_id, count).await {
            error!(event_id = %event_id, count, "Failed to release reserved seats: {}", e);
        }
    }
}

/// The booking row to persist: the checkout's pending booking when there is
/// one, otherwise a fresh booking built from the request.
fn paid_booking(request: &IssueRequest, prior: Option<Booking>) -> Booking {
    let mut booking = prior.unwrap_or_else(|| {
        Booking::pending(
            request.event_id,
            request.payment_reference.clone(),
            request.quantity,
            request.attendee.clone(),
            request.additional_attendees.clone(),
            request.total_amount,
            request.currency.clone(),
        )
    });
    booking.quantity = request.quantity;
    booking.payment_status = PaymentStatus::Paid;
    booking.updated_at = Utc::now();
    booking
}
