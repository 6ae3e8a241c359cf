use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tessera_catalog::SalesPolicy;
use tessera_core::repository::TicketStore;
use tessera_core::{TicketingError, TicketingResult};
use tessera_shared::{Ticket, ValidationOutcome};
use tracing::{error, info, warn};

use crate::codes;
use crate::dispatch::{Notification, NotificationDispatcher};

/// What the door scanner shows after a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub outcome: ValidationOutcome,
    pub ticket: Option<Ticket>,
    pub event_title: Option<String>,
}

impl ValidationResult {
    fn new(outcome: ValidationOutcome, ticket: Option<Ticket>, event_title: Option<String>) -> Self {
        Self {
            outcome,
            ticket,
            event_title,
        }
    }

    pub fn admitted(&self) -> bool {
        self.outcome.is_admitted()
    }
}

/// Door-side ticket state machine: `valid -> used` on admission, and the
/// administrative `valid -> cancelled`.
pub struct TicketValidator {
    store: Arc<dyn TicketStore>,
    dispatcher: NotificationDispatcher,
    policy: SalesPolicy,
}

impl TicketValidator {
    pub fn new(store: Arc<dyn TicketStore>, dispatcher: NotificationDispatcher, policy: SalesPolicy) -> Self {
        Self {
            store,
            dispatcher,
            policy,
        }
    }

    /// Admit the holder of `input` at most once.
    ///
    /// Every rejection is reported as an outcome; only malformed input and
    /// storage failures are errors.
    pub async fn validate(&self, input: &str, scanned_by: Option<&str>) -> TicketingResult<ValidationResult> {
        let code = codes::normalize(input)?;

        let Some(ticket) = self.store.find_by_code(&code).await? else {
            info!(ticket_code = %code, "Scan rejected: unknown code");
            return Ok(ValidationResult::new(ValidationOutcome::NotFound, None, None));
        };

        let event = self.store.get_event(ticket.event_id).await?;
        let title = event.as_ref().map(|e| e.title.clone());

        if let Some(outcome) = ValidationOutcome::for_spent(ticket.status) {
            info!(ticket_code = %code, outcome = outcome.as_str(), "Scan rejected");
            return Ok(ValidationResult::new(outcome, Some(ticket), title));
        }

        let Some(event) = event else {
            warn!(ticket_code = %code, event_id = %ticket.event_id, "Ticket references a missing event");
            return Ok(ValidationResult::new(ValidationOutcome::NotFound, Some(ticket), None));
        };

        let now = Utc::now();
        if self.policy.has_ended(&event, now) {
            info!(ticket_code = %code, event_id = %event.id, "Scan rejected: event ended");
            return Ok(ValidationResult::new(ValidationOutcome::EventEnded, Some(ticket), title));
        }

        match self.store.mark_used(&code, now, scanned_by).await? {
            Some(used) => {
                info!(ticket_code = %code, event_id = %event.id, scanned_by = scanned_by.unwrap_or("-"), "Ticket admitted");
                self.dispatcher.dispatch(Notification::TicketValidated {
                    ticket: used.clone(),
                    at: now,
                });
                Ok(ValidationResult::new(ValidationOutcome::Admitted, Some(used), title))
            }
            None => {
                // Lost a race with another scanner or an admin cancel.
                let current = self.store.find_by_code(&code).await?;
                let outcome = match &current {
                    Some(t) => ValidationOutcome::for_spent(t.status).unwrap_or(ValidationOutcome::AlreadyUsed),
                    None => ValidationOutcome::NotFound,
                };
                info!(ticket_code = %code, outcome = outcome.as_str(), "Scan rejected after concurrent update");
                Ok(ValidationResult::new(outcome, current, title))
            }
        }
    }

    /// Read-only lookup for the staff console.
    pub async fn lookup(&self, input: &str) -> TicketingResult<Option<Ticket>> {
        let code = codes::normalize(input)?;
        self.store.find_by_code(&code).await
    }

    /// Void a ticket that has not been used and return its seat to sale.
    pub async fn cancel(&self, input: &str) -> TicketingResult<Ticket> {
        let code = codes::normalize(input)?;

        match self.store.cancel_ticket(&code).await? {
            Some(ticket) => {
                if let Err(e) = self.store.release(ticket.event_id, 1).await {
                    error!(ticket_code = %code, "Cancelled ticket but failed to release seat: {}", e);
                }
                info!(ticket_code = %code, event_id = %ticket.event_id, "Ticket cancelled");
                Ok(ticket)
            }
            None => match self.store.find_by_code(&code).await? {
                Some(ticket) => Err(TicketingError::InvalidRequest(format!(
                    "ticket {} is {} and cannot be cancelled",
                    code, ticket.status
                ))),
                None => Err(TicketingError::NotFound(format!("ticket {}", code))),
            },
        }
    }
}
