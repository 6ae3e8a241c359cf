use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Valid,
    Used,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Valid => "valid",
            TicketStatus::Used => "used",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(TicketStatus::Valid),
            "used" => Ok(TicketStatus::Used),
            "cancelled" => Ok(TicketStatus::Cancelled),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

/// Admission for one seat. Never deleted; `used` and `cancelled` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub event_id: Uuid,
    /// Opaque code embedded in the QR image, sole input to validation.
    pub ticket_code: String,
    pub attendee_name: String,
    pub status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
    pub validated_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(booking_id: Uuid, event_id: Uuid, ticket_code: String, attendee_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            event_id,
            ticket_code,
            attendee_name,
            status: TicketStatus::Valid,
            used_at: None,
            validated_by: None,
            created_at: Utc::now(),
        }
    }

    /// Mark as used (door scan). Callers must have checked the ticket was valid.
    pub fn mark_used(&mut self, at: DateTime<Utc>, validated_by: Option<String>) {
        self.status = TicketStatus::Used;
        self.used_at = Some(at);
        self.validated_by = validated_by;
    }
}

/// Result of presenting a ticket code at the door.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// The scan admitted the holder; the ticket is now `used`.
    #[serde(rename = "used")]
    Admitted,
    AlreadyUsed,
    Cancelled,
    EventEnded,
    NotFound,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Admitted => "used",
            ValidationOutcome::AlreadyUsed => "already_used",
            ValidationOutcome::Cancelled => "cancelled",
            ValidationOutcome::EventEnded => "event_ended",
            ValidationOutcome::NotFound => "not_found",
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, ValidationOutcome::Admitted)
    }

    /// Rejection reason for a ticket that is no longer `valid`.
    pub fn for_spent(status: TicketStatus) -> Option<Self> {
        match status {
            TicketStatus::Valid => None,
            TicketStatus::Used => Some(ValidationOutcome::AlreadyUsed),
            TicketStatus::Cancelled => Some(ValidationOutcome::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_names() {
        assert_eq!(
            serde_json::to_string(&ValidationOutcome::Admitted).unwrap(),
            "\"used\""
        );
        assert_eq!(
            serde_json::to_string(&ValidationOutcome::AlreadyUsed).unwrap(),
            "\"already_used\""
        );
        assert_eq!(ValidationOutcome::EventEnded.as_str(), "event_ended");
    }

    #[test]
    fn test_spent_ticket_reasons() {
        assert_eq!(ValidationOutcome::for_spent(TicketStatus::Valid), None);
        assert_eq!(
            ValidationOutcome::for_spent(TicketStatus::Used),
            Some(ValidationOutcome::AlreadyUsed)
        );
        assert_eq!(
            ValidationOutcome::for_spent(TicketStatus::Cancelled),
            Some(ValidationOutcome::Cancelled)
        );
    }

    #[test]
    fn test_mark_used() {
        let mut ticket = Ticket::new(Uuid::new_v4(), Uuid::new_v4(), "TKT-1".into(), "Ada".into());
        let now = Utc::now();
        ticket.mark_used(now, Some("worker-7".into()));

        assert_eq!(ticket.status, TicketStatus::Used);
        assert_eq!(ticket.used_at, Some(now));
        assert_eq!(ticket.validated_by.as_deref(), Some("worker-7"));
    }
}
