use chrono::{DateTime, Duration, Utc};
use tessera_core::{TicketingError, TicketingResult};
use tessera_shared::Event;

/// Time rules for selling and admitting.
#[derive(Debug, Clone, Copy)]
pub struct SalesPolicy {
    /// How long after `starts_at` an event without `ends_at` keeps admitting.
    pub checkin_window: Duration,
}

impl SalesPolicy {
    pub fn new(checkin_window_hours: i64) -> Self {
        Self {
            checkin_window: Duration::hours(checkin_window_hours),
        }
    }

    /// Tickets may be sold only for active events that have not started.
    pub fn ensure_on_sale(&self, event: &Event, now: DateTime<Utc>) -> TicketingResult<()> {
        if !event.is_active {
            return Err(TicketingError::EventUnavailable(format!(
                "event {} is not active",
                event.id
            )));
        }
        if event.starts_at <= now {
            return Err(TicketingError::EventUnavailable(format!(
                "event {} has already started",
                event.id
            )));
        }
        Ok(())
    }

    pub fn ends_at(&self, event: &Event) -> DateTime<Utc> {
        event.ends_at.unwrap_or_else(|| {
            event
                .starts_at
                .checked_add_signed(self.checkin_window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    pub fn has_ended(&self, event: &Event, now: DateTime<Utc>) -> bool {
        now > self.ends_at(event)
    }
}

impl Default for SalesPolicy {
    fn default() -> Self {
        Self::new(24)
    }
}
