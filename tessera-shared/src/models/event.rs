use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A ticketed event. `available_tickets` is only ever changed through the
/// inventory ledger and stays within `0..=total_tickets`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub venue: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    /// Price per ticket in minor currency units.
    pub price: i64,
    pub currency: String,
    pub total_tickets: u32,
    pub available_tickets: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        title: String,
        starts_at: DateTime<Utc>,
        price: i64,
        currency: String,
        total_tickets: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            venue: None,
            starts_at,
            ends_at: None,
            price,
            currency,
            total_tickets,
            available_tickets: total_tickets,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn sold_tickets(&self) -> u32 {
        self.total_tickets.saturating_sub(self.available_tickets)
    }
}
