use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TicketIssuedEvent {
    pub ticket_id: Uuid,
    pub booking_id: Uuid,
    pub event_id: Uuid,
    pub ticket_code: String,
    pub attendee_name: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TicketValidatedEvent {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub ticket_code: String,
    pub attendee_name: String,
    pub validated_by: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct IssuanceFailedEvent {
    pub payment_reference: String,
    pub reason: String,
    pub timestamp: i64,
}
