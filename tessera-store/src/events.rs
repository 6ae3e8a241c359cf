use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tessera_core::notify::{AttendanceLog, NotificationService};
use tessera_shared::models::events::{IssuanceFailedEvent, TicketIssuedEvent, TicketValidatedEvent};
use tessera_shared::{Booking, Ticket};
use tracing::{error, info};

pub const TOPIC_TICKET_DELIVERY: &str = "tickets.delivery";
pub const TOPIC_ATTENDANCE_ISSUED: &str = "attendance.issued";
pub const TOPIC_ATTENDANCE_CHECKED_IN: &str = "attendance.checked_in";
pub const TOPIC_ISSUANCE_FAILED: &str = "alerts.issuance_failed";

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }

    async fn publish_json<T: serde::Serialize>(
        &self,
        topic: &str,
        key: &str,
        event: &T,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(event)?;
        self.publish(topic, key, &payload).await?;
        Ok(())
    }
}

fn issued_event(ticket: &Ticket) -> TicketIssuedEvent {
    TicketIssuedEvent {
        ticket_id: ticket.id,
        booking_id: ticket.booking_id,
        event_id: ticket.event_id,
        ticket_code: ticket.ticket_code.clone(),
        attendee_name: ticket.attendee_name.clone(),
        timestamp: Utc::now().timestamp(),
    }
}

/// Hands ticket delivery and alerts to downstream consumers (mailer, on-call).
pub struct KafkaNotifier {
    producer: EventProducer,
}

impl KafkaNotifier {
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl NotificationService for KafkaNotifier {
    async fn send_ticket_email(
        &self,
        booking: &Booking,
        ticket: &Ticket,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.producer
            .publish_json(TOPIC_TICKET_DELIVERY, &booking.id.to_string(), &issued_event(ticket))
            .await
    }

    async fn send_failure_alert(
        &self,
        payment_reference: &str,
        reason: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let event = IssuanceFailedEvent {
            payment_reference: payment_reference.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        self.producer
            .publish_json(TOPIC_ISSUANCE_FAILED, payment_reference, &event)
            .await
    }
}

pub struct KafkaAttendanceLog {
    producer: EventProducer,
}

impl KafkaAttendanceLog {
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl AttendanceLog for KafkaAttendanceLog {
    async fn record_issuance(&self, ticket: &Ticket) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.producer
            .publish_json(TOPIC_ATTENDANCE_ISSUED, &ticket.event_id.to_string(), &issued_event(ticket))
            .await
    }

    async fn record_validation(
        &self,
        ticket: &Ticket,
        at: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let event = TicketValidatedEvent {
            ticket_id: ticket.id,
            event_id: ticket.event_id,
            ticket_code: ticket.ticket_code.clone(),
            attendee_name: ticket.attendee_name.clone(),
            validated_by: ticket.validated_by.clone(),
            timestamp: at.timestamp(),
        };
        self.producer
            .publish_json(TOPIC_ATTENDANCE_CHECKED_IN, &ticket.event_id.to_string(), &event)
            .await
    }
}
