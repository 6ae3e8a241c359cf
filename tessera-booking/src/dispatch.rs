//! Fire-and-forget delivery of side effects.
//!
//! Issuance and validation enqueue a [`Notification`] and return at once. A
//! background worker fans each one out to the notifier and the attendance
//! log, retrying failed calls with exponential backoff. Nothing here can
//! fail or delay the request that produced the notification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::notify::{AttendanceLog, NotificationService};
use tessera_shared::{Booking, Ticket};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type SinkResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Deliveries (including their retry backoff) running concurrently.
pub const MAX_IN_FLIGHT: usize = 32;

#[derive(Debug, Clone)]
pub enum Notification {
    TicketsIssued {
        booking: Booking,
        tickets: Vec<Ticket>,
    },
    TicketValidated {
        ticket: Ticket,
        at: DateTime<Utc>,
    },
    IssuanceFailed {
        payment_reference: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    const MAX_BACKOFF: Duration = Duration::from_secs(30);

    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(Self::MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: Option<mpsc::Sender<Notification>>,
}

impl NotificationDispatcher {
    /// Start the delivery worker. At most [`MAX_IN_FLIGHT`] notifications are
    /// delivered at once; beyond that the queue fills and further dispatches
    /// are dropped. The returned handle finishes once every dispatcher clone
    /// has been dropped and all deliveries are done.
    pub fn spawn(
        notifier: Arc<dyn NotificationService>,
        attendance: Arc<dyn AttendanceLog>,
        policy: RetryPolicy,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        let in_flight = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

        let worker = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let Ok(permit) = in_flight.clone().acquire_owned().await else {
                    break;
                };
                let notifier = notifier.clone();
                let attendance = attendance.clone();
                tokio::spawn(async move {
                    deliver(notification, notifier, attendance, policy).await;
                    drop(permit);
                });
            }
            // Wait for the stragglers
            let _ = in_flight.acquire_many(MAX_IN_FLIGHT as u32).await;
            debug!("Notification queue closed");
        });

        (Self { tx: Some(tx) }, worker)
    }

    /// A dispatcher that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn dispatch(&self, notification: Notification) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(notification) {
            warn!("Dropping notification, queue unavailable: {}", e);
        }
    }
}

async fn deliver(
    notification: Notification,
    notifier: Arc<dyn NotificationService>,
    attendance: Arc<dyn AttendanceLog>,
    policy: RetryPolicy,
) {
    let notifier = &*notifier;
    let attendance = &*attendance;

    match &notification {
        Notification::TicketsIssued { booking, tickets } => {
            for ticket in tickets {
                with_retry("ticket_email", policy, move || {
                    notifier.send_ticket_email(booking, ticket)
                })
                .await;
                with_retry("attendance_issuance", policy, move || {
                    attendance.record_issuance(ticket)
                })
                .await;
            }
        }
        Notification::TicketValidated { ticket, at } => {
            with_retry("attendance_validation", policy, move || {
                attendance.record_validation(ticket, *at)
            })
            .await;
        }
        Notification::IssuanceFailed {
            payment_reference,
            reason,
        } => {
            with_retry("failure_alert", policy, move || {
                notifier.send_failure_alert(payment_reference, reason)
            })
            .await;
        }
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
pub async fn with_retry<F, Fut>(label: &str, policy: RetryPolicy, mut op: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SinkResult>,
{
    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(()) => return true,
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    label, attempt, policy.max_attempts, e
                );
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.backoff(attempt)).await;
                }
            }
        }
    }
    error!("{} abandoned after {} attempts", label, policy.max_attempts);
    false
}

/// Notifier that only writes to the log. Used when no mail gateway is configured.
pub struct TracingNotifier;

#[async_trait]
impl NotificationService for TracingNotifier {
    async fn send_ticket_email(&self, booking: &Booking, ticket: &Ticket) -> SinkResult {
        info!(
            booking_id = %booking.id,
            ticket_code = %ticket.ticket_code,
            recipient = %booking.attendee.email,
            "Ticket email sent"
        );
        Ok(())
    }

    async fn send_failure_alert(&self, payment_reference: &str, reason: &str) -> SinkResult {
        error!(payment_reference, reason, "ALERT: payment captured but tickets not issued");
        Ok(())
    }
}

pub struct TracingAttendanceLog;

#[async_trait]
impl AttendanceLog for TracingAttendanceLog {
    async fn record_issuance(&self, ticket: &Ticket) -> SinkResult {
        info!(ticket_code = %ticket.ticket_code, attendee = %ticket.attendee_name, "Attendance: issued");
        Ok(())
    }

    async fn record_validation(&self, ticket: &Ticket, at: DateTime<Utc>) -> SinkResult {
        info!(ticket_code = %ticket.ticket_code, at = %at, "Attendance: checked in");
        Ok(())
    }
}
