use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_catalog::SalesPolicy;
use tessera_core::payment::{IntentStatus, PaymentIntent, WebhookEvent, WebhookEventKind};
use tessera_core::repository::TicketStore;
use tessera_core::{TicketingError, TicketingResult};
use tessera_shared::{Attendee, Booking, PaymentStatus};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::{Notification, NotificationDispatcher};
use crate::issuer::{IssueOutcome, IssueRequest, TicketIssuer};
use crate::orchestrator::PaymentOrchestrator;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub event_id: Uuid,
    pub quantity: u32,
    pub attendee: Attendee,
    #[serde(default)]
    pub additional_attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub booking: Booking,
    /// Handed to the client-side payment form.
    pub client_secret: Option<String>,
}

/// Purchase flow around the issuer: opens payment intents, confirms them
/// against the gateway, and reacts to gateway webhooks.
pub struct CheckoutService {
    store: Arc<dyn TicketStore>,
    payments: Arc<PaymentOrchestrator>,
    issuer: Arc<TicketIssuer>,
    dispatcher: NotificationDispatcher,
    policy: SalesPolicy,
    max_per_booking: u32,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        payments: Arc<PaymentOrchestrator>,
        issuer: Arc<TicketIssuer>,
        dispatcher: NotificationDispatcher,
        policy: SalesPolicy,
        max_per_booking: u32,
    ) -> Self {
        Self {
            store,
            payments,
            issuer,
            dispatcher,
            policy,
            max_per_booking,
        }
    }

    pub async fn start_checkout(&self, request: CheckoutRequest) -> TicketingResult<Checkout> {
        self.validate(&request)?;

        let event = self
            .store
            .get_event(request.event_id)
            .await?
            .ok_or_else(|| TicketingError::NotFound(format!("event {}", request.event_id)))?;
        self.policy.ensure_on_sale(&event, Utc::now())?;

        // Early answer only; the seats are taken once the payment clears.
        if event.available_tickets < request.quantity {
            return Err(TicketingError::SoldOut {
                event_id: event.id,
                requested: request.quantity,
            });
        }

        let total_amount = event
            .price
            .checked_mul(i64::from(request.quantity))
            .ok_or_else(|| TicketingError::InvalidRequest("order total overflows".to_string()))?;

        let metadata = HashMap::from([
            ("event_id".to_string(), event.id.to_string()),
            ("quantity".to_string(), request.quantity.to_string()),
        ]);
        let intent = self
            .payments
            .create_intent(total_amount, &event.currency, &metadata)
            .await?;

        let booking = Booking::pending(
            event.id,
            intent.id.clone(),
            request.quantity,
            request.attendee,
            request.additional_attendees,
            total_amount,
            event.currency.clone(),
        );
        self.store.save_pending(&booking).await?;

        info!(
            booking_id = %booking.id,
            payment_reference = %booking.payment_reference,
            event_id = %event.id,
            quantity = booking.quantity,
            "Checkout started"
        );

        Ok(Checkout {
            booking,
            client_secret: intent.client_secret,
        })
    }

    /// Client-driven confirmation after the payment form reports success.
    pub async fn confirm_payment(&self, payment_reference: &str) -> TicketingResult<IssueOutcome> {
        let reference = payment_reference.trim();
        if reference.is_empty() {
            return Err(TicketingError::InvalidRequest("payment reference is required".to_string()));
        }

        let booking = self
            .store
            .find_by_payment_reference(reference)
            .await?
            .ok_or_else(|| TicketingError::NotFound(format!("booking for payment {}", reference)))?;

        if booking.is_paid() {
            return self.issuer.issue_tickets(IssueRequest::from_booking(&booking)).await;
        }

        let intent = self.payments.retrieve_intent(reference).await?;
        self.apply_intent(&booking, &intent).await
    }

    /// Gateway-driven confirmation. Returns the issuance when the event
    /// produced one.
    pub async fn handle_webhook(&self, event: WebhookEvent) -> TicketingResult<Option<IssueOutcome>> {
        let reference = event.intent.id.as_str();
        debug!(webhook_id = %event.id, payment_reference = reference, kind = ?event.kind, "Webhook received");

        match &event.kind {
            WebhookEventKind::PaymentSucceeded => {
                let Some(booking) = self.store.find_by_payment_reference(reference).await? else {
                    warn!(payment_reference = reference, "Payment succeeded for unknown booking");
                    self.dispatcher.dispatch(Notification::IssuanceFailed {
                        payment_reference: reference.to_string(),
                        reason: "payment succeeded but no booking exists".to_string(),
                    });
                    return Ok(None);
                };
                self.apply_intent(&booking, &event.intent).await.map(Some)
            }
            WebhookEventKind::PaymentFailed => {
                self.mark_unpaid(reference, PaymentStatus::Failed).await?;
                Ok(None)
            }
            WebhookEventKind::PaymentCanceled => {
                self.mark_unpaid(reference, PaymentStatus::Cancelled).await?;
                Ok(None)
            }
            WebhookEventKind::Other(kind) => {
                debug!(kind = %kind, "Ignoring webhook");
                Ok(None)
            }
        }
    }

    async fn apply_intent(&self, booking: &Booking, intent: &PaymentIntent) -> TicketingResult<IssueOutcome> {
        match intent.status {
            IntentStatus::Succeeded => {
                if intent.amount != booking.total_amount || !intent.currency.eq_ignore_ascii_case(&booking.currency) {
                    warn!(
                        payment_reference = %booking.payment_reference,
                        expected = booking.total_amount,
                        received = intent.amount,
                        "Captured amount does not match booking"
                    );
                    self.dispatcher.dispatch(Notification::IssuanceFailed {
                        payment_reference: booking.payment_reference.clone(),
                        reason: format!(
                            "captured {} {} but booking totals {} {}",
                            intent.amount, intent.currency, booking.total_amount, booking.currency
                        ),
                    });
                    return Err(TicketingError::PaymentIncomplete(
                        "captured amount does not match the booking".to_string(),
                    ));
                }
                self.issuer.issue_tickets(IssueRequest::from_booking(booking)).await
            }
            IntentStatus::Failed => {
                self.mark_unpaid(&booking.payment_reference, PaymentStatus::Failed).await?;
                Err(TicketingError::PaymentIncomplete("payment failed".to_string()))
            }
            IntentStatus::Canceled => {
                self.mark_unpaid(&booking.payment_reference, PaymentStatus::Cancelled).await?;
                Err(TicketingError::PaymentIncomplete("payment was cancelled".to_string()))
            }
            other => Err(TicketingError::PaymentIncomplete(format!(
                "payment is not complete ({:?})",
                other
            ))),
        }
    }

    async fn mark_unpaid(&self, reference: &str, status: PaymentStatus) -> TicketingResult<()> {
        if self.store.mark_unpaid_status(reference, status).await? {
            info!(payment_reference = reference, status = %status, "Booking payment status updated");
        } else {
            debug!(payment_reference = reference, "No unpaid booking to update");
        }
        Ok(())
    }

    fn validate(&self, request: &CheckoutRequest) -> TicketingResult<()> {
        if request.quantity == 0 || request.quantity > self.max_per_booking {
            return Err(TicketingError::InvalidRequest(format!(
                "quantity must be between 1 and {}",
                self.max_per_booking
            )));
        }
        if request.additional_attendees.len() >= request.quantity as usize {
            return Err(TicketingError::InvalidRequest(
                "more attendees than tickets requested".to_string(),
            ));
        }
        for attendee in std::iter::once(&request.attendee).chain(&request.additional_attendees) {
            if attendee.name.trim().is_empty() {
                return Err(TicketingError::InvalidRequest("attendee name is required".to_string()));
            }
            if !attendee.email.contains('@') {
                return Err(TicketingError::InvalidRequest("attendee email is invalid".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::MockPaymentAdapter;
    use crate::IssueStatus;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use tessera_core::repository::{BookingRepository, EventRepository, TicketRepository};
    use tessera_core::webhook::WebhookVerifier;
    use tessera_shared::Event;
    use tessera_store::memory::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<MockPaymentAdapter>,
        payments: Arc<PaymentOrchestrator>,
        checkout: CheckoutService,
        event: Event,
    }

    async fn harness(total: u32) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let event = Event::new(
            "Opening Night".into(),
            Utc::now() + ChronoDuration::days(10),
            1500,
            "EUR".into(),
            total,
        );
        store.create_event(&event).await.unwrap();

        let gateway = Arc::new(MockPaymentAdapter::new(WebhookVerifier::new("whsec_test", 300)));
        let payments = Arc::new(PaymentOrchestrator::new(gateway.clone(), Duration::from_secs(1)));
        let issuer = Arc::new(TicketIssuer::new(
            store.clone(),
            NotificationDispatcher::disabled(),
            SalesPolicy::default(),
        ));
        let checkout = CheckoutService::new(
            store.clone(),
            payments.clone(),
            issuer,
            NotificationDispatcher::disabled(),
            SalesPolicy::default(),
            10,
        );

        Harness {
            store,
            gateway,
            payments,
            checkout,
            event,
        }
    }

    fn purchase(event_id: Uuid, quantity: u32) -> CheckoutRequest {
        CheckoutRequest {
            event_id,
            quantity,
            attendee: Attendee::new("Mary Jackson", "mary@example.com"),
            additional_attendees: vec![],
        }
    }

    #[tokio::test]
    async fn test_purchase_then_confirm() {
        let h = harness(50).await;

        let checkout = h.checkout.start_checkout(purchase(h.event.id, 2)).await.unwrap();
        assert_eq!(checkout.booking.payment_status, PaymentStatus::Pending);
        assert_eq!(checkout.booking.total_amount, 3000);
        assert!(checkout.client_secret.is_some());
        // Nothing is held until the payment clears.
        assert_eq!(h.store.get_event(h.event.id).await.unwrap().unwrap().available_tickets, 50);

        let reference = checkout.booking.payment_reference.clone();
        assert!(matches!(
            h.checkout.confirm_payment(&reference).await,
            Err(TicketingError::PaymentIncomplete(_))
        ));

        h.gateway.set_status(&reference, IntentStatus::Succeeded);
        let outcome = h.checkout.confirm_payment(&reference).await.unwrap();
        assert_eq!(outcome.status, IssueStatus::Issued);
        assert_eq!(outcome.booking.id, checkout.booking.id);
        assert_eq!(outcome.tickets.len(), 2);
        assert_eq!(h.store.get_event(h.event.id).await.unwrap().unwrap().available_tickets, 48);

        let replay = h.checkout.confirm_payment(&reference).await.unwrap();
        assert_eq!(replay.status, IssueStatus::AlreadyIssued);
        assert_eq!(replay.tickets.len(), 2);
    }

    #[tokio::test]
    async fn test_webhook_and_confirm_race_issue_once() {
        let h = harness(50).await;
        let checkout = h.checkout.start_checkout(purchase(h.event.id, 3)).await.unwrap();
        let reference = checkout.booking.payment_reference.clone();
        h.gateway.set_status(&reference, IntentStatus::Succeeded);

        let (body, header) = h.gateway.signed_webhook(&reference, "payment_intent.succeeded").unwrap();
        let event = h.payments.verify_webhook(&body, &header).unwrap();

        let (from_hook, from_client) = tokio::join!(
            h.checkout.handle_webhook(event),
            h.checkout.confirm_payment(&reference)
        );
        let from_hook = from_hook.unwrap().unwrap();
        let from_client = from_client.unwrap();

        let mut statuses = [from_hook.status, from_client.status];
        statuses.sort_by_key(|s| *s == IssueStatus::AlreadyIssued);
        assert_eq!(statuses, [IssueStatus::Issued, IssueStatus::AlreadyIssued]);
        assert_eq!(from_hook.booking.id, from_client.booking.id);
        assert_eq!(h.store.get_event(h.event.id).await.unwrap().unwrap().available_tickets, 47);
    }

    #[tokio::test]
    async fn test_failed_payment_webhook_marks_booking() {
        let h = harness(5).await;
        let checkout = h.checkout.start_checkout(purchase(h.event.id, 1)).await.unwrap();
        let reference = checkout.booking.payment_reference.clone();
        h.gateway.set_status(&reference, IntentStatus::Failed);

        let (body, header) = h.gateway.signed_webhook(&reference, "payment_intent.payment_failed").unwrap();
        let event = h.payments.verify_webhook(&body, &header).unwrap();
        assert!(h.checkout.handle_webhook(event).await.unwrap().is_none());

        let booking = h.store.get_booking(checkout.booking.id).await.unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Failed);
        assert_eq!(h.store.get_event(h.event.id).await.unwrap().unwrap().available_tickets, 5);
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_refused() {
        let h = harness(5).await;
        let checkout = h.checkout.start_checkout(purchase(h.event.id, 1)).await.unwrap();
        let mut intent = h.payments.retrieve_intent(&checkout.booking.payment_reference).await.unwrap();
        intent.status = IntentStatus::Succeeded;
        intent.amount = 1;

        let event = WebhookEvent {
            id: "evt_tampered".into(),
            kind: WebhookEventKind::PaymentSucceeded,
            intent,
        };
        assert!(matches!(
            h.checkout.handle_webhook(event).await,
            Err(TicketingError::PaymentIncomplete(_))
        ));
        assert!(h.store.tickets_for_booking(checkout.booking.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_validation() {
        let h = harness(2).await;

        assert!(matches!(
            h.checkout.start_checkout(purchase(h.event.id, 0)).await,
            Err(TicketingError::InvalidRequest(_))
        ));
        assert!(matches!(
            h.checkout.start_checkout(purchase(Uuid::new_v4(), 1)).await,
            Err(TicketingError::NotFound(_))
        ));
        assert!(matches!(
            h.checkout.start_checkout(purchase(h.event.id, 3)).await,
            Err(TicketingError::SoldOut { requested: 3, .. })
        ));

        let mut bad_email = purchase(h.event.id, 1);
        bad_email.attendee = Attendee::new("Nobody", "not-an-email");
        assert!(matches!(
            h.checkout.start_checkout(bad_email).await,
            Err(TicketingError::InvalidRequest(_))
        ));

        let mut crowded = purchase(h.event.id, 1);
        crowded.additional_attendees = vec![Attendee::new("Extra", "extra@example.com")];
        assert!(matches!(
            h.checkout.start_checkout(crowded).await,
            Err(TicketingError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_gateway_outage_surfaces_as_gateway_error() {
        let h = harness(5).await;
        h.gateway.set_unavailable(true);

        assert!(matches!(
            h.checkout.start_checkout(purchase(h.event.id, 1)).await,
            Err(TicketingError::Gateway(_))
        ));
        assert_eq!(h.store.get_event(h.event.id).await.unwrap().unwrap().available_tickets, 5);
    }

    #[tokio::test]
    async fn test_confirm_unknown_reference() {
        let h = harness(5).await;
        assert!(matches!(
            h.checkout.confirm_payment("pi_unknown").await,
            Err(TicketingError::NotFound(_))
        ));
        assert!(matches!(
            h.checkout.confirm_payment("  ").await,
            Err(TicketingError::InvalidRequest(_))
        ));
    }
}
