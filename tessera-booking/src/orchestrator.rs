use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tessera_core::payment::{IntentStatus, PaymentAdapter, PaymentIntent, WebhookEvent};
use tessera_core::webhook::WebhookVerifier;
use tessera_core::{TicketingError, TicketingResult};
use tracing::warn;
use uuid::Uuid;

/// Front door to the payment gateway: bounds every call with a timeout and
/// folds gateway failures into `TicketingError::Gateway`.
pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
    timeout: Duration,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }

    /// Open a payment intent for a checkout
    pub async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> TicketingResult<PaymentIntent> {
        match tokio::time::timeout(self.timeout, self.adapter.create_intent(amount, currency, metadata)).await {
            Ok(Ok(intent)) => Ok(intent),
            Ok(Err(e)) => Err(TicketingError::Gateway(e.to_string())),
            Err(_) => {
                warn!("Payment gateway timed out creating intent after {:?}", self.timeout);
                Err(TicketingError::Gateway("payment gateway timed out".to_string()))
            }
        }
    }

    /// Ask the gateway for the authoritative state of an intent
    pub async fn retrieve_intent(&self, intent_id: &str) -> TicketingResult<PaymentIntent> {
        match tokio::time::timeout(self.timeout, self.adapter.retrieve_intent(intent_id)).await {
            Ok(Ok(intent)) => Ok(intent),
            Ok(Err(e)) => Err(TicketingError::Gateway(e.to_string())),
            Err(_) => {
                warn!(intent_id, "Payment gateway timed out after {:?}", self.timeout);
                Err(TicketingError::Gateway("payment gateway timed out".to_string()))
            }
        }
    }

    pub fn verify_webhook(&self, payload: &[u8], signature: &str) -> TicketingResult<WebhookEvent> {
        self.adapter
            .verify_webhook(payload, signature)
            .map_err(|e| TicketingError::InvalidRequest(format!("webhook rejected: {}", e)))
    }
}

/// In-process gateway for development and tests.
///
/// Intents start in `requires_payment_method`; tests move them along with
/// [`MockPaymentAdapter::set_status`] to simulate the customer paying.
pub struct MockPaymentAdapter {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    verifier: WebhookVerifier,
    latency: Option<Duration>,
    unavailable: AtomicBool,
}

impl MockPaymentAdapter {
    pub fn new(verifier: WebhookVerifier) -> Self {
        Self {
            intents: Mutex::new(HashMap::new()),
            verifier,
            latency: None,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every subsequent call fail as if the gateway were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_status(&self, intent_id: &str, status: IntentStatus) -> bool {
        match self.intents.lock() {
            Ok(mut intents) => match intents.get_mut(intent_id) {
                Some(intent) => {
                    intent.status = status;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Body and signature header for a gateway notification about a known intent.
    pub fn signed_webhook(
        &self,
        intent_id: &str,
        event_type: &str,
    ) -> Result<(Vec<u8>, String), Box<dyn std::error::Error + Send + Sync>> {
        let intent = self
            .lookup(intent_id)
            .ok_or_else(|| format!("No such payment intent: {}", intent_id))?;

        let body = serde_json::json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "type": event_type,
            "data": {
                "object": {
                    "id": intent.id,
                    "status": status_str(intent.status),
                    "amount": intent.amount,
                    "currency": intent.currency.to_lowercase(),
                    "created": intent.created_at.timestamp(),
                    "metadata": intent.metadata,
                }
            }
        })
        .to_string()
        .into_bytes();

        let header = self.verifier.sign(&body, Utc::now().timestamp())?;
        Ok((body, header))
    }

    fn lookup(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.intents.lock().ok()?.get(intent_id).cloned()
    }

    async fn simulate_network(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("Simulated Payment Gateway Failure".into());
        }
        Ok(())
    }
}

fn status_str(status: IntentStatus) -> &'static str {
    match status {
        IntentStatus::RequiresPaymentMethod => "requires_payment_method",
        IntentStatus::RequiresConfirmation => "requires_confirmation",
        IntentStatus::RequiresAction => "requires_action",
        IntentStatus::Processing => "processing",
        IntentStatus::Succeeded => "succeeded",
        IntentStatus::Canceled => "canceled",
        IntentStatus::Failed => "failed",
    }
}

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<PaymentIntent, Box<dyn std::error::Error + Send + Sync>> {
        self.simulate_network().await?;

        let id = format!("pi_mock_{}", Uuid::new_v4().simple());
        let intent = PaymentIntent {
            client_secret: Some(format!("{}_secret_{}", id, Uuid::new_v4().simple())),
            id: id.clone(),
            amount,
            currency: currency.to_string(),
            status: IntentStatus::RequiresPaymentMethod,
            metadata: metadata.clone(),
            created_at: Utc::now(),
        };

        self.intents
            .lock()
            .map_err(|_| "mock gateway state poisoned")?
            .insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, Box<dyn std::error::Error + Send + Sync>> {
        self.simulate_network().await?;
        self.lookup(intent_id)
            .ok_or_else(|| format!("No such payment intent: {}", intent_id).into())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.verifier.parse(payload, signature)?)
    }
}
