//! Signed gateway webhooks.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex digest>` where
//! the digest is HMAC-SHA256 over `"{t}.{raw body}"` with the shared endpoint
//! secret. Several `v1` entries may be present while a secret is rotated.

use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::payment::{IntentStatus, PaymentIntent, WebhookEvent, WebhookEventKind};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("signature header has no timestamp")]
    MissingTimestamp,
    #[error("signature header has no v1 signature")]
    MissingSignature,
    #[error("signature timestamp outside tolerance ({age}s old)")]
    Expired { age: i64 },
    #[error("signature mismatch")]
    Mismatch,
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
pub struct GatewayWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: PaymentIntentObject,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: &str, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            tolerance_seconds,
        }
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| WebhookError::Malformed(format!("signing key: {}", e)))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// Produce a signature header for `payload`. Used by the mock gateway and tests.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let digest = self.mac(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }

    /// Check `header` against `payload` at time `now` (unix seconds).
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value.to_string()),
                _ => {}
            }
        }

        let Some(timestamp) = timestamp else {
            debug!("Webhook signature header without timestamp");
            return Err(WebhookError::MissingTimestamp);
        };
        if signatures.is_empty() {
            debug!("Webhook signature header without v1 entry");
            return Err(WebhookError::MissingSignature);
        }

        let age = now - timestamp;
        if age.abs() > self.tolerance_seconds {
            warn!(age, tolerance = self.tolerance_seconds, "Webhook signature outside tolerance");
            return Err(WebhookError::Expired { age });
        }

        for candidate in signatures {
            let Ok(bytes) = hex::decode(&candidate) else {
                continue;
            };
            // verify_slice compares in constant time
            if self.mac(timestamp, payload)?.verify_slice(&bytes).is_ok() {
                return Ok(());
            }
        }

        warn!(timestamp, "Webhook signature mismatch");
        Err(WebhookError::Mismatch)
    }

    /// Verify against the current clock and decode the payment intent event.
    pub fn parse(&self, payload: &[u8], header: &str) -> Result<WebhookEvent, WebhookError> {
        self.verify_at(payload, header, Utc::now().timestamp())?;
        decode_event(payload)
    }
}

pub fn decode_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let webhook: GatewayWebhook =
        serde_json::from_slice(payload).map_err(|e| WebhookError::Malformed(e.to_string()))?;

    let object = webhook.data.object;
    let created_at = object
        .created
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    Ok(WebhookEvent {
        id: webhook.id,
        kind: WebhookEventKind::from_type(&webhook.type_),
        intent: PaymentIntent {
            id: object.id,
            amount: object.amount,
            currency: object.currency,
            status: IntentStatus::from_provider(&object.status),
            client_secret: object.client_secret,
            metadata: object.metadata.unwrap_or_default(),
            created_at,
        },
    })
}
