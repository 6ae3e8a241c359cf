use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tessera_core::payment::WebhookEventKind;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying `t=<unix>,v1=<hex hmac>` over the raw body
pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

fn kind_label(kind: &WebhookEventKind) -> &'static str {
    match kind {
        WebhookEventKind::PaymentSucceeded => "succeeded",
        WebhookEventKind::PaymentFailed => "failed",
        WebhookEventKind::PaymentCanceled => "canceled",
        WebhookEventKind::Other(_) => "other",
    }
}

/// POST /v1/webhooks/payments
///
/// The body is taken as raw bytes: the signature covers the exact payload.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::ValidationError("Missing webhook signature".to_string()))?;

    let event = state.payments.verify_webhook(&body, signature)?;
    state.metrics.record_webhook(kind_label(&event.kind));
    tracing::info!(webhook_id = %event.id, intent = %event.intent.id, kind = kind_label(&event.kind), "Received payment webhook");

    let checkout = state.checkout.clone();
    let result = tokio::spawn(async move { checkout.handle_webhook(event).await })
        .await
        .map_err(|e| anyhow::anyhow!("Webhook task failed: {}", e))?;

    match result {
        Ok(Some(outcome)) => {
            state.metrics.record_issuance(Ok(&outcome));
            Ok(Json(json!({
                "received": true,
                "booking_id": outcome.booking.id,
                "status": outcome.status,
            })))
        }
        Ok(None) => Ok(Json(json!({ "received": true }))),
        Err(e) => {
            state.metrics.record_issuance(Err(&e));
            Err(e.into())
        }
    }
}
