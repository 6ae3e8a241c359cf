use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use prometheus::{opts, IntCounter, IntCounterVec, Registry, TextEncoder};
use tessera_booking::{IssueOutcome, IssueStatus};
use tessera_core::TicketingError;
use tessera_shared::ValidationOutcome;

use crate::error::AppError;
use crate::state::AppState;

/// Ticketing counters, exported at `/metrics` in the Prometheus text format.
pub struct TicketMetrics {
    registry: Registry,
    tickets_issued: IntCounter,
    issuance_outcomes: IntCounterVec,
    validation_outcomes: IntCounterVec,
    webhooks: IntCounterVec,
}

impl TicketMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tickets_issued = IntCounter::with_opts(opts!(
            "tessera_tickets_issued_total",
            "Tickets created by successful issuance"
        ))?;
        let issuance_outcomes = IntCounterVec::new(
            opts!("tessera_issuance_outcomes_total", "Issuance attempts by result"),
            &["result"],
        )?;
        let validation_outcomes = IntCounterVec::new(
            opts!("tessera_validation_outcomes_total", "Door scans by outcome"),
            &["outcome"],
        )?;
        let webhooks = IntCounterVec::new(
            opts!("tessera_payment_webhooks_total", "Verified gateway webhooks by type"),
            &["kind"],
        )?;

        registry.register(Box::new(tickets_issued.clone()))?;
        registry.register(Box::new(issuance_outcomes.clone()))?;
        registry.register(Box::new(validation_outcomes.clone()))?;
        registry.register(Box::new(webhooks.clone()))?;

        Ok(Self {
            registry,
            tickets_issued,
            issuance_outcomes,
            validation_outcomes,
            webhooks,
        })
    }

    pub fn record_issuance(&self, result: Result<&IssueOutcome, &TicketingError>) {
        let label = match result {
            Ok(outcome) if outcome.status == IssueStatus::Issued => {
                self.tickets_issued.inc_by(outcome.tickets.len() as u64);
                "issued"
            }
            Ok(_) => "already_issued",
            Err(e) => e.code(),
        };
        self.issuance_outcomes.with_label_values(&[label]).inc();
    }

    pub fn record_validation(&self, outcome: ValidationOutcome) {
        self.validation_outcomes.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn record_webhook(&self, kind: &str) {
        self.webhooks.with_label_values(&[kind]).inc();
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .export()
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;

    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
