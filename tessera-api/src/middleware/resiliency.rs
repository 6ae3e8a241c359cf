use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    /// One trial request is let through after the reset timeout
    HalfOpen,
}

pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    last_failure: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout,
            last_failure: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Whether a request may go through right now.
    pub async fn check(&self) -> bool {
        let mut state = self.state.write().await;
        match *state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let cooled_down = self
                    .last_failure
                    .read()
                    .await
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if cooled_down {
                    *state = CircuitState::HalfOpen;
                    tracing::info!(breaker = %self.name, "Circuit breaker half-open, sending trial request");
                }
                cooled_down
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            tracing::info!(breaker = %self.name, "Circuit breaker closed again");
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.last_failure.write().await = Some(Instant::now());
            tracing::error!(breaker = %self.name, failures = count, "Circuit breaker tripped open");
        }
    }
}

pub struct ResiliencyState {
    /// Guards routes that call the payment gateway
    pub payment_cb: CircuitBreaker,
}

impl ResiliencyState {
    pub fn new() -> Self {
        Self::with_payment_breaker(CircuitBreaker::new("payment_gateway", 5, Duration::from_secs(30)))
    }

    pub fn with_payment_breaker(payment_cb: CircuitBreaker) -> Self {
        Self { payment_cb }
    }
}

impl Default for ResiliencyState {
    fn default() -> Self {
        Self::new()
    }
}

fn calls_gateway(path: &str) -> bool {
    matches!(path, "/v1/tickets/purchase" | "/v1/tickets/confirm")
}

/// Fail fast on gateway-backed routes while the gateway keeps erroring.
/// Only 502/503/504 count as failures; 4xx and plain 500s are not the
/// gateway's fault.
pub async fn circuit_breaker_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !calls_gateway(req.uri().path()) {
        return next.run(req).await;
    }

    let cb = &state.resiliency.payment_cb;
    if !cb.check().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": format!("Circuit breaker [{}] is open", cb.name),
                "code": "circuit_open",
            })),
        )
            .into_response();
    }

    let response = next.run(req).await;

    match response.status() {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            cb.record_failure().await
        }
        _ => cb.record_success().await,
    }

    response
}
