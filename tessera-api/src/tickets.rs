use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use tessera_booking::{Checkout, CheckoutRequest, IssueOutcome};
use tessera_shared::models::events::TicketValidatedEvent;
use tessera_shared::{Ticket, ValidationOutcome};

use crate::error::AppError;
use crate::middleware::auth::{admin_auth_middleware, staff_auth_middleware, StaffClaims};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub payment_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// Raw scanner input: a bare code or the QR JSON payload
    pub ticket_code: String,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/tickets/purchase", post(purchase))
        .route("/v1/tickets/confirm", post(confirm));

    let staff = Router::new()
        .route("/v1/tickets/validate", post(validate))
        .route("/v1/tickets/{code}", get(lookup))
        .route_layer(middleware::from_fn_with_state(state.clone(), staff_auth_middleware));

    let admin = Router::new()
        .route("/v1/admin/tickets/{code}/cancel", post(cancel))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    public.merge(staff).merge(admin)
}

async fn purchase(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Checkout>), AppError> {
    let checkout = state.checkout.start_checkout(req).await?;
    Ok((StatusCode::CREATED, Json(checkout)))
}

async fn confirm(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<IssueOutcome>, AppError> {
    let checkout = state.checkout.clone();
    let reference = req.payment_reference;

    // Issuance runs detached so a client disconnect cannot abort it between
    // reserving seats and committing tickets.
    let result = tokio::spawn(async move { checkout.confirm_payment(&reference).await })
        .await
        .map_err(|e| anyhow::anyhow!("Issuance task failed: {}", e))?;

    state.metrics.record_issuance(result.as_ref());
    Ok(Json(result?))
}

async fn validate(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Json(req): Json<ValidateRequest>,
) -> Result<Response, AppError> {
    let result = state.validator.validate(&req.ticket_code, Some(claims.sub.as_str())).await?;
    state.metrics.record_validation(result.outcome);

    if let (true, Some(ticket)) = (result.admitted(), &result.ticket) {
        let event = TicketValidatedEvent {
            ticket_id: ticket.id,
            event_id: ticket.event_id,
            ticket_code: ticket.ticket_code.clone(),
            attendee_name: ticket.attendee_name.clone(),
            validated_by: ticket.validated_by.clone(),
            timestamp: ticket.used_at.unwrap_or_else(chrono::Utc::now).timestamp(),
        };
        // No subscribers is fine
        let _ = state.checkin_tx.send(event);
    }

    let status = if result.outcome == ValidationOutcome::NotFound {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)).into_response())
}

async fn lookup(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Ticket>, AppError> {
    state
        .validator
        .lookup(&code)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("Ticket {} not found", code)))
}

async fn cancel(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(code): Path<String>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state.validator.cancel(&code).await?;
    tracing::info!(ticket_id = %ticket.id, cancelled_by = %claims.sub, "Ticket cancelled");
    Ok(Json(ticket))
}
