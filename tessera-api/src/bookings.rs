use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tessera_core::repository::{BookingRepository, TicketRepository};
use tessera_shared::{Booking, Ticket};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct BookingDetails {
    booking: Booking,
    tickets: Vec<Ticket>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/bookings/{id}", get(get_booking))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingDetails>, AppError> {
    let booking = state
        .store
        .get_booking(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Booking {} not found", id)))?;
    let tickets = state.store.tickets_for_booking(booking.id).await?;

    Ok(Json(BookingDetails { booking, tickets }))
}
