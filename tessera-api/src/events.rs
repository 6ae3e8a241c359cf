use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tessera_core::repository::EventRepository;
use tessera_shared::Event;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{admin_auth_middleware, staff_auth_middleware};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub venue: Option<String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    pub price: i64,
    pub currency: String,
    pub total_tickets: u32,
}

impl CreateEventRequest {
    fn into_event(self) -> Result<Event, AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::ValidationError("title must not be empty".to_string()));
        }
        if self.price < 0 {
            return Err(AppError::ValidationError("price must not be negative".to_string()));
        }
        if self.total_tickets == 0 {
            return Err(AppError::ValidationError("total_tickets must be at least 1".to_string()));
        }
        let currency = self.currency.trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::ValidationError("currency must be a 3-letter ISO code".to_string()));
        }
        if matches!(self.ends_at, Some(end) if end <= self.starts_at) {
            return Err(AppError::ValidationError("ends_at must be after starts_at".to_string()));
        }

        let mut event = Event::new(title.to_string(), self.starts_at, self.price, currency, self.total_tickets);
        event.venue = self.venue.filter(|v| !v.trim().is_empty());
        event.ends_at = self.ends_at;
        Ok(event)
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/events", get(list_events))
        .route("/v1/events/{id}", get(get_event));

    let staff = Router::new()
        .route("/v1/events/{id}/checkins/stream", get(checkin_stream))
        .route_layer(middleware::from_fn_with_state(state.clone(), staff_auth_middleware));

    let admin = Router::new()
        .route("/v1/admin/events", post(create_event))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    public.merge(staff).merge(admin)
}

async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    Ok(Json(state.store.list_events().await?))
}

async fn get_event(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Event>, AppError> {
    state
        .store
        .get_event(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("Event {} not found", id)))
}

async fn create_event(
    State(state): State<AppState>,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let event = req.into_event()?;
    state.store.create_event(&event).await?;

    tracing::info!(event_id = %event.id, total = event.total_tickets, "Event created");
    Ok((StatusCode::CREATED, Json(event)))
}

/// Live admissions for one event, for the door dashboard.
async fn checkin_stream(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.checkin_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |msg| async move {
        match msg {
            Ok(checkin) if checkin.event_id == event_id => {
                SseEvent::default().event("checkin").json_data(&checkin).ok().map(Ok)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(event_id = %event_id, "Check-in stream lagged: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request() -> CreateEventRequest {
        CreateEventRequest {
            title: " Jazz Night ".to_string(),
            venue: Some(String::new()),
            starts_at: Utc::now() + Duration::days(3),
            ends_at: None,
            price: 2500,
            currency: "eur".to_string(),
            total_tickets: 200,
        }
    }

    #[test]
    fn test_request_normalizes_fields() {
        let event = request().into_event().unwrap();
        assert_eq!(event.title, "Jazz Night");
        assert_eq!(event.currency, "EUR");
        assert_eq!(event.venue, None);
        assert_eq!(event.available_tickets, 200);
    }

    #[test]
    fn test_request_rejects_bad_values() {
        let mut zero = request();
        zero.total_tickets = 0;
        assert!(matches!(zero.into_event(), Err(AppError::ValidationError(_))));

        let mut backwards = request();
        backwards.ends_at = Some(backwards.starts_at - Duration::hours(1));
        assert!(matches!(backwards.into_event(), Err(AppError::ValidationError(_))));

        let mut currency = request();
        currency.currency = "EURO".to_string();
        assert!(matches!(currency.into_event(), Err(AppError::ValidationError(_))));
    }
}
