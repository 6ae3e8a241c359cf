use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tessera_api::{app, AppState, AuthConfig};
use tessera_booking::{MockPaymentAdapter, NotificationDispatcher};
use tessera_core::payment::IntentStatus;
use tessera_core::webhook::WebhookVerifier;
use tessera_store::app_config::BusinessRules;
use tessera_store::MemoryStore;
use tower::ServiceExt;

const WORKER_KEY: &str = "door-key";
const ADMIN_KEY: &str = "office-key";

struct TestApp {
    router: Router,
    gateway: Arc<MockPaymentAdapter>,
}

fn test_app() -> TestApp {
    let gateway = Arc::new(MockPaymentAdapter::new(WebhookVerifier::new("whsec_test", 300)));
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        gateway.clone(),
        NotificationDispatcher::disabled(),
        AuthConfig {
            secret: "test-secret".to_string(),
            expiration: 600,
            worker_access_key: WORKER_KEY.to_string(),
            admin_access_key: ADMIN_KEY.to_string(),
        },
        BusinessRules::default(),
        Duration::from_secs(2),
    )
    .unwrap();

    TestApp {
        router: app(state),
        gateway,
    }
}

impl TestApp {
    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.call(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.call(builder.body(Body::empty()).unwrap()).await
    }

    async fn token(&self, access_key: &str, staff_id: &str) -> String {
        let (status, body) = self
            .post("/v1/auth/staff", None, json!({ "access_key": access_key, "staff_id": staff_id }))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_event(&self, total_tickets: u32) -> String {
        let admin = self.token(ADMIN_KEY, "box-office").await;
        let (status, body) = self
            .post(
                "/v1/admin/events",
                Some(&admin),
                json!({
                    "title": "Spring Recital",
                    "venue": "Main Hall",
                    "starts_at": (Utc::now() + ChronoDuration::days(7)).to_rfc3339(),
                    "price": 1500,
                    "currency": "usd",
                    "total_tickets": total_tickets,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }

    /// Start a checkout and return the payment reference.
    async fn purchase(&self, event_id: &str, quantity: u32) -> String {
        let (status, body) = self.post("/v1/tickets/purchase", None, purchase_body(event_id, quantity)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["booking"]["payment_reference"].as_str().unwrap().to_string()
    }
}

fn purchase_body(event_id: &str, quantity: u32) -> Value {
    json!({
        "event_id": event_id,
        "quantity": quantity,
        "attendee": { "name": "Ada Lovelace", "email": "ada@example.edu" },
        "additional_attendees": [{ "name": "Charles Babbage", "email": "cb@example.edu" }],
    })
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = test_app();

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "in_memory");

    let (status, body) = app.get("/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("tessera_tickets_issued_total"));
}

#[tokio::test]
async fn test_staff_auth_and_roles() {
    let app = test_app();

    let (status, body) = app
        .post("/v1/auth/staff", None, json!({ "access_key": "guess" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = app
        .post("/v1/tickets/validate", None, json!({ "ticket_code": "TKT-ABC" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/v1/tickets/validate", Some("not-a-jwt"), json!({ "ticket_code": "TKT-ABC" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let worker = app.token(WORKER_KEY, "gate-1").await;
    let (status, body) = app
        .post(
            "/v1/admin/events",
            Some(&worker),
            json!({ "title": "x", "starts_at": Utc::now().to_rfc3339(), "price": 0, "currency": "USD", "total_tickets": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_purchase_confirm_and_scan_flow() {
    let app = test_app();
    let event_id = app.create_event(100).await;
    let reference = app.purchase(&event_id, 2).await;

    // The customer has not paid yet
    let (status, body) = app
        .post("/v1/tickets/confirm", None, json!({ "payment_reference": reference }))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "payment_incomplete");

    assert!(app.gateway.set_status(&reference, IntentStatus::Succeeded));

    let (status, body) = app
        .post("/v1/tickets/confirm", None, json!({ "payment_reference": reference }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "issued");
    assert_eq!(body["booking"]["payment_status"], "paid");
    let tickets = body["tickets"].as_array().unwrap().clone();
    assert_eq!(tickets.len(), 2);
    assert_eq!(tickets[1]["attendee_name"], "Charles Babbage");
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    // Replays hand back the same tickets
    let (status, replay) = app
        .post("/v1/tickets/confirm", None, json!({ "payment_reference": reference }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["status"], "already_issued");
    assert_eq!(replay["tickets"], Value::Array(tickets.clone()));

    let (_, event) = app.get(&format!("/v1/events/{}", event_id), None).await;
    assert_eq!(event["available_tickets"], 98);

    let (status, details) = app.get(&format!("/v1/bookings/{}", booking_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["tickets"].as_array().unwrap().len(), 2);

    let worker = app.token(WORKER_KEY, "gate-2").await;
    let first = tickets[0]["ticket_code"].as_str().unwrap();
    let second = tickets[1]["ticket_code"].as_str().unwrap();

    let (status, scan) = app
        .post("/v1/tickets/validate", Some(&worker), json!({ "ticket_code": first }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scan["outcome"], "used");
    assert_eq!(scan["ticket"]["validated_by"], "gate-2");
    assert_eq!(scan["event_title"], "Spring Recital");

    let (status, scan) = app
        .post("/v1/tickets/validate", Some(&worker), json!({ "ticket_code": first.to_lowercase() }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scan["outcome"], "already_used");

    let (status, scan) = app
        .post("/v1/tickets/validate", Some(&worker), json!({ "ticket_code": "TKT-0000" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(scan["outcome"], "not_found");

    let (status, ticket) = app.get(&format!("/v1/tickets/{}", second), Some(&worker)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["status"], "valid");

    let admin = app.token(ADMIN_KEY, "box-office").await;
    let (status, cancelled) = app
        .post(&format!("/v1/admin/tickets/{}/cancel", second), Some(&admin), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (_, scan) = app
        .post("/v1/tickets/validate", Some(&worker), json!({ "ticket_code": second }))
        .await;
    assert_eq!(scan["outcome"], "cancelled");

    let (_, event) = app.get(&format!("/v1/events/{}", event_id), None).await;
    assert_eq!(event["available_tickets"], 99);

    let (_, metrics) = app.get("/metrics", None).await;
    let metrics = metrics.as_str().unwrap();
    assert!(metrics.contains("tessera_tickets_issued_total 2"));
    assert!(metrics.contains("tessera_validation_outcomes_total{outcome=\"used\"} 1"));
}

#[tokio::test]
async fn test_signed_webhook_issues_tickets() {
    let app = test_app();
    let event_id = app.create_event(10).await;
    let reference = app.purchase(&event_id, 1).await;
    app.gateway.set_status(&reference, IntentStatus::Succeeded);

    let (payload, signature) = app
        .gateway
        .signed_webhook(&reference, "payment_intent.succeeded")
        .unwrap();

    // Tampered signature is rejected and nothing is issued
    let forged = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/payments")
        .header("stripe-signature", "t=1,v1=deadbeef")
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, body) = app.call(forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");

    let (_, event) = app.get(&format!("/v1/events/{}", event_id), None).await;
    assert_eq!(event["available_tickets"], 10);

    let genuine = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/payments")
        .header("stripe-signature", signature)
        .body(Body::from(payload))
        .unwrap();
    let (status, body) = app.call(genuine).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["received"], true);
    assert_eq!(body["status"], "issued");

    // The client confirming afterwards sees the webhook's tickets
    let (status, body) = app
        .post("/v1/tickets/confirm", None, json!({ "payment_reference": reference }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_issued");
    assert_eq!(body["tickets"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_last_seat_goes_to_first_confirmation() {
    let app = test_app();
    let event_id = app.create_event(1).await;
    let first = app.purchase(&event_id, 1).await;
    let second = app.purchase(&event_id, 1).await;
    app.gateway.set_status(&first, IntentStatus::Succeeded);
    app.gateway.set_status(&second, IntentStatus::Succeeded);

    let (status, _) = app
        .post("/v1/tickets/confirm", None, json!({ "payment_reference": first }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post("/v1/tickets/confirm", None, json!({ "payment_reference": second }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "sold_out");

    // Checkout is closed once nothing is left
    let (status, body) = app.post("/v1/tickets/purchase", None, purchase_body(&event_id, 1)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "sold_out");
}

#[tokio::test]
async fn test_purchase_rejections() {
    let app = test_app();
    let event_id = app.create_event(10).await;

    let (status, body) = app.post("/v1/tickets/purchase", None, purchase_body(&event_id, 0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");

    let (status, body) = app
        .post("/v1/tickets/purchase", None, purchase_body(&uuid::Uuid::new_v4().to_string(), 1))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = app
        .post("/v1/tickets/confirm", None, json!({ "payment_reference": "pi_unknown" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gateway_outage_opens_breaker() {
    let app = test_app();
    let event_id = app.create_event(10).await;
    app.gateway.set_unavailable(true);

    for _ in 0..5 {
        let (status, body) = app.post("/v1/tickets/purchase", None, purchase_body(&event_id, 1)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "gateway_error");
    }

    let (status, body) = app.post("/v1/tickets/purchase", None, purchase_body(&event_id, 1)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "circuit_open");

    // Routes that never call the gateway are unaffected
    let (status, _) = app.get("/v1/events", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_checkin_stream_requires_staff() {
    let app = test_app();
    let event_id = app.create_event(5).await;
    let uri = format!("/v1/events/{}/checkins/stream", event_id);

    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let worker = app.token(WORKER_KEY, "gate-4").await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(&uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", worker))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
}
