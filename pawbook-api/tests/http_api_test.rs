use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use pawbook_api::middleware::AdminClaims;
use pawbook_api::{app, AppState, AuthConfig};
use pawbook_booking::{CapacityResolver, MockPaymentAdapter, PaymentOrchestrator, ReservationManager};
use pawbook_core::{Service, SystemClock};
use pawbook_store::{InMemoryCapacityRepository, InMemoryReservationStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

fn test_app(defaults: &[(Service, u32)]) -> Router {
    let capacity_repo = Arc::new(InMemoryCapacityRepository::with_defaults(defaults.iter().copied()));
    let manager = Arc::new(ReservationManager::new(
        Arc::new(InMemoryReservationStore::new()),
        CapacityResolver::new(capacity_repo.clone()),
        Arc::new(SystemClock),
        chrono::Duration::minutes(10),
    ));
    app(AppState {
        manager,
        capacity_repo,
        payment_orchestrator: Arc::new(PaymentOrchestrator::new(Arc::new(MockPaymentAdapter))),
        auth: AuthConfig {
            secret: SECRET.to_string(),
        },
    })
}

fn token(role: &str) -> String {
    let claims = AdminClaims {
        sub: "staff-1".to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn hold_body(service: &str, date: &str, key: &str) -> Value {
    json!({
        "service": service,
        "date": date,
        "userEmail": "owner@example.com",
        "dogId": "dog-1",
        "idempotencyKey": key,
    })
}

async fn create_hold(app: &Router, service: &str, date: &str, key: &str) -> String {
    let (status, body) = send(app, post_json("/reservations", hold_body(service, date, key))).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
    body["reservationId"].as_str().unwrap().to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_trial_day_goes_to_one_of_two_callers() {
    let app = test_app(&[(Service::TrialDay, 1)]);

    let (first, second) = tokio::join!(
        send(&app, post_json("/reservations", hold_body("Trial Day", "2025-12-24", "a"))),
        send(&app, post_json("/reservations", hold_body("Trial Day", "2025-12-24", "b"))),
    );

    let mut statuses = vec![first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    let loser = if first.0 == StatusCode::CONFLICT { first.1 } else { second.1 };
    assert_eq!(loser, json!({ "error": "FULL" }));
}

#[tokio::test]
async fn test_availability_reports_counters() {
    let app = test_app(&[(Service::Daycare, 4)]);
    create_hold(&app, "Daycare", "2025-12-24", "k1").await;

    let (status, body) = send(&app, get("/availability?service=Daycare&date=2025-12-24")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capacity"], 4);
    assert_eq!(body["reserved"], 1);
    assert_eq!(body["confirmed"], 0);
    assert_eq!(body["remaining"], 3);
    assert_eq!(body["slot"], "ALL_DAY");
}

#[tokio::test]
async fn test_malformed_requests_are_400() {
    let app = test_app(&[]);

    let (status, _) = send(&app, get("/availability?service=Grooming&date=2025-12-24")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/availability?service=Daycare&date=24-12-2025")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        post_json("/reservations", json!({ "service": "Daycare", "date": "2025-12-24" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, post_json("/reservations", hold_body("Daycare", "2025-12-24", ""))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_idempotent_create_over_http() {
    let app = test_app(&[(Service::Daycare, 4)]);
    let first = create_hold(&app, "Daycare", "2025-12-24", "retry").await;
    let second = create_hold(&app, "Daycare", "2025-12-24", "retry").await;
    assert_eq!(first, second);

    let (_, body) = send(&app, get("/availability?service=Daycare&date=2025-12-24")).await;
    assert_eq!(body["reserved"], 1);
}

#[tokio::test]
async fn test_payment_flow_commits_through_webhook() {
    let app = test_app(&[(Service::BoardingSmall, 2)]);
    let id = create_hold(&app, "Boarding Small", "2025-12-24", "pay").await;

    let (status, body) = send(
        &app,
        post_json(
            &format!("/reservations/{}/payment-intent", id),
            json!({ "amountCents": 4500, "currency": "usd" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let intent_id = body["paymentIntentId"].as_str().unwrap().to_string();
    assert!(body["clientSecret"].as_str().unwrap().starts_with(&intent_id));

    let (_, view) = send(&app, get(&format!("/reservations/{}", id))).await;
    assert_eq!(view["pendingPaymentIntentId"], intent_id.as_str());
    assert_eq!(view["status"], "active");

    let event = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "status": "succeeded", "metadata": { "reservation_id": id } } }
    });
    let (status, _) = send(&app, post_json("/webhooks/payments", event.clone())).await;
    assert_eq!(status, StatusCode::OK);
    // Gateway retry.
    let (status, _) = send(&app, post_json("/webhooks/payments", event)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, view) = send(&app, get(&format!("/reservations/{}", id))).await;
    assert_eq!(view["status"], "committed");

    let (status, body) = send(&app, post_json(&format!("/reservations/{}/release", id), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Reservation already committed");

    let (_, availability) = send(&app, get("/availability?service=Boarding%20Small&date=2025-12-24")).await;
    assert_eq!(availability["reserved"], 0);
    assert_eq!(availability["confirmed"], 1);

    // Settled holds cannot be paid for again.
    let (status, body) = send(
        &app,
        post_json(
            &format!("/reservations/{}/payment-intent", id),
            json!({ "amountCents": 4500, "currency": "usd" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "reservation is no longer valid");
}

#[tokio::test]
async fn test_failed_payment_keeps_hold_for_another_attempt() {
    let app = test_app(&[(Service::Daycare, 1)]);
    let id = create_hold(&app, "Daycare", "2025-12-26", "card-declined").await;

    let failed = json!({
        "id": "evt_2",
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": "pi_x", "status": "requires_payment_method", "metadata": { "reservation_id": id } } }
    });
    let (status, _) = send(&app, post_json("/webhooks/payments", failed)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, view) = send(&app, get(&format!("/reservations/{}", id))).await;
    assert_eq!(view["status"], "active");

    // Second card goes through on the same intent.
    let succeeded = json!({
        "id": "evt_3",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_x", "status": "succeeded", "metadata": { "reservation_id": id } } }
    });
    let (status, _) = send(&app, post_json("/webhooks/payments", succeeded)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, view) = send(&app, get(&format!("/reservations/{}", id))).await;
    assert_eq!(view["status"], "committed");
}

#[tokio::test]
async fn test_canceled_payment_releases_hold() {
    let app = test_app(&[(Service::Daycare, 1)]);
    let id = create_hold(&app, "Daycare", "2025-12-27", "cancel").await;

    let event = json!({
        "id": "evt_4",
        "type": "payment_intent.canceled",
        "data": { "object": { "id": "pi_y", "metadata": { "reservation_id": id } } }
    });
    let (status, _) = send(&app, post_json("/webhooks/payments", event)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, view) = send(&app, get(&format!("/reservations/{}", id))).await;
    assert_eq!(view["status"], "released");
    create_hold(&app, "Daycare", "2025-12-27", "next").await;
}

#[tokio::test]
async fn test_webhook_tolerates_unknown_events() {
    let app = test_app(&[]);

    let (status, _) = send(
        &app,
        post_json(
            "/webhooks/payments",
            json!({ "id": "evt_3", "type": "charge.refunded", "data": { "object": { "id": "ch_1" } } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        post_json(
            "/webhooks/payments",
            json!({
                "id": "evt_4",
                "type": "payment_intent.succeeded",
                "data": { "object": { "id": "pi_1", "metadata": { "reservation_id": uuid::Uuid::new_v4() } } }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, post_json("/webhooks/payments", json!({ "nope": true }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_reservation_is_404() {
    let app = test_app(&[]);
    let id = uuid::Uuid::new_v4();

    let (status, _) = send(&app, get(&format!("/reservations/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, post_json(&format!("/reservations/{}/release", id), json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json(
            &format!("/reservations/{}/payment-intent", id),
            json!({ "amountCents": 100, "currency": "usd" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes_require_admin_token() {
    let app = test_app(&[]);

    let (status, _) = send(&app, get("/admin/capacity/defaults")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/admin/capacity/defaults")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/admin/capacity/defaults")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("CUSTOMER")))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_capacity_configuration_drives_availability() {
    let app = test_app(&[]);
    let bearer = format!("Bearer {}", token("ADMIN"));

    let req = Request::builder()
        .method("PUT")
        .uri("/admin/capacity/defaults/Boarding%20Large")
        .header(header::AUTHORIZATION, &bearer)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "capacity": 6 }).to_string()))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "Boarding Large");
    assert_eq!(body["capacity"], 6);

    let req = Request::builder()
        .method("POST")
        .uri("/admin/capacity/overrides")
        .header(header::AUTHORIZATION, &bearer)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "service": "Boarding Large",
                "dateStart": "2025-12-24",
                "dateEnd": "2025-12-26",
                "capacity": 2,
                "reason": "Holiday staffing"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, created) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    let override_id = created["id"].as_str().unwrap().to_string();

    let (_, inside) = send(&app, get("/availability?service=Boarding%20Large&date=2025-12-25")).await;
    assert_eq!(inside["capacity"], 2);
    let (_, outside) = send(&app, get("/availability?service=Boarding%20Large&date=2025-12-27")).await;
    assert_eq!(outside["capacity"], 6);

    let req = Request::builder()
        .uri("/admin/capacity/overrides?service=Boarding%20Large")
        .header(header::AUTHORIZATION, &bearer)
        .body(Body::empty())
        .unwrap();
    let (status, listed) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let delete = |id: String| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/admin/capacity/overrides/{}", id))
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&app, delete(override_id.clone())).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, delete(override_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = test_app(&[(Service::Daycare, 2)]);
    create_hold(&app, "Daycare", "2025-12-24", "metrics").await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("pawbook_holds_created_total"));
}
