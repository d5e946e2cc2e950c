//! Router-level tests over the in-memory store

mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::Fleet;
use fleetops_server::{api, config::AppConfig, models::actor::ActorClaims, AppState};

const SECRET: &str = "api-test-secret";

struct TestApp {
    fleet: Fleet,
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let fleet = Fleet::new().await;
        let mut config = AppConfig::default();
        config.auth.jwt_secret = SECRET.to_string();

        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(fleet.services.clone()),
        };
        Self {
            router: api::router(state),
            fleet,
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        actor: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor_id) = actor {
            let token = ActorClaims::new(actor_id, 1).create_token(SECRET).unwrap();
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn post(&self, uri: &str, actor: Uuid, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(actor), Some(body)).await
    }

    async fn get(&self, uri: &str, actor: Uuid) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(actor), None).await
    }
}

fn booking_body() -> Value {
    json!({
        "destination": "Nakuru field office",
        "purpose": "Site inspection",
        "start_date": "2025-06-01",
        "end_date": "2025-06-03",
        "passenger_count": 3
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.call(Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_requests_need_a_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(Method::POST, "/api/v1/bookings", None, Some(booking_body()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_full_lifecycle_over_http() {
    let app = TestApp::new().await;
    let fleet = &app.fleet;

    let (status, booking) = app.post("/api/v1/bookings", fleet.requester.id, booking_body()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "pending_supervisor");
    assert_eq!(booking["allocation"]["type"], "unallocated");
    let id = booking["id"].as_str().unwrap().to_string();

    let (status, booking) = app
        .post(&format!("/api/v1/bookings/{}/approve", id), fleet.supervisor.id, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "pending_allocation");

    let (status, body) = app
        .post(&format!("/api/v1/bookings/{}/approve", id), fleet.supervisor.id, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "StateConflict");

    let (status, booking) = app
        .post(
            &format!("/api/v1/bookings/{}/allocate/internal", id),
            fleet.fleet_manager.id,
            json!({ "vehicle_id": fleet.vehicle.id, "driver_id": fleet.driver.id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "approved");
    assert_eq!(booking["allocation"]["type"], "internal");
    assert_eq!(booking["allocation"]["vehicle_id"], json!(fleet.vehicle.id));

    let (status, trip) = app
        .post(
            "/api/v1/trips",
            fleet.driver.id,
            json!({ "booking_id": id, "start_mileage": 1000, "start_location": "HQ" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trip["status"], "active");
    assert_eq!(trip["destination"], "Nakuru field office");
    let trip_id = trip["id"].as_str().unwrap().to_string();

    let (status, active) = app.get("/api/v1/trips/active", fleet.admin.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active.as_array().map(Vec::len), Some(1));

    let (status, entry) = app
        .post(
            &format!("/api/v1/trips/{}/events", trip_id),
            fleet.driver.id,
            json!({ "event_type": "stop", "reason": "Food" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["event_type"], "stop");

    let (status, body) = app
        .post(
            &format!("/api/v1/trips/{}/events", trip_id),
            fleet.driver.id,
            json!({ "event_type": "stop", "reason": "Fuel" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "StateConflict");

    let (status, body) = app
        .post(
            &format!("/api/v1/trips/{}/end", trip_id),
            fleet.driver.id,
            json!({ "end_mileage": 950 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, details) = app
        .post(
            &format!("/api/v1/trips/{}/end", trip_id),
            fleet.driver.id,
            json!({ "end_mileage": 1200 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["trip"]["status"], "completed");
    assert_eq!(details["logs"].as_array().map(Vec::len), Some(3));
    assert_eq!(details["duty"]["stop_count"], 1);

    let (status, booking) = app
        .get(&format!("/api/v1/bookings/{}", id), fleet.requester.id)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "completed");
}

#[tokio::test]
async fn test_error_kinds_are_distinguishable() {
    let app = TestApp::new().await;
    let fleet = &app.fleet;

    let (status, body) = app
        .get(&format!("/api/v1/bookings/{}", Uuid::new_v4()), fleet.admin.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let mut invalid = booking_body();
    invalid["end_date"] = json!("2025-05-01");
    let (status, body) = app.post("/api/v1/bookings", fleet.requester.id, invalid).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let first = fleet.allocated("2025-06-01", "2025-06-03", fleet.vehicle.id).await;
    let second = fleet.pending_allocation("2025-06-02", "2025-06-02").await;
    let (status, body) = app
        .post(
            &format!("/api/v1/bookings/{}/allocate/internal", second.id),
            fleet.fleet_manager.id,
            json!({ "vehicle_id": fleet.vehicle.id, "driver_id": fleet.second_driver.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ResourceUnavailable");

    let (status, body) = app
        .post(
            &format!("/api/v1/bookings/{}/allocate/external", second.id),
            fleet.fleet_manager.id,
            json!({ "provider_name": "City Cabs", "driver_name": "Joe" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, _) = app
        .post(
            &format!("/api/v1/bookings/{}/cancel", first.id),
            fleet.requester.id,
            json!({ "reason": "Changed plans" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            &format!("/api/v1/bookings/{}/reject", second.id),
            fleet.supervisor.id,
            json!({ "reason": "Duplicate" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "StateConflict");
}

#[tokio::test]
async fn test_list_bookings_by_status() {
    let app = TestApp::new().await;
    let fleet = &app.fleet;
    fleet.pending_allocation("2025-06-01", "2025-06-01").await;
    app.post("/api/v1/bookings", fleet.requester.id, booking_body()).await;

    let (status, body) = app
        .get("/api/v1/bookings?status=pending_allocation", fleet.admin.id)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["bookings"][0]["status"], "pending_allocation");

    let (status, body) = app
        .get(
            &format!("/api/v1/bookings?requester_id={}&per_page=1", fleet.requester.id),
            fleet.admin.id,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["per_page"], 1);
    assert_eq!(body["bookings"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_oversized_page_number_is_served() {
    let app = TestApp::new().await;
    let fleet = &app.fleet;
    app.post("/api/v1/bookings", fleet.requester.id, booking_body()).await;

    let (status, body) = app
        .get("/api/v1/bookings?page=9223372036854775807", fleet.admin.id)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["bookings"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_malformed_requests_are_validation_errors() {
    let app = TestApp::new().await;
    let fleet = &app.fleet;
    let booking = fleet.allocated("2025-06-01", "2025-06-02", fleet.vehicle.id).await;

    let (status, body) = app
        .post(
            "/api/v1/trips",
            fleet.driver.id,
            json!({ "booking_id": booking.id, "start_mileage": 1000 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
    assert!(body["message"].is_string());

    let (status, trip) = app
        .post(
            "/api/v1/trips",
            fleet.driver.id,
            json!({ "booking_id": booking.id, "start_mileage": 1000, "start_location": "HQ" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let trip_id = trip["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(&format!("/api/v1/trips/{}/end", trip_id), fleet.driver.id, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, body) = app
        .post(
            &format!("/api/v1/trips/{}/events", trip_id),
            fleet.driver.id,
            json!({ "event_type": "detour" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, body) = app.get("/api/v1/trips/not-a-uuid", fleet.admin.id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, body) = app.get("/api/v1/bookings?status=bogus", fleet.admin.id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
}
