use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use dispatch_engine::api::rest::router;
use dispatch_engine::config::EngineConfig;
use dispatch_engine::engine::dispatcher::run_dispatcher;
use dispatch_engine::models::event::EngineEvent;
use dispatch_engine::state::AppState;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

fn setup() -> (axum::Router, Arc<AppState>, mpsc::Receiver<Uuid>) {
    let (state, rx) = AppState::new(EngineConfig::default(), 1024, 1024);
    let shared = Arc::new(state);
    (router(shared.clone()), shared, rx)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn register_driver(app: &axum::Router, lat: f64, lng: f64) -> String {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/agents",
            json!({
                "name": "Ravi",
                "role": "driver",
                "vehicle_class": "car",
                "location": { "lat": lat, "lng": lng },
                "rating": 4.8,
                "available": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await["id"].as_str().unwrap().to_string()
}

fn ride_body(customer_id: &str) -> Value {
    json!({
        "customer_id": customer_id,
        "service_type": "ride",
        "origin": { "lat": 28.6315, "lng": 77.2167 },
        "destination": { "lat": 28.5562, "lng": 77.1000 },
        "vehicle_class": "car"
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agents"], 0);
    assert_eq!(body["orders"], 0);
    assert_eq!(body["pending_offers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state, _rx) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("orders_in_queue"));
}

#[tokio::test]
async fn register_agent_returns_agent() {
    let (app, _state, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/agents",
            json!({
                "name": "Asha",
                "role": "delivery_partner",
                "vehicle_class": "scooter",
                "location": { "lat": 28.61, "lng": 77.20 },
                "rating": 9.9,
                "available": true
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["name"], "Asha");
    assert_eq!(body["role"], "delivery_partner");
    assert_eq!(body["vehicle_class"], "scooter");
    assert_eq!(body["available"], true);
    assert_eq!(body["rating"], 5.0);
    assert_eq!(body["completed_count"], 0);
}

#[tokio::test]
async fn register_agent_empty_name_returns_400() {
    let (app, _state, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/agents",
            json!({
                "name": "  ",
                "role": "driver",
                "vehicle_class": "car"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn agent_without_location_stays_offline() {
    let (app, _state, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/agents",
            json!({
                "name": "Kiran",
                "role": "driver",
                "vehicle_class": "auto",
                "available": true
            }),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["available"], false);
    assert!(body["position"].is_null());
}

#[tokio::test]
async fn update_agent_location_and_availability() {
    let (app, _state, _rx) = setup();
    let id = register_driver(&app, 28.60, 77.20).await;

    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/agents/{id}/location"),
            json!({ "location": { "lat": 28.55, "lng": 77.25 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["position"]["lat"], 28.55);
    assert_eq!(body["position"]["lng"], 77.25);
    assert_eq!(body["available"], true);

    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/agents/{id}/availability"),
            json!({ "available": false }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["available"], false);

    let res = app
        .oneshot(json_request(
            "PATCH",
            &format!("/agents/{id}/location"),
            json!({ "location": { "lat": 91.0, "lng": 77.25 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deactivated_agent_cannot_go_online() {
    let (app, _state, _rx) = setup();
    let id = register_driver(&app, 28.60, 77.20).await;

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/agents/{id}/deactivate"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["active"], false);
    assert_eq!(body["available"], false);

    let res = app
        .oneshot(json_request(
            "PATCH",
            &format!("/agents/{id}/availability"),
            json!({ "available": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn fare_estimate_uses_class_rates() {
    let (app, _state, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/fares/estimate",
            json!({
                "origin": { "lat": 28.7041, "lng": 77.1025 },
                "destination": { "lat": 28.5355, "lng": 77.3910 },
                "vehicle_class": "car"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let distance = body["distance_km"].as_f64().unwrap();
    let fare = body["fare"].as_f64().unwrap();
    assert!((distance - 33.83).abs() < 0.05);
    assert!((fare - (150.0 + 12.0 * distance)).abs() < 0.01);
    assert_eq!(body["eta_minutes"], 68);
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let (app, _state, _rx) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/orders/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_order_enters_matching_with_estimate() {
    let (app, state, _rx) = setup();
    let response = app
        .oneshot(json_request("POST", "/orders", ride_body(&Uuid::new_v4().to_string())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "matching");
    assert!(body["assigned_agent"].is_null());
    assert!(body["estimated_fare"].as_f64().unwrap() > 150.0);
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
    assert_eq!(body["history"][0]["from"], "requested");
    assert_eq!(state.metrics.orders_in_queue.get(), 1);
}

#[tokio::test]
async fn ride_without_destination_returns_400() {
    let (app, _state, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({
                "customer_id": Uuid::new_v4(),
                "service_type": "ride",
                "origin": { "lat": 28.6315, "lng": 77.2167 },
                "vehicle_class": "car"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn open_ended_delivery_has_no_estimate_until_accepted() {
    let (app, _state, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({
                "customer_id": Uuid::new_v4(),
                "service_type": "delivery",
                "origin": { "lat": 28.6315, "lng": 77.2167 },
                "vehicle_class": "bike",
                "items": [
                    { "name": "Milk", "category": "dairy", "quantity": 2, "unit_price": 30.0 }
                ]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["estimated_fare"].is_null());
    assert_eq!(body["items"][0]["quantity"], 2);
}

#[tokio::test]
async fn cancel_by_stranger_is_forbidden() {
    let (app, _state, _rx) = setup();
    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", ride_body(&Uuid::new_v4().to_string())))
        .await
        .unwrap();
    let order_id = body_json(res).await["id"].as_str().unwrap().to_string();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/cancel"),
            json!({ "actor_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn position_report_before_acceptance_is_conflict() {
    let (app, _state, _rx) = setup();
    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", ride_body(&Uuid::new_v4().to_string())))
        .await
        .unwrap();
    let order_id = body_json(res).await["id"].as_str().unwrap().to_string();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/positions"),
            json!({ "agent_id": Uuid::new_v4(), "lat": 28.63, "lng": 77.21 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn full_dispatch_flow() {
    let (app, state, rx) = setup();
    tokio::spawn(run_dispatcher(state.clone(), rx));
    let mut events = state.events_tx.subscribe();

    let agent_id = register_driver(&app, 28.6320, 77.2170).await;
    let customer_id = Uuid::new_v4().to_string();

    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", ride_body(&customer_id)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let order_id = body_json(res).await["id"].as_str().unwrap().to_string();

    let offer = loop {
        if let EngineEvent::OfferIssued { offer } = events.recv().await.unwrap() {
            break offer;
        }
    };
    assert_eq!(offer.order_id.to_string(), order_id);
    assert_eq!(offer.agent_id.to_string(), agent_id);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/offers/{}/respond", offer.id),
            json!({ "agent_id": agent_id, "accept": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["outcome"], "accepted");

    loop {
        if let EngineEvent::OrderStatusChanged { to, .. } = events.recv().await.unwrap() {
            if to.as_label() == "accepted" {
                break;
            }
        }
    }

    let res = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let order = body_json(res).await;
    assert_eq!(order["status"], "accepted");
    assert_eq!(order["assigned_agent"], agent_id);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/start"),
            json!({ "agent_id": agent_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/positions"),
            json!({ "agent_id": agent_id, "lat": 28.5563, "lng": 77.1001 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let receipt = body_json(res).await;
    assert_eq!(receipt["arrived"], true);
    assert_eq!(receipt["sample"]["stale"], false);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/positions"),
            json!({ "agent_id": Uuid::new_v4(), "lat": 28.5563, "lng": 77.1001 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/complete"),
            json!({ "agent_id": agent_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let completed = body_json(res).await;
    assert_eq!(completed["status"], "completed");
    assert_eq!(completed["final_fare"], completed["estimated_fare"]);

    let res = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}/trail")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await.as_array().unwrap().len(), 1);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/cancel"),
            json!({ "actor_id": customer_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app.oneshot(get_request("/agents")).await.unwrap();
    let agents = body_json(res).await;
    let agent = &agents.as_array().unwrap()[0];
    assert_eq!(agent["available"], true);
    assert_eq!(agent["completed_count"], 1);
}

#[tokio::test]
async fn order_rejects_vehicle_no_agent_operates() {
    let (app, state, _rx) = setup();
    let customer_id = Uuid::new_v4().to_string();

    let mut scooter_ride = ride_body(&customer_id);
    scooter_ride["vehicle_class"] = json!("scooter");
    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", scooter_ride))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({
                "customer_id": customer_id,
                "service_type": "delivery",
                "origin": { "lat": 28.6315, "lng": 77.2167 },
                "destination": { "lat": 28.5562, "lng": 77.1000 },
                "vehicle_class": "auto"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(state.orders.is_empty());
}

#[tokio::test]
async fn customer_order_history() {
    let (app, _state, _rx) = setup();
    let customer_id = Uuid::new_v4().to_string();

    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", ride_body(&customer_id)))
        .await
        .unwrap();
    let ride_id = body_json(res).await["id"].clone();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({
                "customer_id": customer_id,
                "service_type": "delivery",
                "origin": { "lat": 28.6315, "lng": 77.2167 },
                "vehicle_class": "bike",
                "items": [{ "name": "Biryani", "category": "food", "quantity": 1, "unit_price": 250.0 }]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    app.clone()
        .oneshot(json_request(
            "POST",
            "/orders",
            ride_body(&Uuid::new_v4().to_string()),
        ))
        .await
        .unwrap();

    let res = app
        .clone()
        .oneshot(get_request(&format!("/customers/{customer_id}/orders")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let history = body_json(res).await;
    assert_eq!(history.as_array().unwrap().len(), 2);

    let res = app
        .clone()
        .oneshot(get_request(&format!(
            "/customers/{customer_id}/orders?service_type=ride"
        )))
        .await
        .unwrap();
    let rides = body_json(res).await;
    let rides = rides.as_array().unwrap();
    assert_eq!(rides.len(), 1);
    assert_eq!(rides[0]["id"], ride_id);

    let res = app
        .oneshot(get_request(&format!("/customers/{}/orders", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(body_json(res).await, json!([]));
}
