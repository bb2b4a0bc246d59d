//! Admin API routes, exercised in-process.

use axum::body::Body;
use axum::http::{header::AUTHORIZATION, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use client_balancer::admin::{setup_admin_router, AdminState};

mod common;

const KEY: &str = "test-key";

fn app() -> (Router, std::sync::Arc<client_balancer::ClientRegistry>) {
    let registry = common::registry(vec![
        common::client_config(
            "orders",
            "zone_avoidance",
            &[("10.0.1.1:8080", "a"), ("10.0.2.1:8080", "b")],
        ),
        common::client_config("users", "round_robin", &[("10.0.3.1:8080", "c")]),
    ]);
    (setup_admin_router(AdminState::new(registry.clone(), KEY)), registry)
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {}", KEY))
        .body(Body::empty())
        .unwrap()
}

async fn json(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request(method, uri)).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_rejects_missing_or_wrong_key() {
    let (app, _) = app();

    let anonymous = Request::builder().uri("/admin/status").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(anonymous).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/admin/status")
        .header(AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_and_clients() {
    let (app, _) = app();

    let (status, body) = json(&app, Method::GET, "/admin/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "operational");
    assert_eq!(body["clients"], 2);

    let (status, body) = json(&app, Method::GET, "/admin/clients").await;
    assert_eq!(status, StatusCode::OK);
    let clients = body.as_array().unwrap();
    assert_eq!(clients[0]["name"], "orders");
    assert_eq!(clients[0]["rule"], "zone_avoidance");
    assert_eq!(clients[0]["servers"], 2);
    assert_eq!(clients[1]["name"], "users");
}

#[tokio::test]
async fn test_servers_stats_and_zones() {
    let (app, _) = app();

    let (status, body) = json(&app, Method::GET, "/admin/clients/orders/servers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "10.0.1.1:8080");
    assert_eq!(body[0]["zone"], "a");
    assert_eq!(body[0]["alive"], true);

    let (status, body) = json(&app, Method::GET, "/admin/clients/orders/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["circuit_tripped"], false);

    let (status, body) = json(&app, Method::GET, "/admin/clients/orders/zones").await;
    assert_eq!(status, StatusCode::OK);
    let zones: Vec<&str> = body.as_array().unwrap().iter().map(|z| z["zone"].as_str().unwrap()).collect();
    assert_eq!(zones, vec!["a", "b"]);
}

#[tokio::test]
async fn test_unknown_client_or_server_is_not_found() {
    let (app, _) = app();

    let (status, _) = json(&app, Method::GET, "/admin/clients/missing/servers").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = json(&app, Method::POST, "/admin/clients/orders/servers/10.9.9.9:1/down").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mark_down_and_up() {
    let (app, registry) = app();
    let lb = registry.get("users").unwrap().load_balancer().clone();

    let (status, body) = json(&app, Method::POST, "/admin/clients/users/servers/10.0.3.1:8080/down").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert!(lb.reachable_servers().is_empty());

    let (_, body) = json(&app, Method::POST, "/admin/clients/users/servers/10.0.3.1:8080/down").await;
    assert_eq!(body["changed"], false);

    let (status, body) = json(&app, Method::POST, "/admin/clients/users/servers/10.0.3.1:8080/up").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alive"], true);
    assert_eq!(lb.reachable_servers().len(), 1);
}
