//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tenant_store::InMemoryStore;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup_with_state() -> (axum::Router, Arc<AppState<InMemoryStore>>) {
    let state = api::create_default_state(InMemoryStore::new(), &Config::default()).unwrap();
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn setup() -> axum::Router {
    setup_with_state().0
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn create_session(app: &axum::Router, business_name: &str, slug: Option<&str>) -> String {
    let response = send(
        app,
        "POST",
        "/onboarding",
        Some(json!({
            "business_name": business_name,
            "email": "owner@acme.test",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "slug": slug,
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_reports_bus_state() {
    let (app, state) = setup_with_state();

    let json = body_json(send(&app, "GET", "/health", None).await).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["event_bus"], "disconnected");

    state
        .saga
        .publisher()
        .connect(&CancellationToken::new())
        .await
        .unwrap();

    let response = send(&app, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["event_bus"], "connected");
}

#[tokio::test]
async fn test_create_and_get_session() {
    let app = setup();
    let session_id = create_session(&app, "Acme Corp", Some("acme")).await;

    let response = send(&app, "GET", &format!("/onboarding/{session_id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["business_name"], "Acme Corp");
    assert_eq!(json["requested_slug"], "acme");
    assert_eq!(json["status"], "in_progress");
    assert!(json["tenant_id"].is_null());
}

#[tokio::test]
async fn test_create_session_validates_input() {
    let app = setup();
    let response = send(
        &app,
        "POST",
        "/onboarding",
        Some(json!({
            "business_name": "  ",
            "email": "owner@acme.test",
            "first_name": "Ada",
            "last_name": "Lovelace",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_complete_onboarding() {
    let (app, state) = setup_with_state();
    let session_id = create_session(&app, "Acme Corp", Some("acme")).await;

    let response = send(
        &app,
        "POST",
        &format!("/onboarding/{session_id}/complete"),
        Some(json!({ "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["slug"], "acme");
    assert_eq!(json["status"], "active");
    assert_eq!(json["resumed"], false);
    assert!(json["login_token"]["access_token"].is_string());
    assert_eq!(state.vendor.vendor_count(), 1);

    let tenant_id = json["tenant_id"].as_str().unwrap().to_string();
    let response = send(&app, "GET", &format!("/tenants/{tenant_id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "active");
    assert_eq!(json["saga_state"], "Completed");
    assert!(
        json["completed_steps"]
            .as_array()
            .unwrap()
            .contains(&json!("activate_tenant"))
    );

    // Repeating the call is safe
    let response = send(
        &app,
        "POST",
        &format!("/onboarding/{session_id}/complete"),
        Some(json!({ "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["resumed"], true);
    assert_eq!(json["tenant_id"], tenant_id.as_str());
}

#[tokio::test]
async fn test_reserve_slug_reports_conflict_with_suggestions() {
    let app = setup();
    let first = create_session(&app, "Acme", None).await;
    let second = create_session(&app, "Acme Two", None).await;

    let response = send(
        &app,
        "POST",
        "/slugs/reserve",
        Some(json!({ "slug": "acme", "session_id": first })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["available"], true);

    let response = send(
        &app,
        "POST",
        "/slugs/reserve",
        Some(json!({ "slug": "acme", "session_id": second })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["available"], false);
    assert_eq!(json["suggestions"], json!(["acme-1", "acme-2", "acme-3"]));
}

#[tokio::test]
async fn test_reserve_invalid_slug() {
    let app = setup();
    let session_id = create_session(&app, "Acme", None).await;

    let response = send(
        &app,
        "POST",
        "/slugs/reserve",
        Some(json!({ "slug": "-acme", "session_id": session_id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reserve_for_unknown_session() {
    let app = setup();
    let response = send(
        &app,
        "POST",
        "/slugs/reserve",
        Some(json!({
            "slug": "acme",
            "session_id": "00000000-0000-0000-0000-000000000000",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_complete_with_taken_slug_is_conflict() {
    let app = setup();
    let holder = create_session(&app, "Acme", Some("acme")).await;
    let other = create_session(&app, "Acme Again", Some("acme")).await;

    let response = send(
        &app,
        "POST",
        &format!("/onboarding/{holder}/complete"),
        Some(json!({ "password": "pw" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        "POST",
        &format!("/onboarding/{other}/complete"),
        Some(json!({ "password": "pw" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["suggestions"][0], "acme-1");
}

#[tokio::test]
async fn test_complete_unknown_session() {
    let app = setup();

    let response = send(
        &app,
        "POST",
        "/onboarding/00000000-0000-0000-0000-000000000000/complete",
        Some(json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "POST", "/onboarding/not-a-uuid/complete", Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fatal_provisioning_failure_is_bad_gateway() {
    let (app, state) = setup_with_state();
    state.authorization.set_fail_on_bootstrap(true);
    let session_id = create_session(&app, "Acme", Some("acme")).await;

    let response = send(
        &app,
        "POST",
        &format!("/onboarding/{session_id}/complete"),
        Some(json!({ "password": "pw" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = body_json(send(&app, "GET", &format!("/onboarding/{session_id}"), None).await).await;
    assert_eq!(json["status"], "failed");
    let tenant_id = json["tenant_id"].as_str().unwrap().to_string();

    let json = body_json(send(&app, "GET", &format!("/tenants/{tenant_id}"), None).await).await;
    assert_eq!(json["status"], "failed");
    assert_eq!(json["saga_state"], "Failed");
    assert_eq!(state.vendor.create_vendor_calls(), 0);
}

#[tokio::test]
async fn test_unknown_tenant() {
    let app = setup();
    let response = send(
        &app,
        "GET",
        "/tenants/00000000-0000-0000-0000-000000000000",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_reconcile() {
    let app = setup();
    let response = send(&app, "POST", "/admin/reconcile", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["scanned"], 0);
    assert_eq!(json["resumed"], 0);
    assert_eq!(json["failed"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let session_id = create_session(&app, "Acme", None).await;
    send(
        &app,
        "POST",
        "/slugs/reserve",
        Some(json!({ "slug": "acme", "session_id": session_id })),
    )
    .await;

    let response = send(&app, "GET", "/metrics", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("slug_reservations_total"));
}
