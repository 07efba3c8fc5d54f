use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use beer_olympics_back::{
    app,
    config::AppConfig,
    dao::models::{RsvpEntity, RsvpStatus},
    state::{
        AppState, SharedState,
        clock::{Clock, ManualClock},
    },
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_app() -> (SharedState, Router) {
    let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
    (state.clone(), app(state))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn seed_rsvp(state: &SharedState, id: &str) {
    let now = state.clock().now();
    let rsvp = RsvpEntity {
        id: id.into(),
        tournament_slug: "summer-games".into(),
        full_name: "Alex Doe".into(),
        email: "alex@example.com".into(),
        user_id: None,
        team_id: None,
        status: RsvpStatus::Pending,
        check_in_method: None,
        checked_in_at: None,
        created_at: now,
        updated_at: now,
    };
    let documents = state.require_documents().await.unwrap();
    documents.upsert(&rsvp).await.unwrap();
}

#[tokio::test]
async fn check_in_is_not_repeatable() {
    let (state, router) = test_app();
    seed_rsvp(&state, "rsvp-1").await;

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/api/check-in", json!({ "rsvpId": "rsvp-1", "method": "manual" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["rsvp"]["status"], json!("checked_in"));
    assert_eq!(body["rsvp"]["checkInMethod"], json!("manual"));
    let checked_in_at = body["rsvp"]["checkedInAt"].clone();
    assert!(checked_in_at.is_string());

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/api/check-in", json!({ "rsvpId": "rsvp-1" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Already checked in" }));

    let (status, body) = send(
        &router,
        Request::get("/api/check-in?rsvpId=rsvp-1").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkedInAt"], checked_in_at);
}

#[tokio::test]
async fn check_in_status_requires_a_parameter() {
    let (_, router) = test_app();
    let (status, body) = send(&router, Request::get("/api/check-in").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("rsvpId or tournamentSlug is required"));
}

#[tokio::test]
async fn creating_a_tournament_requires_a_token() {
    let (_, router) = test_app();
    let (status, body) = send(
        &router,
        json_request(
            Method::POST,
            "/api/tournaments",
            json!({ "name": "Summer Games", "date": "2026-07-04" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn created_tournament_can_be_fetched_by_slug() {
    let (state, router) = test_app();
    let token = state.jwt().issue("organiser-1", Some("Sam")).unwrap();

    let (status, body) = send(
        &router,
        json_request(
            Method::POST,
            "/api/tournaments",
            json!({ "name": "Summer Games", "date": "2026-07-04" }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["slug"], json!("summer-games"));

    let (status, body) = send(
        &router,
        Request::get("/api/tournaments/summer-games").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("Summer Games"));

    let (status, _) = send(
        &router,
        Request::get("/api/tournaments/winter-games").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_routes_and_methods_use_the_error_shape() {
    let (_, router) = test_app();

    let (status, body) = send(&router, Request::get("/api/nope").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Not found" }));

    let (status, body) = send(
        &router,
        Request::delete("/api/tournaments").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({ "error": "Method not allowed" }));
}

#[tokio::test]
async fn preflight_requests_are_answered() {
    let (_, router) = test_app();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/check-in")
        .header(header::ORIGIN, "https://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn telemetry_sinks_validate_their_required_field() {
    let (_, router) = test_app();

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/api/metrics", json!({ "value": 12 }), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Missing required field: name"));

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/api/logs", json!({ "message": "hello", "level": "info" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_object());
}

#[tokio::test]
async fn healthcheck_reports_in_memory_backends() {
    let (_, router) = test_app();
    let (status, body) = send(&router, Request::get("/healthcheck").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["storage"], json!(true));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (_, router) = test_app();
    let (status, body) = send(&router, Request::get("/api-doc/openapi.json").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/check-in"].is_object());
}
