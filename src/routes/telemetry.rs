use axum::{Json, Router, extract::State, routing::post};
use serde_json::Value;

use crate::{
    dto::telemetry::TelemetryAck,
    error::AppError,
    routes::extract::AppJson,
    services::telemetry_service::{self, TelemetryKind},
    state::SharedState,
};

/// Client telemetry sinks.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/logs", post(logs))
        .route("/api/errors", post(errors))
        .route("/api/metrics", post(metrics))
        .route("/api/analytics", post(analytics))
}

async fn sink(state: &SharedState, kind: TelemetryKind, payload: Value) -> Result<Json<TelemetryAck>, AppError> {
    Ok(Json(telemetry_service::record(state, kind, payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/logs",
    tag = "telemetry",
    request_body(content = Object, description = "Log entry; `message` is required"),
    responses(
        (status = 200, description = "Accepted", body = TelemetryAck),
        (status = 400, description = "Missing `message`")
    )
)]
pub async fn logs(
    State(state): State<SharedState>,
    AppJson(payload): AppJson<Value>,
) -> Result<Json<TelemetryAck>, AppError> {
    sink(&state, TelemetryKind::Logs, payload).await
}

#[utoipa::path(
    post,
    path = "/api/errors",
    tag = "telemetry",
    request_body(content = Object, description = "Client error report; `message` is required"),
    responses(
        (status = 200, description = "Accepted", body = TelemetryAck),
        (status = 400, description = "Missing `message`")
    )
)]
pub async fn errors(
    State(state): State<SharedState>,
    AppJson(payload): AppJson<Value>,
) -> Result<Json<TelemetryAck>, AppError> {
    sink(&state, TelemetryKind::Errors, payload).await
}

#[utoipa::path(
    post,
    path = "/api/metrics",
    tag = "telemetry",
    request_body(content = Object, description = "Client metric; `name` is required"),
    responses(
        (status = 200, description = "Accepted", body = TelemetryAck),
        (status = 400, description = "Missing `name`")
    )
)]
pub async fn metrics(
    State(state): State<SharedState>,
    AppJson(payload): AppJson<Value>,
) -> Result<Json<TelemetryAck>, AppError> {
    sink(&state, TelemetryKind::Metrics, payload).await
}

#[utoipa::path(
    post,
    path = "/api/analytics",
    tag = "telemetry",
    request_body(content = Object, description = "Analytics event; `event` is required"),
    responses(
        (status = 200, description = "Accepted", body = TelemetryAck),
        (status = 400, description = "Missing `event`")
    )
)]
pub async fn analytics(
    State(state): State<SharedState>,
    AppJson(payload): AppJson<Value>,
) -> Result<Json<TelemetryAck>, AppError> {
    sink(&state, TelemetryKind::Analytics, payload).await
}
