use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::realtime::RealtimeMetricsResponse, services::realtime_service, state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/api/realtime/metrics", get(realtime_metrics))
}

/// Live rooms, relay connectivity and connection pool aggregates.
#[utoipa::path(
    get,
    path = "/api/realtime/metrics",
    tag = "realtime",
    responses((status = 200, description = "Real-time layer snapshot", body = RealtimeMetricsResponse))
)]
pub async fn realtime_metrics(State(state): State<SharedState>) -> Json<RealtimeMetricsResponse> {
    Json(realtime_service::metrics(&state))
}
