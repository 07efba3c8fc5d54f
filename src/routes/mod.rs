use axum::{Router, middleware};

use crate::{
    error::{self, AppError},
    state::SharedState,
};

pub mod checkin;
pub mod docs;
pub mod extract;
pub mod health;
pub mod leaderboard;
pub mod matches;
pub mod media;
pub mod players;
pub mod realtime;
pub mod sse;
pub mod telemetry;
pub mod tournaments;
pub mod votes;
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(tournaments::router())
        .merge(matches::router())
        .merge(leaderboard::router())
        .merge(checkin::router())
        .merge(votes::router())
        .merge(players::router())
        .merge(media::router(state.config().max_upload_bytes))
        .merge(telemetry::router())
        .merge(realtime::router())
        .merge(sse::router())
        .merge(websocket::router())
        .merge(docs::router());

    api_router
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::map_response_with_state(
            state.clone(),
            error::expose_internal_detail,
        ))
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("Not found".into())
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
