use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{error::AppError, services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "realtime",
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 404, description = "Relay runs in pooled mode")
    )
)]
/// Upgrade the HTTP connection into a local relay session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let hub = websocket_service::local_hub(&state)?;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(hub, socket)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
