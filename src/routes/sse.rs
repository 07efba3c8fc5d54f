use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use crate::{
    error::AppError, routes::extract::AppQuery, services::sse_service, state::SharedState,
};

/// Optional event filter for a room stream.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoomStreamQuery {
    /// Comma-separated event names; every event is forwarded when absent.
    pub events: Option<String>,
}

#[utoipa::path(
    get,
    path = "/sse/rooms/{room_id}",
    tag = "realtime",
    params(("room_id" = String, Path, description = "Room identifier"), RoomStreamQuery),
    responses(
        (status = 200, description = "Room event stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Room does not exist")
    )
)]
/// Stream the events published to one room.
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    AppQuery(query): AppQuery<RoomStreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let events: Vec<&str> = query
        .events
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let (subscription, receiver) = sse_service::subscribe_room(&state, &room_id, &events)?;
    info!(room = %room_id, "new room SSE connection");
    Ok(sse_service::to_sse_stream(subscription, receiver))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/rooms/{room_id}", get(room_stream))
}
