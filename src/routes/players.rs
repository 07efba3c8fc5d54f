use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::player::PlayerProfileView, error::AppError, services::xp_service, state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/api/players/{id}", get(get_player))
}

/// Experience, level and achievements of a player.
#[utoipa::path(
    get,
    path = "/api/players/{id}",
    tag = "players",
    params(("id" = String, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Player profile", body = PlayerProfileView),
        (status = 404, description = "Player has no profile yet")
    )
)]
pub async fn get_player(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<PlayerProfileView>, AppError> {
    Ok(Json(xp_service::get_profile(&state, &id).await?))
}
