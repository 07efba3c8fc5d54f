use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::leaderboard::{LeaderboardEntryView, TeamStatsView},
    error::AppError,
    services::leaderboard_service,
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/tournaments/{slug}/leaderboard", get(leaderboard))
        .route("/api/teams/{id}/stats", get(team_stats))
}

/// Standings ranked by wins, point differential, points scored, then name.
#[utoipa::path(
    get,
    path = "/api/tournaments/{slug}/leaderboard",
    tag = "leaderboard",
    params(("slug" = String, Path, description = "Tournament slug")),
    responses((status = 200, description = "Current standings", body = [LeaderboardEntryView]))
)]
pub async fn leaderboard(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<LeaderboardEntryView>>, AppError> {
    Ok(Json(leaderboard_service::leaderboard(&state, &slug).await?))
}

#[utoipa::path(
    get,
    path = "/api/teams/{id}/stats",
    tag = "leaderboard",
    params(("id" = Uuid, Path, description = "Team identifier")),
    responses(
        (status = 200, description = "Team record and form", body = TeamStatsView),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn team_stats(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TeamStatsView>, AppError> {
    Ok(Json(leaderboard_service::team_stats(&state, id).await?))
}
