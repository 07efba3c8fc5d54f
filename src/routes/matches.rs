use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::matches::{CompleteMatchRequest, MatchView, ScoreUpdateRequest},
    error::AppError,
    routes::extract::ValidatedJson,
    services::match_service,
    state::SharedState,
};

/// Live scoring routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/matches/{id}/score", post(record_score))
        .route("/api/matches/{id}/complete", post(complete_match))
}

/// Add points for one team and broadcast the new score.
#[utoipa::path(
    post,
    path = "/api/matches/{id}/score",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = ScoreUpdateRequest,
    responses(
        (status = 200, description = "Score recorded", body = MatchView),
        (status = 404, description = "Unknown match"),
        (status = 409, description = "Match already completed")
    )
)]
pub async fn record_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ScoreUpdateRequest>,
) -> Result<Json<MatchView>, AppError> {
    Ok(Json(match_service::record_score(&state, id, payload).await?))
}

/// Close a match; the higher score wins and ties are rejected.
#[utoipa::path(
    post,
    path = "/api/matches/{id}/complete",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = CompleteMatchRequest,
    responses(
        (status = 200, description = "Match completed", body = MatchView),
        (status = 400, description = "Scores are tied"),
        (status = 409, description = "Match already completed")
    )
)]
pub async fn complete_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<CompleteMatchRequest>,
) -> Result<Json<MatchView>, AppError> {
    Ok(Json(match_service::complete_match(&state, id, payload).await?))
}
