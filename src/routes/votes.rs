use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::{
    dto::vote::{CastVoteRequest, VoteReceipt, VoteTally},
    error::AppError,
    routes::extract::{AuthUser, ValidatedJson},
    services::vote_service,
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/votes", post(cast_vote))
        .route("/api/tournaments/{slug}/votes/{category}", get(results))
}

/// Cast or replace the caller's vote in a category.
#[utoipa::path(
    post,
    path = "/api/votes",
    tag = "votes",
    request_body = CastVoteRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Vote recorded", body = VoteReceipt),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn cast_vote(
    State(state): State<SharedState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CastVoteRequest>,
) -> Result<Json<VoteReceipt>, AppError> {
    Ok(Json(vote_service::cast_vote(&state, &user.user_id, payload).await?))
}

#[utoipa::path(
    get,
    path = "/api/tournaments/{slug}/votes/{category}",
    tag = "votes",
    params(
        ("slug" = String, Path, description = "Tournament slug"),
        ("category" = String, Path, description = "Vote category")
    ),
    responses((status = 200, description = "Tally with percentages", body = VoteTally))
)]
pub async fn results(
    State(state): State<SharedState>,
    Path((slug, category)): Path<(String, String)>,
) -> Result<Json<VoteTally>, AppError> {
    Ok(Json(vote_service::results(&state, &slug, &category).await?))
}
