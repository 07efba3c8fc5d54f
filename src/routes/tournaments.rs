use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::{
        matches::MatchView,
        team::{JoinTournamentRequest, TeamView},
        tournament::{CreateTournamentRequest, GenerateScheduleRequest, ScheduleView, TournamentView},
    },
    error::AppError,
    routes::extract::{AuthUser, ValidatedJson},
    services::{team_service, tournament_service},
    state::SharedState,
};

/// Routes for tournaments, their teams and their schedule.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/tournaments", post(create_tournament))
        .route("/api/tournaments/{slug}", get(get_tournament))
        .route("/api/tournaments/{slug}/teams", get(list_teams).post(join_tournament))
        .route("/api/tournaments/{slug}/matches", get(list_matches))
        .route("/api/tournaments/{slug}/matches/generate", post(generate_schedule))
}

/// Create a tournament owned by the caller.
#[utoipa::path(
    post,
    path = "/api/tournaments",
    tag = "tournaments",
    request_body = CreateTournamentRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Tournament created", body = TournamentView),
        (status = 401, description = "Missing or invalid token"),
        (status = 409, description = "A tournament with the same slug exists")
    )
)]
pub async fn create_tournament(
    State(state): State<SharedState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateTournamentRequest>,
) -> Result<(StatusCode, Json<TournamentView>), AppError> {
    let tournament = tournament_service::create_tournament(&state, &user.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(tournament)))
}

#[utoipa::path(
    get,
    path = "/api/tournaments/{slug}",
    tag = "tournaments",
    params(("slug" = String, Path, description = "Tournament slug")),
    responses(
        (status = 200, description = "Tournament found", body = TournamentView),
        (status = 404, description = "Unknown tournament")
    )
)]
pub async fn get_tournament(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Json<TournamentView>, AppError> {
    Ok(Json(tournament_service::get_tournament(&state, &slug).await?))
}

#[utoipa::path(
    get,
    path = "/api/tournaments/{slug}/teams",
    tag = "teams",
    params(("slug" = String, Path, description = "Tournament slug")),
    responses((status = 200, description = "Registered teams", body = [TeamView]))
)]
pub async fn list_teams(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<TeamView>>, AppError> {
    Ok(Json(tournament_service::list_teams(&state, &slug).await?))
}

/// Register a team while registration is open.
#[utoipa::path(
    post,
    path = "/api/tournaments/{slug}/teams",
    tag = "teams",
    params(("slug" = String, Path, description = "Tournament slug")),
    request_body = JoinTournamentRequest,
    responses(
        (status = 201, description = "Team registered", body = TeamView),
        (status = 409, description = "Registration closed or tournament full")
    )
)]
pub async fn join_tournament(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(payload): ValidatedJson<JoinTournamentRequest>,
) -> Result<(StatusCode, Json<TeamView>), AppError> {
    let team = team_service::join_tournament(&state, &slug, payload).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

#[utoipa::path(
    get,
    path = "/api/tournaments/{slug}/matches",
    tag = "matches",
    params(("slug" = String, Path, description = "Tournament slug")),
    responses((status = 200, description = "Matches ordered by round", body = [MatchView]))
)]
pub async fn list_matches(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<MatchView>>, AppError> {
    Ok(Json(tournament_service::list_matches(&state, &slug).await?))
}

/// Replace the schedule with a round robin and close registration.
#[utoipa::path(
    post,
    path = "/api/tournaments/{slug}/matches/generate",
    tag = "matches",
    params(("slug" = String, Path, description = "Tournament slug")),
    request_body = GenerateScheduleRequest,
    responses(
        (status = 200, description = "Schedule generated", body = ScheduleView),
        (status = 400, description = "Fewer than two teams"),
        (status = 409, description = "Matches already started")
    )
)]
pub async fn generate_schedule(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(payload): ValidatedJson<GenerateScheduleRequest>,
) -> Result<Json<ScheduleView>, AppError> {
    Ok(Json(
        tournament_service::generate_schedule(&state, &slug, payload).await?,
    ))
}
