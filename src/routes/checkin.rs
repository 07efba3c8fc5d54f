use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::checkin::{
        CheckInRequest, CheckInResponse, CheckInStatusQuery, CheckInStatusResponse,
        CreateRsvpRequest, RsvpView, UpdateRsvpStatusRequest,
    },
    error::AppError,
    routes::extract::{AppQuery, ValidatedJson},
    services::checkin_service::{self, CheckInOutcome},
    state::SharedState,
};

/// RSVP and check-in routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/rsvps", post(create_rsvp))
        .route(
            "/api/check-in",
            get(check_in_status).post(check_in).put(update_status),
        )
}

#[utoipa::path(
    post,
    path = "/api/rsvps",
    tag = "check-in",
    request_body = CreateRsvpRequest,
    responses(
        (status = 201, description = "RSVP registered as pending", body = RsvpView),
        (status = 404, description = "Unknown tournament")
    )
)]
pub async fn create_rsvp(
    State(state): State<SharedState>,
    ValidatedJson(payload): ValidatedJson<CreateRsvpRequest>,
) -> Result<(StatusCode, Json<RsvpView>), AppError> {
    let rsvp = checkin_service::create_rsvp(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(rsvp)))
}

/// Look up one attendee by `rsvpId`, or a tournament's attendance summary by `tournamentSlug`.
#[utoipa::path(
    get,
    path = "/api/check-in",
    tag = "check-in",
    params(CheckInStatusQuery),
    responses(
        (status = 200, description = "Attendee or summary", body = CheckInStatusResponse),
        (status = 400, description = "Neither query parameter given"),
        (status = 404, description = "Unknown RSVP or tournament")
    )
)]
pub async fn check_in_status(
    State(state): State<SharedState>,
    AppQuery(query): AppQuery<CheckInStatusQuery>,
) -> Result<Json<CheckInStatusResponse>, AppError> {
    let response = match (query.rsvp_id, query.tournament_slug) {
        (Some(rsvp_id), _) => {
            CheckInStatusResponse::Attendee(checkin_service::rsvp_status(&state, &rsvp_id).await?)
        }
        (None, Some(slug)) => {
            CheckInStatusResponse::Summary(checkin_service::summary(&state, &slug).await?)
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "rsvpId or tournamentSlug is required".into(),
            ));
        }
    };
    Ok(Json(response))
}

/// Check an attendee in. A second check-in is answered with `400 Already checked in`.
#[utoipa::path(
    post,
    path = "/api/check-in",
    tag = "check-in",
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Attendee checked in", body = CheckInResponse),
        (status = 400, description = "Already checked in or RSVP cancelled"),
        (status = 404, description = "Unknown RSVP")
    )
)]
pub async fn check_in(
    State(state): State<SharedState>,
    ValidatedJson(payload): ValidatedJson<CheckInRequest>,
) -> Result<Json<CheckInResponse>, AppError> {
    match checkin_service::check_in(&state, &payload.rsvp_id, payload.method).await? {
        CheckInOutcome::CheckedIn(rsvp, joined_rooms) => Ok(Json(CheckInResponse {
            success: true,
            message: format!("{} checked in", rsvp.full_name),
            rsvp: rsvp.into(),
            joined_rooms,
        })),
        CheckInOutcome::AlreadyCheckedIn(_) => {
            Err(AppError::BadRequest("Already checked in".into()))
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/check-in",
    tag = "check-in",
    request_body = UpdateRsvpStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = RsvpView),
        (status = 404, description = "Unknown RSVP")
    )
)]
pub async fn update_status(
    State(state): State<SharedState>,
    ValidatedJson(payload): ValidatedJson<UpdateRsvpStatusRequest>,
) -> Result<Json<RsvpView>, AppError> {
    Ok(Json(checkin_service::update_status(&state, payload).await?))
}
