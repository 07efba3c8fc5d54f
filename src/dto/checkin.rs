//! DTOs for RSVPs and event-day check-in.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{CheckInMethod, RsvpEntity, RsvpStatus},
    dto::format_system_time,
};

/// Registration of an attendee.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRsvpRequest {
    #[validate(length(min = 1, message = "Tournament is required"))]
    pub tournament_slug: String,
    #[validate(length(min = 1, max = 100, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<Uuid>,
}

/// Attendee record as exposed over the API.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RsvpView {
    pub id: String,
    pub tournament_slug: String,
    pub full_name: String,
    pub email: String,
    pub user_id: Option<String>,
    pub team_id: Option<Uuid>,
    pub status: RsvpStatus,
    pub check_in_method: Option<CheckInMethod>,
    pub checked_in_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<RsvpEntity> for RsvpView {
    fn from(rsvp: RsvpEntity) -> Self {
        Self {
            id: rsvp.id,
            tournament_slug: rsvp.tournament_slug,
            full_name: rsvp.full_name,
            email: rsvp.email,
            user_id: rsvp.user_id,
            team_id: rsvp.team_id,
            status: rsvp.status,
            check_in_method: rsvp.check_in_method,
            checked_in_at: rsvp.checked_in_at.map(format_system_time),
            created_at: format_system_time(rsvp.created_at),
            updated_at: format_system_time(rsvp.updated_at),
        }
    }
}

/// Check an attendee in.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    #[validate(length(min = 1, message = "RSVP id is required"))]
    pub rsvp_id: String,
    #[serde(default = "default_method")]
    pub method: CheckInMethod,
}

fn default_method() -> CheckInMethod {
    CheckInMethod::Manual
}

/// Successful check-in.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub success: bool,
    pub message: String,
    pub rsvp: RsvpView,
    /// Rooms the attendee's team members were joined to.
    pub joined_rooms: Vec<String>,
}

/// Lookup of either one attendee or a tournament summary.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CheckInStatusQuery {
    pub rsvp_id: Option<String>,
    pub tournament_slug: Option<String>,
}

/// Attendance counts of a tournament.
#[derive(Debug, Default, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckInSummary {
    pub tournament_slug: String,
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub checked_in: usize,
    pub cancelled: usize,
    pub waitlisted: usize,
}

/// Response of `GET /api/check-in`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum CheckInStatusResponse {
    Attendee(RsvpView),
    Summary(CheckInSummary),
}

/// Manual status change by an organiser.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRsvpStatusRequest {
    #[validate(length(min = 1, message = "RSVP id is required"))]
    pub rsvp_id: String,
    pub status: RsvpStatus,
}
