//! DTOs for tournament creation and lookup.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{TournamentEntity, TournamentFormat},
    dto::{format_system_time, matches::MatchView},
};

/// Payload used to create a tournament.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTournamentRequest {
    #[validate(length(min = 1, max = 100, message = "Tournament name is required"))]
    pub name: String,
    /// Calendar date of the event (`YYYY-MM-DD`).
    #[validate(custom(function = "crate::dto::validation::validate_event_date"))]
    pub date: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[serde(default)]
    pub format: Option<TournamentFormat>,
    #[serde(default)]
    #[validate(range(min = 2, max = 64))]
    pub max_teams: Option<u32>,
}

/// Tournament as exposed over the API.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TournamentView {
    pub slug: String,
    pub name: String,
    pub date: String,
    pub location: Option<String>,
    pub format: TournamentFormat,
    pub max_teams: u32,
    pub is_open: bool,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TournamentEntity> for TournamentView {
    fn from(tournament: TournamentEntity) -> Self {
        Self {
            slug: tournament.slug,
            name: tournament.name,
            date: tournament.date,
            location: tournament.location,
            format: tournament.format,
            max_teams: tournament.max_teams,
            is_open: tournament.is_open,
            owner_id: tournament.owner_id,
            created_at: format_system_time(tournament.created_at),
            updated_at: format_system_time(tournament.updated_at),
        }
    }
}

/// Optional overrides for schedule generation.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateScheduleRequest {
    /// Games rotated across rounds; defaults to the classic line-up.
    #[serde(default)]
    #[validate(length(max = 20))]
    pub games: Vec<String>,
}

/// Matches produced by schedule generation.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    pub rounds: u32,
    pub matches: Vec<MatchView>,
}
