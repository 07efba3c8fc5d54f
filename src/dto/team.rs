use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{dao::models::TeamEntity, dto::format_system_time};

/// Registration of a team in a tournament.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinTournamentRequest {
    #[validate(length(min = 1, max = 50, message = "Team name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Captain is required"))]
    pub captain_id: String,
    /// Other members; the captain is always included.
    #[serde(default)]
    #[validate(length(max = 12))]
    pub member_ids: Vec<String>,
    /// Optional `#rrggbb` color. If omitted, the backend picks the first unused palette color.
    #[serde(default)]
    #[validate(custom(function = "crate::dto::validation::validate_hex_color"))]
    pub color: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "crate::dto::validation::validate_flag_code"))]
    pub flag_code: Option<String>,
}

/// Team as exposed over the API.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub id: Uuid,
    pub tournament_slug: String,
    pub name: String,
    pub color: String,
    pub flag_code: Option<String>,
    pub captain_id: String,
    pub member_ids: Vec<String>,
    pub created_at: String,
}

impl From<TeamEntity> for TeamView {
    fn from(team: TeamEntity) -> Self {
        Self {
            id: team.id,
            tournament_slug: team.tournament_slug,
            name: team.name,
            color: team.color,
            flag_code: team.flag_code,
            captain_id: team.captain_id,
            member_ids: team.member_ids,
            created_at: format_system_time(team.created_at),
        }
    }
}
