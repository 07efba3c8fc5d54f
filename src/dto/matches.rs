use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{MatchEntity, MatchStatus},
    dto::format_system_time,
};

/// Match as exposed over the API.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub id: Uuid,
    pub tournament_slug: String,
    pub round: u32,
    pub game: String,
    pub team_a: Uuid,
    pub team_b: Uuid,
    pub score_a: u32,
    pub score_b: u32,
    pub status: MatchStatus,
    pub winner: Option<Uuid>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<MatchEntity> for MatchView {
    fn from(game: MatchEntity) -> Self {
        Self {
            id: game.id,
            tournament_slug: game.tournament_slug,
            round: game.round,
            game: game.game,
            team_a: game.team_a,
            team_b: game.team_b,
            score_a: game.score_a,
            score_b: game.score_b,
            status: game.status,
            winner: game.winner,
            started_at: game.started_at.map(format_system_time),
            completed_at: game.completed_at.map(format_system_time),
        }
    }
}

/// Points scored by one side of a match.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdateRequest {
    pub team_id: Uuid,
    #[validate(range(min = 1, max = 100))]
    pub points: u32,
}

/// Final score override applied when closing a match.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMatchRequest {
    #[serde(default)]
    pub score_a: Option<u32>,
    #[serde(default)]
    pub score_b: Option<u32>,
}
