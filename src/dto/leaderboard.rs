use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::read_models::{LeaderboardEntry, TeamStats},
    dto::matches::MatchView,
};

/// One leaderboard row.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntryView {
    pub rank: u32,
    pub team_id: Uuid,
    pub team_name: String,
    pub color: String,
    pub flag_code: Option<String>,
    pub played: u32,
    pub wins: u32,
    pub losses: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub point_differential: i64,
}

impl From<LeaderboardEntry> for LeaderboardEntryView {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            rank: entry.rank,
            team_id: entry.team_id,
            team_name: entry.team_name,
            color: entry.color,
            flag_code: entry.flag_code,
            played: entry.played,
            wins: entry.wins,
            losses: entry.losses,
            points_for: entry.points_for,
            points_against: entry.points_against,
            point_differential: entry.point_differential,
        }
    }
}

/// Aggregated record of one team.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatsView {
    pub team_id: Uuid,
    pub team_name: String,
    pub tournament_slug: String,
    pub played: u32,
    pub wins: u32,
    pub losses: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub point_differential: i64,
    /// Win ratio in percent.
    pub win_rate: f64,
    pub recent_matches: Vec<MatchView>,
    pub upcoming_matches: Vec<MatchView>,
}

impl From<TeamStats> for TeamStatsView {
    fn from(stats: TeamStats) -> Self {
        Self {
            team_id: stats.team_id,
            team_name: stats.team_name,
            tournament_slug: stats.tournament_slug,
            played: stats.record.played,
            wins: stats.record.wins,
            losses: stats.record.losses,
            points_for: stats.record.points_for,
            points_against: stats.record.points_against,
            point_differential: stats.record.point_differential(),
            win_rate: stats.win_rate,
            recent_matches: stats.recent_matches.into_iter().map(MatchView::from).collect(),
            upcoming_matches: stats.upcoming_matches.into_iter().map(MatchView::from).collect(),
        }
    }
}
