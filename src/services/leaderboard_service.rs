use uuid::Uuid;

use crate::{
    dao::read_models,
    dto::leaderboard::{LeaderboardEntryView, TeamStatsView},
    error::ServiceError,
    services::tournament_service,
    state::SharedState,
};

/// Standings of a tournament, cache-warmed.
pub async fn leaderboard(
    state: &SharedState,
    slug: &str,
) -> Result<Vec<LeaderboardEntryView>, ServiceError> {
    let documents = state.require_documents().await?;
    tournament_service::load_tournament(state, &documents, slug).await?;
    let board = read_models::leaderboard(&documents, state.cache(), slug).await?;
    Ok(board.into_iter().map(LeaderboardEntryView::from).collect())
}

pub async fn team_stats(state: &SharedState, team_id: Uuid) -> Result<TeamStatsView, ServiceError> {
    let documents = state.require_documents().await?;
    read_models::team_stats(&documents, state.cache(), team_id)
        .await?
        .map(TeamStatsView::from)
        .ok_or_else(|| ServiceError::NotFound("Team not found".into()))
}
