//! Live scoring and completion of matches.

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        cache::keys,
        document_store::Documents,
        models::{MatchEntity, MatchStatus, TeamEntity, match_key, team_key},
        read_models,
    },
    dto::matches::{CompleteMatchRequest, MatchView, ScoreUpdateRequest},
    error::ServiceError,
    realtime::{MatchEvent, TournamentEvent},
    services::{
        realtime_service, room_service,
        xp_service::{self, XpReward},
    },
    state::SharedState,
};

async fn load_match(documents: &Documents, match_id: Uuid) -> Result<MatchEntity, ServiceError> {
    documents
        .get::<MatchEntity>(&match_key(match_id))
        .await?
        .ok_or_else(|| ServiceError::NotFound("Match not found".into()))
}

/// Drop cached projections touched by a match change and push fresh standings to the
/// tournament room.
async fn refresh_standings(state: &SharedState, documents: &Documents, game: &MatchEntity) {
    let slug = &game.tournament_slug;
    state.cache().delete(&keys::matches(slug)).await;
    for team_id in [game.team_a, game.team_b] {
        state
            .cache()
            .delete(&keys::team_stats(&team_id.to_string()))
            .await;
    }

    match read_models::refresh_leaderboard(documents, state.cache(), slug).await {
        Ok(leaderboard) => realtime_service::publish(
            state,
            &room_service::tournament_room(slug),
            TournamentEvent::LeaderboardUpdated { leaderboard },
        ),
        Err(err) => {
            warn!(slug = %slug, error = %err, "failed to refresh leaderboard");
            state.cache().delete(&keys::leaderboard(slug)).await;
        }
    }
}

/// Add `points` to one side of a match, starting it if needed.
pub async fn record_score(
    state: &SharedState,
    match_id: Uuid,
    request: ScoreUpdateRequest,
) -> Result<MatchView, ServiceError> {
    let documents = state.require_documents().await?;
    let mut game = load_match(&documents, match_id).await?;
    if game.status == MatchStatus::Completed {
        return Err(ServiceError::InvalidState("Match is already completed".into()));
    }
    if request.team_id == game.team_a {
        game.score_a += request.points;
    } else if request.team_id == game.team_b {
        game.score_b += request.points;
    } else {
        return Err(ServiceError::InvalidInput("Team does not play in this match".into()));
    }
    if game.status == MatchStatus::Scheduled {
        game.status = MatchStatus::InProgress;
        game.started_at = Some(state.clock().now());
    }
    documents.upsert(&game).await?;

    realtime_service::publish(
        state,
        &room_service::match_room(game.id),
        MatchEvent::ScoreUpdate {
            match_id: game.id,
            team_id: request.team_id,
            points: request.points,
            score_a: game.score_a,
            score_b: game.score_b,
        },
    );
    refresh_standings(state, &documents, &game).await;

    Ok(game.into())
}

/// Close a match, decide the winner by score and reward the players.
pub async fn complete_match(
    state: &SharedState,
    match_id: Uuid,
    request: CompleteMatchRequest,
) -> Result<MatchView, ServiceError> {
    let documents = state.require_documents().await?;
    let mut game = load_match(&documents, match_id).await?;
    if game.status == MatchStatus::Completed {
        return Err(ServiceError::InvalidState("Match is already completed".into()));
    }

    let score_a = request.score_a.unwrap_or(game.score_a);
    let score_b = request.score_b.unwrap_or(game.score_b);
    if score_a == score_b {
        return Err(ServiceError::InvalidInput("Match cannot end in a tie".into()));
    }
    let winner = if score_a > score_b { game.team_a } else { game.team_b };

    let now = state.clock().now();
    game.score_a = score_a;
    game.score_b = score_b;
    game.winner = Some(winner);
    game.status = MatchStatus::Completed;
    game.started_at.get_or_insert(now);
    game.completed_at = Some(now);
    documents.upsert(&game).await?;
    info!(match_id = %game.id, winner = %winner, score_a, score_b, "match completed");

    realtime_service::publish(
        state,
        &room_service::match_room(game.id),
        MatchEvent::MatchCompleted {
            match_id: game.id,
            winner,
            score_a,
            score_b,
        },
    );
    refresh_standings(state, &documents, &game).await;

    for team_id in [game.team_a, game.team_b] {
        let Some(team) = documents.get::<TeamEntity>(&team_key(team_id)).await? else {
            warn!(team_id = %team_id, "completed match references a missing team");
            continue;
        };
        let rewards: &[XpReward] = if team_id == winner {
            &[XpReward::MatchPlayed, XpReward::MatchWon]
        } else {
            &[XpReward::MatchPlayed]
        };
        for member in &team.member_ids {
            xp_service::award_best_effort(state, &documents, member, rewards).await;
        }
    }

    Ok(game.into())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        config::AppConfig,
        dto::{team::JoinTournamentRequest, tournament::{CreateTournamentRequest, GenerateScheduleRequest}},
        services::{leaderboard_service, team_service, tournament_service},
        state::{AppState, clock::ManualClock},
    };

    async fn scheduled_match(state: &SharedState) -> MatchView {
        tournament_service::create_tournament(
            state,
            "owner",
            CreateTournamentRequest {
                name: "Spring".into(),
                date: "2025-06-21".into(),
                location: None,
                format: None,
                max_teams: None,
            },
        )
        .await
        .unwrap();
        for (name, captain) in [("Hops", "p1"), ("Malt", "p2")] {
            team_service::join_tournament(
                state,
                "spring",
                JoinTournamentRequest {
                    name: name.into(),
                    captain_id: captain.into(),
                    member_ids: Vec::new(),
                    color: None,
                    flag_code: None,
                },
            )
            .await
            .unwrap();
        }
        let schedule =
            tournament_service::generate_schedule(state, "spring", GenerateScheduleRequest::default())
                .await
                .unwrap();
        schedule.matches.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn scores_reach_the_match_room_and_the_leaderboard() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        let game = scheduled_match(&state).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = state
            .rooms()
            .subscribe(&room_service::match_room(game.id), &["score-update"], move |envelope| {
                sink.lock().unwrap().push(envelope.data.clone());
            })
            .unwrap();

        let updated = record_score(
            &state,
            game.id,
            ScoreUpdateRequest {
                team_id: game.team_a,
                points: 3,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.status, MatchStatus::InProgress);
        assert_eq!(updated.score_a, 3);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["points"], 3);
        assert_eq!(seen[0]["scoreA"], 3);
    }

    #[tokio::test]
    async fn scores_for_foreign_teams_are_rejected() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        let game = scheduled_match(&state).await;

        assert!(matches!(
            record_score(
                &state,
                game.id,
                ScoreUpdateRequest {
                    team_id: Uuid::new_v4(),
                    points: 1,
                },
            )
            .await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn completion_picks_the_winner_and_awards_xp() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        let game = scheduled_match(&state).await;

        let tie = complete_match(
            &state,
            game.id,
            CompleteMatchRequest {
                score_a: Some(5),
                score_b: Some(5),
            },
        )
        .await;
        assert!(matches!(tie, Err(ServiceError::InvalidInput(_))));

        let done = complete_match(
            &state,
            game.id,
            CompleteMatchRequest {
                score_a: Some(2),
                score_b: Some(7),
            },
        )
        .await
        .unwrap();
        assert_eq!(done.winner, Some(game.team_b));
        assert_eq!(done.status, MatchStatus::Completed);

        let board = leaderboard_service::leaderboard(&state, "spring").await.unwrap();
        assert_eq!(board[0].team_id, game.team_b);
        assert_eq!(board[0].wins, 1);

        let documents = state.require_documents().await.unwrap();
        let winner = documents.get::<TeamEntity>(&team_key(game.team_b)).await.unwrap().unwrap();
        let profile = xp_service::get_profile(&state, &winner.captain_id).await.unwrap();
        assert_eq!(profile.xp, 75);
        assert_eq!(profile.wins, 1);

        assert!(matches!(
            complete_match(&state, game.id, CompleteMatchRequest::default()).await,
            Err(ServiceError::InvalidState(_))
        ));
    }
}
