//! Projections derived from stored documents: leaderboard standings and team statistics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::{
    cache::{Cache, CacheTtl, keys},
    document_store::{DocumentQuery, Documents},
    models::{MatchEntity, MatchStatus, TeamEntity, team_key},
    storage::StorageResult,
};

/// Completed matches listed in a team's recent form.
const RECENT_MATCHES: usize = 5;

/// One row of a tournament leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
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

/// Win/loss record of a team over completed matches.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamRecord {
    pub played: u32,
    pub wins: u32,
    pub losses: u32,
    pub points_for: u32,
    pub points_against: u32,
}

impl TeamRecord {
    fn record(&mut self, scored: u32, conceded: u32, won: bool) {
        self.played += 1;
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.points_for += scored;
        self.points_against += conceded;
    }

    pub fn point_differential(&self) -> i64 {
        i64::from(self.points_for) - i64::from(self.points_against)
    }
}

/// Aggregated statistics for a single team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamStats {
    pub team_id: Uuid,
    pub team_name: String,
    pub tournament_slug: String,
    pub record: TeamRecord,
    /// Win ratio in percent with one decimal.
    pub win_rate: f64,
    /// Latest completed matches, most recent first.
    pub recent_matches: Vec<MatchEntity>,
    pub upcoming_matches: Vec<MatchEntity>,
}

fn match_outcome(game: &MatchEntity, team_id: Uuid) -> Option<(u32, u32, bool)> {
    if game.status != MatchStatus::Completed || !game.involves(team_id) {
        return None;
    }
    let (scored, conceded) = if game.team_a == team_id {
        (game.score_a, game.score_b)
    } else {
        (game.score_b, game.score_a)
    };
    Some((scored, conceded, game.winner == Some(team_id)))
}

/// Rank teams by wins, then point differential, then points scored, then name.
pub fn compute_leaderboard(teams: &[TeamEntity], matches: &[MatchEntity]) -> Vec<LeaderboardEntry> {
    let mut records: HashMap<Uuid, TeamRecord> =
        teams.iter().map(|team| (team.id, TeamRecord::default())).collect();

    for game in matches.iter().filter(|m| m.status == MatchStatus::Completed) {
        for team_id in [game.team_a, game.team_b] {
            if let (Some(record), Some((scored, conceded, won))) =
                (records.get_mut(&team_id), match_outcome(game, team_id))
            {
                record.record(scored, conceded, won);
            }
        }
    }

    let mut rows = teams
        .iter()
        .map(|team| (team, records.get(&team.id).copied().unwrap_or_default()))
        .collect::<Vec<_>>();
    rows.sort_by(|(team_a, a), (team_b, b)| {
        b.wins
            .cmp(&a.wins)
            .then_with(|| b.point_differential().cmp(&a.point_differential()))
            .then_with(|| b.points_for.cmp(&a.points_for))
            .then_with(|| team_a.name.cmp(&team_b.name))
    });

    rows.into_iter()
        .enumerate()
        .map(|(index, (team, record))| LeaderboardEntry {
            rank: index as u32 + 1,
            team_id: team.id,
            team_name: team.name.clone(),
            color: team.color.clone(),
            flag_code: team.flag_code.clone(),
            played: record.played,
            wins: record.wins,
            losses: record.losses,
            points_for: record.points_for,
            points_against: record.points_against,
            point_differential: record.point_differential(),
        })
        .collect()
}

/// Compute the statistics of `team` from the matches of its tournament.
pub fn compute_team_stats(team: &TeamEntity, matches: &[MatchEntity]) -> TeamStats {
    let mut record = TeamRecord::default();
    let mut completed = Vec::new();
    let mut upcoming = Vec::new();

    for game in matches.iter().filter(|m| m.involves(team.id)) {
        if let Some((scored, conceded, won)) = match_outcome(game, team.id) {
            record.record(scored, conceded, won);
            completed.push(game.clone());
        } else if game.is_upcoming() {
            upcoming.push(game.clone());
        }
    }

    completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    completed.truncate(RECENT_MATCHES);
    upcoming.sort_by_key(|m| m.round);

    let win_rate = if record.played == 0 {
        0.0
    } else {
        (f64::from(record.wins) * 1000.0 / f64::from(record.played)).round() / 10.0
    };

    TeamStats {
        team_id: team.id,
        team_name: team.name.clone(),
        tournament_slug: team.tournament_slug.clone(),
        record,
        win_rate,
        recent_matches: completed,
        upcoming_matches: upcoming,
    }
}

pub async fn load_teams(documents: &Documents, slug: &str) -> StorageResult<Vec<TeamEntity>> {
    documents
        .query(DocumentQuery::for_document::<TeamEntity>().filter("tournament_slug", slug))
        .await
}

pub async fn load_matches(documents: &Documents, slug: &str) -> StorageResult<Vec<MatchEntity>> {
    let mut matches: Vec<MatchEntity> = documents
        .query(DocumentQuery::for_document::<MatchEntity>().filter("tournament_slug", slug))
        .await?;
    matches.sort_by(|a, b| a.round.cmp(&b.round).then_with(|| a.id.cmp(&b.id)));
    Ok(matches)
}

async fn build_leaderboard(documents: &Documents, slug: &str) -> StorageResult<Vec<LeaderboardEntry>> {
    let teams = load_teams(documents, slug).await?;
    let matches = load_matches(documents, slug).await?;
    Ok(compute_leaderboard(&teams, &matches))
}

/// Leaderboard of a tournament, served from the cache when fresh.
pub async fn leaderboard(
    documents: &Documents,
    cache: &Cache,
    slug: &str,
) -> StorageResult<Vec<LeaderboardEntry>> {
    cache
        .get_or_load(&keys::leaderboard(slug), CacheTtl::Leaderboard, || {
            build_leaderboard(documents, slug)
        })
        .await
}

/// Recompute the leaderboard from the store and overwrite the cached copy.
pub async fn refresh_leaderboard(
    documents: &Documents,
    cache: &Cache,
    slug: &str,
) -> StorageResult<Vec<LeaderboardEntry>> {
    let board = build_leaderboard(documents, slug).await?;
    cache
        .set(&keys::leaderboard(slug), &board, CacheTtl::Leaderboard)
        .await;
    Ok(board)
}

/// Statistics of one team; `None` when the team does not exist.
pub async fn team_stats(
    documents: &Documents,
    cache: &Cache,
    team_id: Uuid,
) -> StorageResult<Option<TeamStats>> {
    let key = keys::team_stats(&team_id.to_string());
    if let Some(hit) = cache.get::<TeamStats>(&key).await {
        return Ok(Some(hit));
    }

    let Some(team) = documents.get::<TeamEntity>(&team_key(team_id)).await? else {
        return Ok(None);
    };
    let matches = load_matches(documents, &team.tournament_slug).await?;
    let stats = compute_team_stats(&team, &matches);
    cache.set(&key, &stats, CacheTtl::Stats).await;
    Ok(Some(stats))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, SystemTime},
    };

    use super::*;
    use crate::{
        dao::{cache::memory::MemoryCache, document_store::memory::MemoryDocumentStore},
        state::clock::ManualClock,
    };

    fn team(name: &str) -> TeamEntity {
        TeamEntity {
            id: Uuid::new_v4(),
            tournament_slug: "spring".into(),
            name: name.into(),
            color: "#ff0000".into(),
            flag_code: None,
            captain_id: format!("{name}-captain"),
            member_ids: vec![format!("{name}-captain")],
            created_at: SystemTime::UNIX_EPOCH,
        }
    }

    fn played(round: u32, a: &TeamEntity, b: &TeamEntity, score_a: u32, score_b: u32) -> MatchEntity {
        let winner = if score_a > score_b { a.id } else { b.id };
        MatchEntity {
            id: Uuid::new_v4(),
            tournament_slug: "spring".into(),
            round,
            game: "beer-pong".into(),
            team_a: a.id,
            team_b: b.id,
            score_a,
            score_b,
            status: MatchStatus::Completed,
            winner: Some(winner),
            created_at: SystemTime::UNIX_EPOCH,
            started_at: None,
            completed_at: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(round))),
        }
    }

    #[test]
    fn leaderboard_orders_by_wins_then_differential_then_name() {
        let hops = team("Hops");
        let barley = team("Barley");
        let malt = team("Malt");
        let matches = vec![
            played(1, &hops, &barley, 10, 2),
            played(2, &barley, &malt, 6, 5),
            played(3, &malt, &hops, 7, 3),
        ];

        let board = compute_leaderboard(&[hops.clone(), barley.clone(), malt.clone()], &matches);
        let order = board.iter().map(|e| e.team_name.as_str()).collect::<Vec<_>>();

        // Every team has one win; differentials are +4, -7, +3.
        assert_eq!(order, vec!["Hops", "Malt", "Barley"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].point_differential, 4);
        assert_eq!(board[2].rank, 3);
    }

    #[test]
    fn unplayed_teams_are_ranked_by_name() {
        let board = compute_leaderboard(&[team("Zymurgy"), team("Ale")], &[]);
        assert_eq!(board[0].team_name, "Ale");
        assert_eq!(board[0].played, 0);
    }

    #[test]
    fn team_stats_split_recent_and_upcoming() {
        let hops = team("Hops");
        let barley = team("Barley");
        let mut upcoming = played(3, &hops, &barley, 0, 0);
        upcoming.status = MatchStatus::Scheduled;
        upcoming.winner = None;
        let matches = vec![
            played(1, &hops, &barley, 10, 2),
            played(2, &barley, &hops, 6, 5),
            upcoming,
        ];

        let stats = compute_team_stats(&hops, &matches);
        assert_eq!(stats.record.played, 2);
        assert_eq!(stats.record.wins, 1);
        assert_eq!(stats.win_rate, 50.0);
        assert_eq!(stats.recent_matches[0].round, 2);
        assert_eq!(stats.upcoming_matches.len(), 1);
    }

    #[tokio::test]
    async fn leaderboard_is_served_from_cache_until_refreshed() {
        let documents = Documents::new(Arc::new(MemoryDocumentStore::new()));
        let cache = Cache::new(Arc::new(MemoryCache::new(Arc::new(ManualClock::default()))));
        let hops = team("Hops");
        documents.upsert(&hops).await.unwrap();

        assert_eq!(leaderboard(&documents, &cache, "spring").await.unwrap().len(), 1);

        documents.upsert(&team("Barley")).await.unwrap();
        assert_eq!(leaderboard(&documents, &cache, "spring").await.unwrap().len(), 1);

        refresh_leaderboard(&documents, &cache, "spring").await.unwrap();
        assert_eq!(leaderboard(&documents, &cache, "spring").await.unwrap().len(), 2);
    }
}
