//! Tournament creation, lookup, listings and round-robin scheduling.

use rand::seq::SliceRandom;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        cache::{CacheTtl, keys},
        document_store::Documents,
        models::{
            MatchEntity, MatchStatus, TournamentEntity, TournamentFormat, match_key, tournament_key,
        },
        read_models,
    },
    dto::{
        matches::MatchView,
        team::TeamView,
        tournament::{CreateTournamentRequest, GenerateScheduleRequest, ScheduleView, TournamentView},
    },
    error::ServiceError,
    realtime::TournamentEvent,
    services::{realtime_service, room_service},
    state::SharedState,
};

/// Teams accepted when the request leaves the limit out.
const DEFAULT_MAX_TEAMS: u32 = 16;
/// Games rotated across rounds when none are supplied.
const DEFAULT_GAMES: [&str; 4] = ["beer-pong", "flip-cup", "quarters", "boat-race"];

/// Lowercase, dash-separated identifier derived from `name`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Create a tournament owned by `owner_id` and provision its rooms.
pub async fn create_tournament(
    state: &SharedState,
    owner_id: &str,
    request: CreateTournamentRequest,
) -> Result<TournamentView, ServiceError> {
    let documents = state.require_documents().await?;
    let slug = slugify(&request.name);
    if slug.is_empty() {
        return Err(ServiceError::InvalidInput(
            "Tournament name must contain letters or digits".into(),
        ));
    }
    if documents
        .get::<TournamentEntity>(&tournament_key(&slug))
        .await?
        .is_some()
    {
        return Err(ServiceError::Conflict(format!("Tournament {slug} already exists")));
    }

    let now = state.clock().now();
    let tournament = TournamentEntity {
        slug: slug.clone(),
        name: request.name.trim().to_string(),
        date: request.date,
        location: request.location,
        format: request.format.unwrap_or(TournamentFormat::RoundRobin),
        max_teams: request.max_teams.unwrap_or(DEFAULT_MAX_TEAMS),
        is_open: true,
        owner_id: owner_id.to_string(),
        created_at: now,
        updated_at: now,
    };
    documents.upsert(&tournament).await?;
    room_service::provision_tournament(state, &tournament);
    info!(slug = %slug, owner_id, "tournament created");

    Ok(tournament.into())
}

/// Load a tournament entity, failing with `NotFound`.
pub(crate) async fn load_tournament(
    state: &SharedState,
    documents: &Documents,
    slug: &str,
) -> Result<TournamentEntity, ServiceError> {
    state
        .cache()
        .get_or_load(&keys::tournament(slug), CacheTtl::Tournament, || async {
            documents
                .get::<TournamentEntity>(&tournament_key(slug))
                .await
                .map_err(ServiceError::from)?
                .ok_or_else(|| ServiceError::NotFound("Tournament not found".into()))
        })
        .await
}

pub async fn get_tournament(state: &SharedState, slug: &str) -> Result<TournamentView, ServiceError> {
    let documents = state.require_documents().await?;
    Ok(load_tournament(state, &documents, slug).await?.into())
}

pub async fn list_teams(state: &SharedState, slug: &str) -> Result<Vec<TeamView>, ServiceError> {
    let documents = state.require_documents().await?;
    load_tournament(state, &documents, slug).await?;
    let mut teams = state
        .cache()
        .get_or_load(&keys::teams(slug), CacheTtl::Teams, || {
            read_models::load_teams(&documents, slug)
        })
        .await?;
    teams.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    Ok(teams.into_iter().map(TeamView::from).collect())
}

pub async fn list_matches(state: &SharedState, slug: &str) -> Result<Vec<MatchView>, ServiceError> {
    let documents = state.require_documents().await?;
    load_tournament(state, &documents, slug).await?;
    let matches = state
        .cache()
        .get_or_load(&keys::matches(slug), CacheTtl::Matches, || {
            read_models::load_matches(&documents, slug)
        })
        .await?;
    Ok(matches.into_iter().map(MatchView::from).collect())
}

/// Pairings of a round robin over `teams` using the circle method.
///
/// Each inner vector is one round; with an odd team count one team sits out each round.
pub fn round_robin(teams: &[Uuid]) -> Vec<Vec<(Uuid, Uuid)>> {
    if teams.len() < 2 {
        return Vec::new();
    }
    let mut slots = teams.iter().copied().map(Some).collect::<Vec<_>>();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();

    (0..n - 1)
        .map(|_| {
            let round = (0..n / 2)
                .filter_map(|i| match (slots[i], slots[n - 1 - i]) {
                    (Some(a), Some(b)) => Some((a, b)),
                    _ => None,
                })
                .collect::<Vec<_>>();
            // Keep the first slot fixed and rotate the rest clockwise.
            slots[1..].rotate_right(1);
            round
        })
        .collect()
}

/// Replace the schedule of a tournament with a shuffled round robin and close registration.
pub async fn generate_schedule(
    state: &SharedState,
    slug: &str,
    request: GenerateScheduleRequest,
) -> Result<ScheduleView, ServiceError> {
    let documents = state.require_documents().await?;
    let mut tournament = load_tournament(state, &documents, slug).await?;
    let teams = read_models::load_teams(&documents, slug).await?;
    if teams.len() < 2 {
        return Err(ServiceError::InvalidInput(
            "At least two teams are needed to generate a schedule".into(),
        ));
    }
    let existing = read_models::load_matches(&documents, slug).await?;
    if existing.iter().any(|game| game.status != MatchStatus::Scheduled) {
        return Err(ServiceError::InvalidState(
            "Schedule cannot be regenerated once matches have started".into(),
        ));
    }
    for game in &existing {
        documents.remove(&match_key(game.id)).await?;
        room_service::remove_room(state, &room_service::match_room(game.id)).await;
    }

    let games = if request.games.is_empty() {
        DEFAULT_GAMES.iter().map(|g| g.to_string()).collect::<Vec<_>>()
    } else {
        request.games
    };
    let mut seeding = teams.iter().map(|team| team.id).collect::<Vec<_>>();
    seeding.shuffle(&mut rand::rng());

    let now = state.clock().now();
    let rounds = round_robin(&seeding);
    let mut matches = Vec::new();
    for (index, pairings) in rounds.iter().enumerate() {
        let round = index as u32 + 1;
        let game_name = &games[index % games.len()];
        for (team_a, team_b) in pairings {
            let game = MatchEntity {
                id: Uuid::new_v4(),
                tournament_slug: slug.to_string(),
                round,
                game: game_name.clone(),
                team_a: *team_a,
                team_b: *team_b,
                score_a: 0,
                score_b: 0,
                status: MatchStatus::Scheduled,
                winner: None,
                created_at: now,
                started_at: None,
                completed_at: None,
            };
            documents.upsert(&game).await?;
            room_service::provision_match(state, &game);
            matches.push(game);
        }
    }

    tournament.is_open = false;
    tournament.updated_at = now;
    documents.upsert(&tournament).await?;
    state.cache().delete_pattern(&keys::tournament_scope(slug)).await;

    let rounds = rounds.len() as u32;
    info!(slug, rounds, matches = matches.len(), "schedule generated");
    realtime_service::publish(
        state,
        &room_service::tournament_room(slug),
        TournamentEvent::ScheduleGenerated {
            rounds,
            matches: matches.len(),
        },
    );

    Ok(ScheduleView {
        rounds,
        matches: matches.into_iter().map(MatchView::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::TeamEntity,
        state::{AppState, clock::ManualClock},
    };

    fn request(name: &str) -> CreateTournamentRequest {
        CreateTournamentRequest {
            name: name.into(),
            date: "2025-06-21".into(),
            location: Some("Backyard".into()),
            format: None,
            max_teams: Some(4),
        }
    }

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(slugify("Spring Fling 2025!"), "spring-fling-2025");
        assert_eq!(slugify("  --Beer   Olympics-- "), "beer-olympics");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn round_robin_pairs_every_team_once() {
        let teams = (0..5).map(|_| Uuid::new_v4()).collect::<Vec<_>>();
        let rounds = round_robin(&teams);
        assert_eq!(rounds.len(), 5);

        let mut seen = HashSet::new();
        for round in &rounds {
            assert_eq!(round.len(), 2);
            let mut busy = HashSet::new();
            for (a, b) in round {
                assert!(busy.insert(*a) && busy.insert(*b), "team plays twice in a round");
                let key = if a < b { (*a, *b) } else { (*b, *a) };
                assert!(seen.insert(key), "pairing repeated");
            }
        }
        assert_eq!(seen.len(), 10);
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        let created = create_tournament(&state, "owner", request("Spring Fling")).await.unwrap();
        assert_eq!(created.slug, "spring-fling");
        assert_eq!(state.rooms().room_count(), 3);

        assert!(matches!(
            create_tournament(&state, "owner", request("spring fling")).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn schedule_closes_registration_and_provisions_match_rooms() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        create_tournament(&state, "owner", request("Spring")).await.unwrap();
        let documents = state.require_documents().await.unwrap();
        for name in ["Hops", "Malt", "Barley", "Yeast"] {
            documents
                .upsert(&TeamEntity {
                    id: Uuid::new_v4(),
                    tournament_slug: "spring".into(),
                    name: name.into(),
                    color: "#e53935".into(),
                    flag_code: None,
                    captain_id: name.into(),
                    member_ids: vec![name.into()],
                    created_at: state.clock().now(),
                })
                .await
                .unwrap();
        }

        let schedule = generate_schedule(&state, "spring", GenerateScheduleRequest::default())
            .await
            .unwrap();

        assert_eq!(schedule.rounds, 3);
        assert_eq!(schedule.matches.len(), 6);
        assert_eq!(schedule.matches[0].game, "beer-pong");
        assert_eq!(state.rooms().room_count(), 3 + 6);
        assert!(!get_tournament(&state, "spring").await.unwrap().is_open);
        assert_eq!(list_matches(&state, "spring").await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn unknown_tournaments_are_not_found() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        assert!(matches!(
            get_tournament(&state, "nope").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
