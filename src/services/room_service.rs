//! Tournament-specific room layout on top of the generic room manager.

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::models::{MatchEntity, TeamEntity, TournamentEntity},
    realtime::RoomType,
    state::SharedState,
};

/// Application-wide room.
pub const GLOBAL_ROOM: &str = "global";

pub fn tournament_room(slug: &str) -> String {
    format!("tournament-{slug}")
}

pub fn presence_room(slug: &str) -> String {
    format!("presence-{slug}")
}

/// Organisers only.
pub fn admin_room(slug: &str) -> String {
    format!("private-admin-{slug}")
}

pub fn match_room(match_id: Uuid) -> String {
    format!("match-{match_id}")
}

/// Ensure the global room exists.
pub fn ensure_global_room(state: &SharedState) {
    state
        .rooms()
        .get_or_create_room(GLOBAL_ROOM, "Everyone", RoomType::Global, json!({}));
}

/// Delete a room and stop following its relay channel.
pub async fn remove_room(state: &SharedState, room_id: &str) -> bool {
    let removed = state.rooms().delete_room(room_id);
    state.relay().unsubscribe(room_id).await;
    removed
}

/// Provision the main, presence and admin rooms of a tournament.
pub fn provision_tournament(state: &SharedState, tournament: &TournamentEntity) {
    let rooms = state.rooms();
    let metadata = json!({ "tournamentSlug": tournament.slug });
    rooms.get_or_create_room(
        &tournament_room(&tournament.slug),
        &tournament.name,
        RoomType::Tournament,
        metadata.clone(),
    );
    rooms.get_or_create_room(
        &presence_room(&tournament.slug),
        &format!("{} (who's here)", tournament.name),
        RoomType::Presence,
        metadata.clone(),
    );
    rooms.get_or_create_room(
        &admin_room(&tournament.slug),
        &format!("{} (organisers)", tournament.name),
        RoomType::Private,
        json!({ "tournamentSlug": tournament.slug, "ownerId": tournament.owner_id }),
    );
    rooms.join_room(&admin_room(&tournament.slug), &tournament.owner_id, json!({ "role": "owner" }));
    debug!(slug = %tournament.slug, "provisioned tournament rooms");
}

/// Provision the room of one match.
pub fn provision_match(state: &SharedState, game: &MatchEntity) -> String {
    let id = match_room(game.id);
    state.rooms().get_or_create_room(
        &id,
        &format!("Round {} - {}", game.round, game.game),
        RoomType::Match,
        json!({
            "tournamentSlug": game.tournament_slug,
            "teamA": game.team_a,
            "teamB": game.team_b,
        }),
    );
    id
}

/// Join every member of `team` into the rooms of its upcoming matches.
///
/// Returns the rooms joined, sorted.
pub fn join_upcoming_match_rooms(
    state: &SharedState,
    team: &TeamEntity,
    matches: &[MatchEntity],
) -> Vec<String> {
    let mut joined = matches
        .iter()
        .filter(|game| game.involves(team.id) && game.is_upcoming())
        .map(|game| {
            let room = provision_match(state, game);
            for member in &team.member_ids {
                state.rooms().join_room(
                    &room,
                    member,
                    json!({ "teamId": team.id, "teamName": team.name }),
                );
            }
            room
        })
        .collect::<Vec<_>>();
    joined.sort();
    joined
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::{MatchStatus, TournamentFormat},
        state::{AppState, clock::ManualClock},
    };

    fn team(members: &[&str]) -> TeamEntity {
        TeamEntity {
            id: Uuid::new_v4(),
            tournament_slug: "spring".into(),
            name: "Hops".into(),
            color: "#e53935".into(),
            flag_code: None,
            captain_id: members[0].into(),
            member_ids: members.iter().map(|m| m.to_string()).collect(),
            created_at: SystemTime::UNIX_EPOCH,
        }
    }

    fn game(team_a: Uuid, status: MatchStatus) -> MatchEntity {
        MatchEntity {
            id: Uuid::new_v4(),
            tournament_slug: "spring".into(),
            round: 1,
            game: "beer-pong".into(),
            team_a,
            team_b: Uuid::new_v4(),
            score_a: 0,
            score_b: 0,
            status,
            winner: None,
            created_at: SystemTime::UNIX_EPOCH,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn tournament_provisioning_creates_three_rooms_once() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        let tournament = TournamentEntity {
            slug: "spring".into(),
            name: "Spring Fling".into(),
            date: "2025-06-21".into(),
            location: None,
            format: TournamentFormat::RoundRobin,
            max_teams: 8,
            is_open: true,
            owner_id: "owner".into(),
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
        };

        provision_tournament(&state, &tournament);
        provision_tournament(&state, &tournament);

        assert_eq!(state.rooms().room_count(), 3);
        assert_eq!(state.rooms().member_count("private-admin-spring"), Some(1));
        assert_eq!(
            state.rooms().get_room("presence-spring").unwrap().room_type,
            RoomType::Presence
        );
    }

    #[test]
    fn members_join_only_upcoming_match_rooms() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        let hops = team(&["p1", "p2"]);
        let upcoming = game(hops.id, MatchStatus::Scheduled);
        let finished = game(hops.id, MatchStatus::Completed);
        let other = game(Uuid::new_v4(), MatchStatus::Scheduled);

        let joined = join_upcoming_match_rooms(&state, &hops, &[upcoming.clone(), finished, other]);

        assert_eq!(joined, vec![match_room(upcoming.id)]);
        assert_eq!(state.rooms().member_count(&joined[0]), Some(2));
        assert_eq!(state.rooms().rooms_for_member("p1"), joined);
    }
}
