use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{cache::keys, models::TeamEntity, read_models},
    dto::team::{JoinTournamentRequest, TeamView},
    error::ServiceError,
    realtime::TournamentEvent,
    services::{realtime_service, room_service, tournament_service},
    state::SharedState,
};

/// Register a team in an open tournament.
///
/// The captain is always part of the member list. Without an explicit color the team gets the
/// first palette entry no other team of the tournament uses.
pub async fn join_tournament(
    state: &SharedState,
    slug: &str,
    request: JoinTournamentRequest,
) -> Result<TeamView, ServiceError> {
    let documents = state.require_documents().await?;
    let tournament = tournament_service::load_tournament(state, &documents, slug).await?;
    if !tournament.is_open {
        return Err(ServiceError::Conflict("Tournament registration is closed".into()));
    }

    let teams = read_models::load_teams(&documents, slug).await?;
    if teams.len() >= tournament.max_teams as usize {
        return Err(ServiceError::Conflict("Tournament is full".into()));
    }
    let name = request.name.trim().to_string();
    if teams.iter().any(|team| team.name.eq_ignore_ascii_case(&name)) {
        return Err(ServiceError::Conflict(format!("Team {name} already registered")));
    }

    let color = match request.color {
        Some(color) => color.to_ascii_lowercase(),
        None => {
            let used = teams.iter().map(|team| team.color.as_str()).collect::<Vec<_>>();
            state.config().first_unused_color(&used)
        }
    };
    let mut member_ids = vec![request.captain_id.clone()];
    for member in request.member_ids {
        if !member_ids.contains(&member) {
            member_ids.push(member);
        }
    }

    let team = TeamEntity {
        id: Uuid::new_v4(),
        tournament_slug: slug.to_string(),
        name,
        color,
        flag_code: request.flag_code.map(|code| code.to_ascii_uppercase()),
        captain_id: request.captain_id,
        member_ids,
        created_at: state.clock().now(),
    };
    documents.upsert(&team).await?;
    state.cache().delete(&keys::teams(slug)).await;
    state.cache().delete(&keys::leaderboard(slug)).await;

    info!(slug, team_id = %team.id, team = %team.name, "team joined tournament");
    realtime_service::publish(
        state,
        &room_service::tournament_room(slug),
        TournamentEvent::TeamJoined {
            team_id: team.id,
            team_name: team.name.clone(),
        },
    );

    Ok(team.into())
}
