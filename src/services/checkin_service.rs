//! RSVPs and event-day check-in.

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        document_store::{DocumentQuery, Documents},
        models::{CheckInMethod, RsvpEntity, RsvpStatus, TeamEntity, rsvp_key, team_key},
        read_models,
    },
    dto::checkin::{CheckInSummary, CreateRsvpRequest, RsvpView, UpdateRsvpStatusRequest},
    error::ServiceError,
    realtime::TournamentEvent,
    services::{
        realtime_service, room_service, tournament_service,
        xp_service::{self, XpReward},
    },
    state::SharedState,
};

/// Result of a check-in attempt. Repeats are reported, not failed, so callers can branch.
#[derive(Debug)]
pub enum CheckInOutcome {
    /// Freshly checked in, with the rooms the attendee was joined into.
    CheckedIn(RsvpEntity, Vec<String>),
    /// The RSVP was already checked in; nothing changed.
    AlreadyCheckedIn(RsvpEntity),
}

async fn load_rsvp(documents: &Documents, id: &str) -> Result<RsvpEntity, ServiceError> {
    documents
        .get::<RsvpEntity>(&rsvp_key(id))
        .await?
        .ok_or_else(|| ServiceError::NotFound("RSVP not found".into()))
}

/// Register an attendee as `pending`.
pub async fn create_rsvp(state: &SharedState, request: CreateRsvpRequest) -> Result<RsvpView, ServiceError> {
    let documents = state.require_documents().await?;
    tournament_service::load_tournament(state, &documents, &request.tournament_slug).await?;
    if let Some(team_id) = request.team_id {
        let team = documents.get::<TeamEntity>(&team_key(team_id)).await?;
        if !matches!(team, Some(team) if team.tournament_slug == request.tournament_slug) {
            return Err(ServiceError::InvalidInput(
                "Team does not belong to this tournament".into(),
            ));
        }
    }

    let now = state.clock().now();
    let rsvp = RsvpEntity {
        id: format!("rsvp-{}", Uuid::new_v4().simple()),
        tournament_slug: request.tournament_slug,
        full_name: request.full_name.trim().to_string(),
        email: request.email.to_ascii_lowercase(),
        user_id: request.user_id,
        team_id: request.team_id,
        status: RsvpStatus::Pending,
        check_in_method: None,
        checked_in_at: None,
        created_at: now,
        updated_at: now,
    };
    documents.upsert(&rsvp).await?;
    info!(rsvp_id = %rsvp.id, slug = %rsvp.tournament_slug, "rsvp created");
    Ok(rsvp.into())
}

/// Mark an RSVP as checked in and join the attendee into the presence room and, for players,
/// the rooms of their team's upcoming matches.
pub async fn check_in(
    state: &SharedState,
    rsvp_id: &str,
    method: CheckInMethod,
) -> Result<CheckInOutcome, ServiceError> {
    let documents = state.require_documents().await?;
    let mut rsvp = load_rsvp(&documents, rsvp_id).await?;
    match rsvp.status {
        RsvpStatus::CheckedIn => return Ok(CheckInOutcome::AlreadyCheckedIn(rsvp)),
        RsvpStatus::Cancelled => {
            return Err(ServiceError::InvalidInput("Cancelled RSVPs cannot check in".into()));
        }
        RsvpStatus::Pending | RsvpStatus::Confirmed | RsvpStatus::Waitlisted => {}
    }

    let now = state.clock().now();
    rsvp.status = RsvpStatus::CheckedIn;
    rsvp.check_in_method = Some(method);
    rsvp.checked_in_at = Some(now);
    rsvp.updated_at = now;
    documents.upsert(&rsvp).await?;

    let slug = rsvp.tournament_slug.clone();
    let member = rsvp.user_id.clone().unwrap_or_else(|| rsvp.id.clone());
    let mut rooms = Vec::new();
    let presence = room_service::presence_room(&slug);
    if state.rooms().join_room(
        &presence,
        &member,
        json!({ "fullName": rsvp.full_name, "teamId": rsvp.team_id }),
    ) {
        rooms.push(presence);
    }
    if let Some(team_id) = rsvp.team_id {
        match documents.get::<TeamEntity>(&team_key(team_id)).await? {
            Some(team) => {
                let matches = read_models::load_matches(&documents, &slug).await?;
                rooms.extend(room_service::join_upcoming_match_rooms(state, &team, &matches));
            }
            None => warn!(rsvp_id, team_id = %team_id, "checked-in attendee references a missing team"),
        }
    }

    if let Some(user_id) = &rsvp.user_id {
        xp_service::award_best_effort(state, &documents, user_id, &[XpReward::CheckIn]).await;
    }
    info!(rsvp_id, slug = %slug, method = ?method, rooms = rooms.len(), "attendee checked in");
    realtime_service::publish(
        state,
        &room_service::tournament_room(&slug),
        TournamentEvent::AttendeeCheckedIn {
            rsvp_id: rsvp.id.clone(),
            full_name: rsvp.full_name.clone(),
            team_id: rsvp.team_id,
        },
    );

    Ok(CheckInOutcome::CheckedIn(rsvp, rooms))
}

pub async fn rsvp_status(state: &SharedState, rsvp_id: &str) -> Result<RsvpView, ServiceError> {
    let documents = state.require_documents().await?;
    Ok(load_rsvp(&documents, rsvp_id).await?.into())
}

/// Attendance counts per status for a tournament.
pub async fn summary(state: &SharedState, slug: &str) -> Result<CheckInSummary, ServiceError> {
    let documents = state.require_documents().await?;
    tournament_service::load_tournament(state, &documents, slug).await?;
    let rsvps: Vec<RsvpEntity> = documents
        .query(DocumentQuery::for_document::<RsvpEntity>().filter("tournament_slug", slug))
        .await?;

    let mut summary = CheckInSummary {
        tournament_slug: slug.to_string(),
        total: rsvps.len(),
        ..Default::default()
    };
    for rsvp in &rsvps {
        match rsvp.status {
            RsvpStatus::Pending => summary.pending += 1,
            RsvpStatus::Confirmed => summary.confirmed += 1,
            RsvpStatus::CheckedIn => summary.checked_in += 1,
            RsvpStatus::Cancelled => summary.cancelled += 1,
            RsvpStatus::Waitlisted => summary.waitlisted += 1,
        }
    }
    Ok(summary)
}

/// Set the status of an RSVP directly; leaving `checked_in` clears the check-in details.
pub async fn update_status(
    state: &SharedState,
    request: UpdateRsvpStatusRequest,
) -> Result<RsvpView, ServiceError> {
    if request.status == RsvpStatus::CheckedIn {
        return Err(ServiceError::InvalidInput(
            "Use the check-in endpoint to check attendees in".into(),
        ));
    }
    let documents = state.require_documents().await?;
    let mut rsvp = load_rsvp(&documents, &request.rsvp_id).await?;
    if rsvp.status == RsvpStatus::CheckedIn {
        let member = rsvp.user_id.as_deref().unwrap_or(&rsvp.id);
        state
            .rooms()
            .leave_room(&room_service::presence_room(&rsvp.tournament_slug), member);
        rsvp.check_in_method = None;
        rsvp.checked_in_at = None;
    }
    rsvp.status = request.status;
    rsvp.updated_at = state.clock().now();
    documents.upsert(&rsvp).await?;
    info!(rsvp_id = %rsvp.id, status = ?rsvp.status, "rsvp status updated");
    Ok(rsvp.into())
}
