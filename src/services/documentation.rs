use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the Beer Olympics backend.
#[openapi(
    info(title = "Beer Olympics API"),
    paths(
        crate::routes::health::healthcheck,
        crate::routes::tournaments::create_tournament,
        crate::routes::tournaments::get_tournament,
        crate::routes::tournaments::list_teams,
        crate::routes::tournaments::join_tournament,
        crate::routes::tournaments::list_matches,
        crate::routes::tournaments::generate_schedule,
        crate::routes::matches::record_score,
        crate::routes::matches::complete_match,
        crate::routes::leaderboard::leaderboard,
        crate::routes::leaderboard::team_stats,
        crate::routes::checkin::create_rsvp,
        crate::routes::checkin::check_in_status,
        crate::routes::checkin::check_in,
        crate::routes::checkin::update_status,
        crate::routes::votes::cast_vote,
        crate::routes::votes::results,
        crate::routes::players::get_player,
        crate::routes::media::upload,
        crate::routes::telemetry::logs,
        crate::routes::telemetry::errors,
        crate::routes::telemetry::metrics,
        crate::routes::telemetry::analytics,
        crate::routes::realtime::realtime_metrics,
        crate::routes::sse::room_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::tournament::CreateTournamentRequest,
            crate::dto::tournament::TournamentView,
            crate::dto::tournament::GenerateScheduleRequest,
            crate::dto::tournament::ScheduleView,
            crate::dto::team::JoinTournamentRequest,
            crate::dto::team::TeamView,
            crate::dto::matches::MatchView,
            crate::dto::matches::ScoreUpdateRequest,
            crate::dto::matches::CompleteMatchRequest,
            crate::dto::leaderboard::LeaderboardEntryView,
            crate::dto::leaderboard::TeamStatsView,
            crate::dto::checkin::CreateRsvpRequest,
            crate::dto::checkin::RsvpView,
            crate::dto::checkin::CheckInRequest,
            crate::dto::checkin::CheckInResponse,
            crate::dto::checkin::CheckInSummary,
            crate::dto::checkin::CheckInStatusResponse,
            crate::dto::checkin::UpdateRsvpStatusRequest,
            crate::dto::vote::CastVoteRequest,
            crate::dto::vote::VoteReceipt,
            crate::dto::vote::NomineeTally,
            crate::dto::vote::VoteTally,
            crate::dto::player::PlayerProfileView,
            crate::dto::media::MediaUploadRequest,
            crate::dto::media::MediaView,
            crate::dto::telemetry::TelemetryAck,
            crate::dto::realtime::RoomSummary,
            crate::dto::realtime::RealtimeMetricsResponse,
            crate::dao::models::TournamentFormat,
            crate::dao::models::MatchStatus,
            crate::dao::models::RsvpStatus,
            crate::dao::models::CheckInMethod,
            crate::dao::models::MediaKind,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "tournaments", description = "Tournaments and schedules"),
        (name = "teams", description = "Team registration"),
        (name = "matches", description = "Live scoring"),
        (name = "leaderboard", description = "Standings and team statistics"),
        (name = "check-in", description = "RSVPs and attendee check-in"),
        (name = "votes", description = "Category voting"),
        (name = "players", description = "Player experience and achievements"),
        (name = "media", description = "Photo and video uploads"),
        (name = "telemetry", description = "Client log, error, metric and analytics sinks"),
        (name = "realtime", description = "Rooms, server-sent events and the local relay socket"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` JWT scheme referenced by authenticated routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route_group() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/api/tournaments/{slug}/leaderboard",
            "/api/check-in",
            "/api/analytics",
            "/sse/rooms/{room_id}",
            "/ws",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
