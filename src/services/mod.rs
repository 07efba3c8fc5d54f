/// Bearer token issuing and verification.
pub mod auth;
/// RSVP and attendee check-in workflow.
pub mod checkin_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Standings and per-team statistics.
pub mod leaderboard_service;
/// Live scoring and match completion.
pub mod match_service;
/// Media upload validation and storage.
pub mod media_service;
/// Event publishing to rooms and relay, plus realtime metrics.
pub mod realtime_service;
/// Room naming and provisioning.
pub mod room_service;
/// Server-Sent Events bridge for room subscriptions.
pub mod sse_service;
/// Document store supervisor with reconnect backoff.
pub mod storage_supervisor;
/// Team registration.
pub mod team_service;
/// Client telemetry intake.
pub mod telemetry_service;
/// Tournament creation and round-robin scheduling.
pub mod tournament_service;
/// Category votes and tallies.
pub mod vote_service;
/// Local relay WebSocket sessions.
pub mod websocket_service;
/// Experience points, levels and achievements.
pub mod xp_service;
