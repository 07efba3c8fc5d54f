//! Closed set of real-time events, grouped by the kind of room they are published to.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{TimestampMilliSeconds, serde_as};
use uuid::Uuid;

use crate::dao::read_models::LeaderboardEntry;

/// Events published to a tournament's main room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum TournamentEvent {
    #[serde(rename_all = "camelCase")]
    TeamJoined { team_id: Uuid, team_name: String },
    #[serde(rename_all = "camelCase")]
    ScheduleGenerated { rounds: u32, matches: usize },
    #[serde(rename_all = "camelCase")]
    LeaderboardUpdated { leaderboard: Vec<LeaderboardEntry> },
    #[serde(rename_all = "camelCase")]
    AttendeeCheckedIn {
        rsvp_id: String,
        full_name: String,
        team_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    MediaUploaded {
        media_id: Uuid,
        match_id: Option<Uuid>,
        uploader_id: String,
        url: String,
        thumbnail_url: String,
    },
    #[serde(rename_all = "camelCase")]
    VoteCast { category: String, total_votes: u64 },
}

/// Events published to a single match room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum MatchEvent {
    #[serde(rename_all = "camelCase")]
    ScoreUpdate {
        match_id: Uuid,
        team_id: Uuid,
        points: u32,
        score_a: u32,
        score_b: u32,
    },
    #[serde(rename_all = "camelCase")]
    MatchCompleted {
        match_id: Uuid,
        winner: Uuid,
        score_a: u32,
        score_b: u32,
    },
}

/// Events published to the application-wide room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum GlobalEvent {
    #[serde(rename_all = "camelCase")]
    LevelUp { user_id: String, level: u32, xp: u64 },
    #[serde(rename_all = "camelCase")]
    AchievementUnlocked { user_id: String, achievement: String },
    Announcement { message: String },
}

/// Membership changes announced in presence rooms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum PresenceEvent {
    #[serde(rename_all = "camelCase")]
    MemberJoined { member_id: String, info: Value },
    #[serde(rename_all = "camelCase")]
    MemberLeft { member_id: String },
}

/// Any event the backend publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Tournament(TournamentEvent),
    Match(MatchEvent),
    Global(GlobalEvent),
    Presence(PresenceEvent),
}

impl RealtimeEvent {
    /// Stable wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::Tournament(event) => match event {
                TournamentEvent::TeamJoined { .. } => "team-joined",
                TournamentEvent::ScheduleGenerated { .. } => "schedule-generated",
                TournamentEvent::LeaderboardUpdated { .. } => "leaderboard-updated",
                TournamentEvent::AttendeeCheckedIn { .. } => "attendee-checked-in",
                TournamentEvent::MediaUploaded { .. } => "media-uploaded",
                TournamentEvent::VoteCast { .. } => "vote-cast",
            },
            RealtimeEvent::Match(event) => match event {
                MatchEvent::ScoreUpdate { .. } => "score-update",
                MatchEvent::MatchCompleted { .. } => "match-completed",
            },
            RealtimeEvent::Global(event) => match event {
                GlobalEvent::LevelUp { .. } => "level-up",
                GlobalEvent::AchievementUnlocked { .. } => "achievement-unlocked",
                GlobalEvent::Announcement { .. } => "announcement",
            },
            RealtimeEvent::Presence(event) => match event {
                PresenceEvent::MemberJoined { .. } => "member-joined",
                PresenceEvent::MemberLeft { .. } => "member-left",
            },
        }
    }

    /// JSON payload carried under the event name.
    pub fn payload(&self) -> serde_json::Result<Value> {
        let tagged = match self {
            RealtimeEvent::Tournament(event) => serde_json::to_value(event)?,
            RealtimeEvent::Match(event) => serde_json::to_value(event)?,
            RealtimeEvent::Global(event) => serde_json::to_value(event)?,
            RealtimeEvent::Presence(event) => serde_json::to_value(event)?,
        };
        Ok(match tagged {
            Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
            other => other,
        })
    }
}

impl From<TournamentEvent> for RealtimeEvent {
    fn from(event: TournamentEvent) -> Self {
        RealtimeEvent::Tournament(event)
    }
}

impl From<MatchEvent> for RealtimeEvent {
    fn from(event: MatchEvent) -> Self {
        RealtimeEvent::Match(event)
    }
}

impl From<GlobalEvent> for RealtimeEvent {
    fn from(event: GlobalEvent) -> Self {
        RealtimeEvent::Global(event)
    }
}

impl From<PresenceEvent> for RealtimeEvent {
    fn from(event: PresenceEvent) -> Self {
        RealtimeEvent::Presence(event)
    }
}

/// Event as delivered to room subscribers. Never persisted.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub room: String,
    pub event: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub timestamp: SystemTime,
}
