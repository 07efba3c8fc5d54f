use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::document_store::Document;

/// Separator between the type prefix and the identifier of a document key.
pub const KEY_SEPARATOR: &str = "::";

pub fn tournament_key(slug: &str) -> String {
    format!("tournament{KEY_SEPARATOR}{slug}")
}

pub fn team_key(id: Uuid) -> String {
    format!("team{KEY_SEPARATOR}{id}")
}

pub fn match_key(id: Uuid) -> String {
    format!("match{KEY_SEPARATOR}{id}")
}

pub fn rsvp_key(id: &str) -> String {
    format!("rsvp{KEY_SEPARATOR}{id}")
}

pub fn vote_key(slug: &str, category: &str, voter_id: &str) -> String {
    format!("vote{KEY_SEPARATOR}{slug}{KEY_SEPARATOR}{category}{KEY_SEPARATOR}{voter_id}")
}

pub fn player_key(user_id: &str) -> String {
    format!("player{KEY_SEPARATOR}{user_id}")
}

pub fn media_key(id: Uuid) -> String {
    format!("media{KEY_SEPARATOR}{id}")
}

/// Bracket style used to schedule a tournament.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
    RoundRobin,
    SingleElimination,
}

/// Tournament definition keyed by its URL slug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentEntity {
    /// URL-safe unique identifier.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Calendar date of the event (`YYYY-MM-DD`).
    pub date: String,
    pub location: Option<String>,
    pub format: TournamentFormat,
    /// Maximum number of teams accepted at registration.
    pub max_teams: u32,
    /// Whether team registration is still open.
    pub is_open: bool,
    /// Identifier of the organiser who created the tournament.
    pub owner_id: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Document for TournamentEntity {
    const DOC_TYPE: &'static str = "tournament";

    fn key(&self) -> String {
        tournament_key(&self.slug)
    }
}

/// Team registered in a tournament.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamEntity {
    pub id: Uuid,
    pub tournament_slug: String,
    pub name: String,
    /// Hex color (`#rrggbb`) used on scoreboards.
    pub color: String,
    pub flag_code: Option<String>,
    pub captain_id: String,
    /// User identifiers of the team members, captain included.
    pub member_ids: Vec<String>,
    pub created_at: SystemTime,
}

impl Document for TeamEntity {
    const DOC_TYPE: &'static str = "team";

    fn key(&self) -> String {
        team_key(self.id)
    }
}

/// Lifecycle of a scheduled match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Completed,
}

/// One game between two teams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchEntity {
    pub id: Uuid,
    pub tournament_slug: String,
    /// Round number, starting at 1.
    pub round: u32,
    /// Name of the event being played (beer pong, flip cup, ...).
    pub game: String,
    pub team_a: Uuid,
    pub team_b: Uuid,
    pub score_a: u32,
    pub score_b: u32,
    pub status: MatchStatus,
    pub winner: Option<Uuid>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
}

impl MatchEntity {
    /// Whether `team_id` plays in this match.
    pub fn involves(&self, team_id: Uuid) -> bool {
        self.team_a == team_id || self.team_b == team_id
    }

    /// Whether the match has not been played to completion yet.
    pub fn is_upcoming(&self) -> bool {
        matches!(self.status, MatchStatus::Scheduled | MatchStatus::InProgress)
    }
}

impl Document for MatchEntity {
    const DOC_TYPE: &'static str = "match";

    fn key(&self) -> String {
        match_key(self.id)
    }
}

/// Attendance status of an RSVP.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    Pending,
    Confirmed,
    CheckedIn,
    Cancelled,
    Waitlisted,
}

/// How an attendee was checked in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    Manual,
    QrCode,
    SelfService,
}

/// Attendee registration for a tournament.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RsvpEntity {
    pub id: String,
    pub tournament_slug: String,
    pub full_name: String,
    pub email: String,
    /// Linked account, when the attendee signed in.
    pub user_id: Option<String>,
    /// Team the attendee plays for, if any.
    pub team_id: Option<Uuid>,
    pub status: RsvpStatus,
    pub check_in_method: Option<CheckInMethod>,
    pub checked_in_at: Option<SystemTime>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Document for RsvpEntity {
    const DOC_TYPE: &'static str = "rsvp";

    fn key(&self) -> String {
        rsvp_key(&self.id)
    }
}

/// Ballot cast by one voter in one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteEntity {
    pub tournament_slug: String,
    pub category: String,
    pub voter_id: String,
    pub nominee_id: String,
    pub cast_at: SystemTime,
}

impl Document for VoteEntity {
    const DOC_TYPE: &'static str = "vote";

    fn key(&self) -> String {
        vote_key(&self.tournament_slug, &self.category, &self.voter_id)
    }
}

/// Gamification profile of a player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerProfileEntity {
    pub user_id: String,
    pub xp: u64,
    pub level: u32,
    /// Unlocked achievement identifiers in unlock order.
    pub achievements: Vec<String>,
    pub matches_played: u32,
    pub wins: u32,
    pub uploads: u32,
    pub votes_cast: u32,
    pub check_ins: u32,
    pub updated_at: SystemTime,
}

impl PlayerProfileEntity {
    /// Fresh profile with no experience.
    pub fn new(user_id: impl Into<String>, now: SystemTime) -> Self {
        Self {
            user_id: user_id.into(),
            xp: 0,
            level: 1,
            achievements: Vec::new(),
            matches_played: 0,
            wins: 0,
            uploads: 0,
            votes_cast: 0,
            check_ins: 0,
            updated_at: now,
        }
    }
}

impl Document for PlayerProfileEntity {
    const DOC_TYPE: &'static str = "player";

    fn key(&self) -> String {
        player_key(&self.user_id)
    }
}

/// Kind of uploaded asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

/// Uploaded photo or video attached to a tournament (and optionally a match).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaEntity {
    pub id: Uuid,
    pub tournament_slug: String,
    pub match_id: Option<Uuid>,
    pub uploader_id: String,
    pub kind: MediaKind,
    /// Identifier assigned by the media store.
    pub public_id: String,
    pub secure_url: String,
    pub thumbnail_url: String,
    pub format: String,
    pub bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Length in seconds for videos.
    pub duration: Option<f64>,
    pub tags: Vec<String>,
    pub created_at: SystemTime,
}

impl Document for MediaEntity {
    const DOC_TYPE: &'static str = "media";

    fn key(&self) -> String {
        media_key(self.id)
    }
}
