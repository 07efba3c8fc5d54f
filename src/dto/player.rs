use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dao::models::PlayerProfileEntity, dto::format_system_time};

/// Gamification profile of a player.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfileView {
    pub user_id: String,
    pub xp: u64,
    pub level: u32,
    /// Experience required to reach the next level.
    pub next_level_xp: u64,
    pub achievements: Vec<String>,
    pub matches_played: u32,
    pub wins: u32,
    pub uploads: u32,
    pub votes_cast: u32,
    pub check_ins: u32,
    pub updated_at: String,
}

impl PlayerProfileView {
    pub fn new(profile: PlayerProfileEntity, next_level_xp: u64) -> Self {
        Self {
            user_id: profile.user_id,
            xp: profile.xp,
            level: profile.level,
            next_level_xp,
            achievements: profile.achievements,
            matches_played: profile.matches_played,
            wins: profile.wins,
            uploads: profile.uploads,
            votes_cast: profile.votes_cast,
            check_ins: profile.check_ins,
            updated_at: format_system_time(profile.updated_at),
        }
    }
}
