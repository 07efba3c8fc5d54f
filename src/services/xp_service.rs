//! Experience points, levels and achievements.

use tracing::{info, warn};

use crate::{
    dao::{
        cache::{CacheTtl, keys},
        document_store::Documents,
        models::{PlayerProfileEntity, player_key},
    },
    dto::player::PlayerProfileView,
    error::ServiceError,
    realtime::GlobalEvent,
    services::{realtime_service, room_service::GLOBAL_ROOM},
    state::SharedState,
};

/// XP needed to reach levels 1 through 10.
const LEVEL_THRESHOLDS: [u64; 10] = [0, 100, 250, 500, 1_000, 1_750, 2_750, 4_000, 5_500, 7_500];
/// Extra XP per level past the table.
const XP_PER_EXTRA_LEVEL: u64 = 2_500;

/// Action worth experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XpReward {
    CheckIn,
    MatchPlayed,
    MatchWon,
    MediaUpload,
    VoteCast,
}

impl XpReward {
    pub fn points(self) -> u64 {
        match self {
            XpReward::CheckIn => 10,
            XpReward::MatchPlayed => 25,
            XpReward::MatchWon => 50,
            XpReward::MediaUpload => 5,
            XpReward::VoteCast => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Achievement {
    FirstWin,
    HatTrick,
    Veteran,
    Paparazzi,
    CivicDuty,
}

impl Achievement {
    const ALL: [Achievement; 5] = [
        Achievement::FirstWin,
        Achievement::HatTrick,
        Achievement::Veteran,
        Achievement::Paparazzi,
        Achievement::CivicDuty,
    ];

    fn id(self) -> &'static str {
        match self {
            Achievement::FirstWin => "first-win",
            Achievement::HatTrick => "hat-trick",
            Achievement::Veteran => "veteran",
            Achievement::Paparazzi => "paparazzi",
            Achievement::CivicDuty => "civic-duty",
        }
    }

    fn earned(self, profile: &PlayerProfileEntity) -> bool {
        match self {
            Achievement::FirstWin => profile.wins >= 1,
            Achievement::HatTrick => profile.wins >= 3,
            Achievement::Veteran => profile.matches_played >= 10,
            Achievement::Paparazzi => profile.uploads >= 5,
            Achievement::CivicDuty => profile.votes_cast >= 1,
        }
    }
}

/// Level reached with `xp` experience.
pub fn level_for_xp(xp: u64) -> u32 {
    let last = LEVEL_THRESHOLDS[LEVEL_THRESHOLDS.len() - 1];
    if xp >= last {
        let extra = (xp - last) / XP_PER_EXTRA_LEVEL;
        return LEVEL_THRESHOLDS.len() as u32 + u32::try_from(extra).unwrap_or(u32::MAX - 10);
    }
    LEVEL_THRESHOLDS
        .iter()
        .take_while(|threshold| **threshold <= xp)
        .count() as u32
}

/// Experience at which `level` starts.
pub fn xp_for_level(level: u32) -> u64 {
    let level = level.max(1) as usize;
    match LEVEL_THRESHOLDS.get(level - 1) {
        Some(threshold) => *threshold,
        None => {
            LEVEL_THRESHOLDS[LEVEL_THRESHOLDS.len() - 1]
                + (level - LEVEL_THRESHOLDS.len()) as u64 * XP_PER_EXTRA_LEVEL
        }
    }
}

/// What changed when a reward was applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewardOutcome {
    pub leveled_up: bool,
    pub unlocked: Vec<&'static str>,
}

/// Apply `reward` to `profile`, bumping the matching counter, level and achievements.
pub fn apply_reward(profile: &mut PlayerProfileEntity, reward: XpReward) -> RewardOutcome {
    match reward {
        XpReward::CheckIn => profile.check_ins += 1,
        XpReward::MatchPlayed => profile.matches_played += 1,
        XpReward::MatchWon => profile.wins += 1,
        XpReward::MediaUpload => profile.uploads += 1,
        XpReward::VoteCast => profile.votes_cast += 1,
    }
    profile.xp += reward.points();

    let level = level_for_xp(profile.xp);
    let leveled_up = level > profile.level;
    profile.level = profile.level.max(level);

    let unlocked = Achievement::ALL
        .into_iter()
        .filter(|achievement| {
            achievement.earned(profile) && !profile.achievements.iter().any(|a| a == achievement.id())
        })
        .map(Achievement::id)
        .collect::<Vec<_>>();
    profile
        .achievements
        .extend(unlocked.iter().map(|id| id.to_string()));

    RewardOutcome {
        leveled_up,
        unlocked,
    }
}

/// Grant every reward in `rewards` to `user_id`, persisting the profile and announcing
/// level-ups and achievements on the global room.
pub async fn award(
    state: &SharedState,
    documents: &Documents,
    user_id: &str,
    rewards: &[XpReward],
) -> Result<PlayerProfileEntity, ServiceError> {
    let now = state.clock().now();
    let mut profile = documents
        .get::<PlayerProfileEntity>(&player_key(user_id))
        .await?
        .unwrap_or_else(|| PlayerProfileEntity::new(user_id, now));

    let mut outcome = RewardOutcome::default();
    for reward in rewards {
        let step = apply_reward(&mut profile, *reward);
        outcome.leveled_up |= step.leveled_up;
        outcome.unlocked.extend(step.unlocked);
    }
    profile.updated_at = now;
    documents.upsert(&profile).await?;
    state.cache().delete(&keys::player(user_id)).await;

    if outcome.leveled_up {
        info!(user_id, level = profile.level, xp = profile.xp, "player leveled up");
        realtime_service::publish(
            state,
            GLOBAL_ROOM,
            GlobalEvent::LevelUp {
                user_id: user_id.to_string(),
                level: profile.level,
                xp: profile.xp,
            },
        );
    }
    for achievement in outcome.unlocked {
        info!(user_id, achievement, "achievement unlocked");
        realtime_service::publish(
            state,
            GLOBAL_ROOM,
            GlobalEvent::AchievementUnlocked {
                user_id: user_id.to_string(),
                achievement: achievement.to_string(),
            },
        );
    }
    Ok(profile)
}

/// Award without failing the surrounding operation.
pub async fn award_best_effort(
    state: &SharedState,
    documents: &Documents,
    user_id: &str,
    rewards: &[XpReward],
) {
    if let Err(err) = award(state, documents, user_id, rewards).await {
        warn!(user_id, error = %err, "failed to award experience");
    }
}

/// Profile of `user_id`, served from the cache when fresh.
pub async fn get_profile(state: &SharedState, user_id: &str) -> Result<PlayerProfileView, ServiceError> {
    let documents = state.require_documents().await?;
    let key = keys::player(user_id);
    if let Some(hit) = state.cache().get::<PlayerProfileView>(&key).await {
        return Ok(hit);
    }

    let profile = documents
        .get::<PlayerProfileEntity>(&player_key(user_id))
        .await?
        .ok_or_else(|| ServiceError::NotFound("Player not found".into()))?;
    let next = xp_for_level(profile.level + 1);
    let view = PlayerProfileView::new(profile, next);
    state.cache().set(&key, &view, CacheTtl::Player).await;
    Ok(view)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, clock::ManualClock},
    };

    #[test]
    fn levels_follow_the_threshold_table() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(7_499), 9);
        assert_eq!(level_for_xp(7_500), 10);
        assert_eq!(level_for_xp(10_000), 11);
        assert_eq!(xp_for_level(2), 100);
        assert_eq!(xp_for_level(12), 12_500);
    }

    #[test]
    fn third_win_unlocks_hat_trick_once() {
        let mut profile = PlayerProfileEntity::new("p1", SystemTime::UNIX_EPOCH);
        let first = apply_reward(&mut profile, XpReward::MatchWon);
        assert_eq!(first.unlocked, vec!["first-win"]);
        assert!(!first.leveled_up);

        // 100 XP after the second win crosses into level 2.
        let second = apply_reward(&mut profile, XpReward::MatchWon);
        assert!(second.leveled_up);
        assert!(second.unlocked.is_empty());
        assert_eq!(profile.level, 2);

        let third = apply_reward(&mut profile, XpReward::MatchWon);
        assert_eq!(third.unlocked, vec!["hat-trick"]);
        assert!(!third.leveled_up);
        assert_eq!(profile.xp, 150);
        assert_eq!(profile.level, 2);

        let fourth = apply_reward(&mut profile, XpReward::MatchWon);
        assert!(fourth.unlocked.is_empty());
        assert_eq!(profile.achievements, vec!["first-win", "hat-trick"]);
    }

    #[tokio::test]
    async fn award_persists_and_announces_level_ups() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        crate::services::room_service::ensure_global_room(&state);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = state
            .rooms()
            .subscribe(GLOBAL_ROOM, &[], move |envelope| {
                sink.lock().unwrap().push(envelope.event.clone());
            })
            .unwrap();
        let documents = state.require_documents().await.unwrap();

        award(
            &state,
            &documents,
            "p1",
            &[XpReward::MatchPlayed, XpReward::MatchWon, XpReward::MatchPlayed],
        )
        .await
        .unwrap();

        let profile = get_profile(&state, "p1").await.unwrap();
        assert_eq!(profile.xp, 100);
        assert_eq!(profile.level, 2);
        assert_eq!(profile.next_level_xp, 250);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["level-up".to_string(), "achievement-unlocked".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_players_are_not_found() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        assert!(matches!(
            get_profile(&state, "ghost").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
