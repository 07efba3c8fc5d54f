use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod checkin;
pub mod health;
pub mod leaderboard;
pub mod matches;
pub mod media;
pub mod player;
pub mod realtime;
pub mod team;
pub mod telemetry;
pub mod tournament;
pub mod validation;
pub mod vote;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
