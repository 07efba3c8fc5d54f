//! Cache key builders; every key is namespaced under `cache:`.

pub fn tournament(slug: &str) -> String {
    format!("cache:tournament:{slug}")
}

pub fn teams(slug: &str) -> String {
    format!("cache:teams:{slug}")
}

pub fn matches(slug: &str) -> String {
    format!("cache:matches:{slug}")
}

pub fn leaderboard(slug: &str) -> String {
    format!("cache:leaderboard:{slug}")
}

pub fn team_stats(team_id: &str) -> String {
    format!("cache:stats:team:{team_id}")
}

pub fn vote_tally(slug: &str, category: &str) -> String {
    format!("cache:votes:{slug}:{category}")
}

pub fn player(user_id: &str) -> String {
    format!("cache:player:{user_id}")
}

/// Every cached projection belonging to one tournament.
pub fn tournament_scope(slug: &str) -> String {
    format!("cache:*:{slug}*")
}

pub fn telemetry_counter(kind: &str) -> String {
    format!("counter:telemetry:{kind}")
}
