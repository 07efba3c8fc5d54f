//! In-process cache backend used in development and tests.

use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;

use super::{CacheBackend, CacheError, CacheResult, MIN_TTL};
use crate::state::clock::SharedClock;

struct Entry {
    value: String,
    expires_at: Option<SystemTime>,
}

impl Entry {
    fn is_live(&self, now: SystemTime) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// `DashMap`-backed cache honouring TTLs against an injectable clock.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
    clock: SharedClock,
}

impl MemoryCache {
    /// Create an empty cache reading time from `clock`.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }
}

impl CacheBackend for MemoryCache {
    fn get_raw(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<String>>> {
        let value = self.live_value(key);
        Box::pin(async move { Ok(value) })
    }

    fn set_raw(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, CacheResult<()>> {
        let expires_at = Some(self.clock.now() + ttl.max(MIN_TTL));
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Box::pin(async { Ok(()) })
    }

    fn delete(&self, key: &str) -> BoxFuture<'static, CacheResult<bool>> {
        let now = self.clock.now();
        let removed = self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now));
        Box::pin(async move { Ok(removed) })
    }

    fn delete_pattern(&self, pattern: &str) -> BoxFuture<'static, CacheResult<usize>> {
        let now = self.clock.now();
        let matching = self
            .entries
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();

        let removed = matching
            .into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .filter(|(_, entry)| entry.is_live(now))
            .count();
        Box::pin(async move { Ok(removed) })
    }

    fn increment_by(&self, key: &str, delta: i64) -> BoxFuture<'static, CacheResult<i64>> {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: "0".into(),
            expires_at: None,
        });
        if !entry.is_live(now) {
            entry.value = "0".into();
            entry.expires_at = None;
        }

        let result = match entry.value.parse::<i64>() {
            Ok(current) => {
                let next = current.saturating_add(delta);
                entry.value = next.to_string();
                Ok(next)
            }
            Err(_) => Err(CacheError::NotAnInteger {
                key: key.to_string(),
            }),
        };
        drop(entry);
        Box::pin(async move { result })
    }

    fn ping(&self) -> BoxFuture<'static, CacheResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Redis-style glob matching supporting `*` (any run) and `?` (single character).
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern = pattern.chars().collect::<Vec<_>>();
    let key = key.chars().collect::<Vec<_>>();

    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, k));
                p += 1;
            }
            Some('?') => {
                p += 1;
                k += 1;
            }
            Some(c) if *c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    k = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        assert!(glob_match("cache:*", "cache:leaderboard:a"));
        assert!(glob_match("cache:*:a", "cache:leaderboard:a"));
        assert!(glob_match("team?", "team1"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("cache:*:b", "cache:leaderboard:a"));
        assert!(!glob_match("team?", "team12"));
        assert!(!glob_match("cache", "cache:x"));
    }
}
