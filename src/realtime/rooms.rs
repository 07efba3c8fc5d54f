//! Named groups of interested parties layered above relay channels.
//!
//! Rooms live only in process memory. Delivery is synchronous and follows subscription
//! order; crossing process boundaries is the relay's job.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

use super::events::{EventEnvelope, PresenceEvent, RealtimeEvent};
use crate::state::clock::{SharedClock, elapsed_between};

/// Wildcard accepted in subscription event lists.
pub const ALL_EVENTS: &str = "*";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room `{0}` already exists")]
    AlreadyExists(String),
    #[error("room `{0}` not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Tournament,
    Match,
    Global,
    Private,
    Presence,
}

impl RoomType {
    /// Rooms of these types survive inactivity sweeps while anyone is in them.
    fn pinned_while_occupied(self) -> bool {
        matches!(self, RoomType::Presence | RoomType::Global)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub room_type: RoomType,
    /// Member id to the info supplied on join.
    #[schema(value_type = Object)]
    pub members: BTreeMap<String, Value>,
    #[schema(value_type = Object)]
    pub metadata: Value,
    #[schema(value_type = String)]
    pub created_at: SystemTime,
    #[schema(value_type = String)]
    pub last_activity: SystemTime,
}

impl Room {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

pub type RoomCallback = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;
pub type EventFilter = Arc<dyn Fn(&EventEnvelope) -> bool + Send + Sync>;

struct SubscriptionEntry {
    id: u64,
    /// `None` matches every event.
    events: Option<HashSet<String>>,
    member: Option<String>,
    callback: RoomCallback,
}

impl SubscriptionEntry {
    fn wants(&self, event: &str, exclude_member: Option<&str>) -> bool {
        let excluded = exclude_member.is_some_and(|excluded| self.member.as_deref() == Some(excluded));
        !excluded && self.events.as_ref().is_none_or(|events| events.contains(event))
    }
}

struct RoomState {
    room: Room,
    subscriptions: Vec<SubscriptionEntry>,
    filter: Option<EventFilter>,
}

#[derive(Default)]
struct Registry {
    rooms: HashMap<String, RoomState>,
    member_rooms: HashMap<String, HashSet<String>>,
}

impl Registry {
    fn forget_room(&mut self, state: &RoomState) {
        for member in state.room.members.keys() {
            if let Some(rooms) = self.member_rooms.get_mut(member) {
                rooms.remove(&state.room.id);
                if rooms.is_empty() {
                    self.member_rooms.remove(member);
                }
            }
        }
    }
}

struct RoomsInner {
    registry: Mutex<Registry>,
    clock: SharedClock,
    next_subscription: AtomicU64,
}

impl RoomsInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove_subscription(&self, room_id: &str, id: u64) {
        if let Some(state) = self.registry().rooms.get_mut(room_id) {
            state.subscriptions.retain(|subscription| subscription.id != id);
        }
    }
}

fn insert_room(
    registry: &mut Registry,
    id: &str,
    name: &str,
    room_type: RoomType,
    metadata: Value,
    now: SystemTime,
) -> Room {
    let room = Room {
        id: id.to_string(),
        name: name.to_string(),
        room_type,
        members: BTreeMap::new(),
        metadata: match metadata {
            Value::Null => Value::Object(Map::new()),
            other => other,
        },
        created_at: now,
        last_activity: now,
    };
    registry.rooms.insert(
        id.to_string(),
        RoomState {
            room: room.clone(),
            subscriptions: Vec::new(),
            filter: None,
        },
    );
    debug!(room = id, ?room_type, "room created");
    room
}

/// Owner of every room in this process.
#[derive(Clone)]
pub struct RoomManager {
    inner: Arc<RoomsInner>,
}

impl RoomManager {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(RoomsInner {
                registry: Mutex::new(Registry::default()),
                clock,
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Create a room, failing when the id is taken.
    pub fn create_room(
        &self,
        id: &str,
        name: &str,
        room_type: RoomType,
        metadata: Value,
    ) -> Result<Room, RoomError> {
        let now = self.inner.clock.now();
        let mut registry = self.inner.registry();
        if registry.rooms.contains_key(id) {
            return Err(RoomError::AlreadyExists(id.to_string()));
        }
        Ok(insert_room(&mut registry, id, name, room_type, metadata, now))
    }

    /// Return the room with `id`, creating it first when missing.
    pub fn get_or_create_room(&self, id: &str, name: &str, room_type: RoomType, metadata: Value) -> Room {
        let now = self.inner.clock.now();
        let mut registry = self.inner.registry();
        match registry.rooms.get(id) {
            Some(state) => state.room.clone(),
            None => insert_room(&mut registry, id, name, room_type, metadata, now),
        }
    }

    pub fn get_room(&self, id: &str) -> Option<Room> {
        self.inner
            .registry()
            .rooms
            .get(id)
            .map(|state| state.room.clone())
    }

    /// Remove a room with its subscriptions. Returns whether it existed.
    pub fn delete_room(&self, id: &str) -> bool {
        let mut registry = self.inner.registry();
        match registry.rooms.remove(id) {
            Some(state) => {
                registry.forget_room(&state);
                debug!(room = id, "room deleted");
                true
            }
            None => false,
        }
    }

    /// Add `member` to the room; joining twice only refreshes the member info.
    ///
    /// Returns `false` when the room does not exist.
    pub fn join_room(&self, room_id: &str, member: &str, info: Value) -> bool {
        let now = self.inner.clock.now();
        let (joined, announce) = {
            let mut registry = self.inner.registry();
            let Some(state) = registry.rooms.get_mut(room_id) else {
                return false;
            };
            let joined = state
                .room
                .members
                .insert(member.to_string(), info.clone())
                .is_none();
            state.room.last_activity = now;
            let announce = joined && state.room.room_type == RoomType::Presence;
            registry
                .member_rooms
                .entry(member.to_string())
                .or_default()
                .insert(room_id.to_string());
            (joined, announce)
        };

        if joined {
            debug!(room = room_id, member, "member joined room");
        }
        if announce {
            self.announce(
                room_id,
                member,
                PresenceEvent::MemberJoined {
                    member_id: member.to_string(),
                    info,
                },
            );
        }
        true
    }

    /// Remove `member` from the room.
    ///
    /// Returns `false` when the room does not exist or the member was not in it.
    pub fn leave_room(&self, room_id: &str, member: &str) -> bool {
        let now = self.inner.clock.now();
        let announce = {
            let mut registry = self.inner.registry();
            let Some(state) = registry.rooms.get_mut(room_id) else {
                return false;
            };
            if state.room.members.remove(member).is_none() {
                return false;
            }
            state.room.last_activity = now;
            let announce = state.room.room_type == RoomType::Presence;
            if let Some(rooms) = registry.member_rooms.get_mut(member) {
                rooms.remove(room_id);
                if rooms.is_empty() {
                    registry.member_rooms.remove(member);
                }
            }
            announce
        };

        debug!(room = room_id, member, "member left room");
        if announce {
            self.announce(
                room_id,
                member,
                PresenceEvent::MemberLeft {
                    member_id: member.to_string(),
                },
            );
        }
        true
    }

    fn announce(&self, room_id: &str, member: &str, event: PresenceEvent) {
        let event = RealtimeEvent::from(event);
        let Ok(payload) = event.payload() else {
            return;
        };
        let _ = self.broadcast_to_room(room_id, event.name(), payload, Some(member));
    }

    /// Register `callback` for `events` in the room. An empty list or `"*"` means every event.
    pub fn subscribe<F>(&self, room_id: &str, events: &[&str], callback: F) -> Result<Subscription, RoomError>
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        self.register(room_id, None, events, Arc::new(callback))
    }

    /// Like [`RoomManager::subscribe`], but owned by `member` so broadcasts can exclude it.
    pub fn subscribe_as<F>(
        &self,
        room_id: &str,
        member: &str,
        events: &[&str],
        callback: F,
    ) -> Result<Subscription, RoomError>
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        self.register(room_id, Some(member.to_string()), events, Arc::new(callback))
    }

    fn register(
        &self,
        room_id: &str,
        member: Option<String>,
        events: &[&str],
        callback: RoomCallback,
    ) -> Result<Subscription, RoomError> {
        let events = if events.is_empty() || events.contains(&ALL_EVENTS) {
            None
        } else {
            Some(events.iter().map(|event| event.to_string()).collect())
        };
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);

        let mut registry = self.inner.registry();
        let state = registry
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;
        state.subscriptions.push(SubscriptionEntry {
            id,
            events,
            member,
            callback,
        });

        Ok(Subscription {
            rooms: Arc::downgrade(&self.inner),
            room_id: room_id.to_string(),
            id,
            active: AtomicBool::new(true),
        })
    }

    /// Deliver `event` to the room's matching subscriptions, in registration order.
    ///
    /// Subscriptions owned by `exclude_member` are skipped; the excluded member is recorded as
    /// the envelope sender. Returns how many callbacks ran.
    pub fn broadcast_to_room(
        &self,
        room_id: &str,
        event: &str,
        data: Value,
        exclude_member: Option<&str>,
    ) -> Result<usize, RoomError> {
        let now = self.inner.clock.now();
        let (envelope, filter, callbacks) = {
            let mut registry = self.inner.registry();
            let state = registry
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;
            state.room.last_activity = now;
            let callbacks = state
                .subscriptions
                .iter()
                .filter(|subscription| subscription.wants(event, exclude_member))
                .map(|subscription| subscription.callback.clone())
                .collect::<Vec<_>>();
            let envelope = EventEnvelope {
                room: room_id.to_string(),
                event: event.to_string(),
                data,
                sender: exclude_member.map(str::to_string),
                timestamp: now,
            };
            (envelope, state.filter.clone(), callbacks)
        };

        if filter.is_some_and(|filter| !filter(&envelope)) {
            debug!(room = room_id, event, "event dropped by room filter");
            return Ok(0);
        }
        for callback in &callbacks {
            callback(&envelope);
        }
        Ok(callbacks.len())
    }

    /// Install a predicate evaluated before delivery. Returns `false` for unknown rooms.
    pub fn set_event_filter<F>(&self, room_id: &str, predicate: F) -> bool
    where
        F: Fn(&EventEnvelope) -> bool + Send + Sync + 'static,
    {
        match self.inner.registry().rooms.get_mut(room_id) {
            Some(state) => {
                state.filter = Some(Arc::new(predicate));
                true
            }
            None => false,
        }
    }

    pub fn clear_event_filter(&self, room_id: &str) -> bool {
        match self.inner.registry().rooms.get_mut(room_id) {
            Some(state) => state.filter.take().is_some(),
            None => false,
        }
    }

    /// Delete rooms idle for longer than `max_inactive` and return how many went.
    ///
    /// Presence and global rooms are kept while they have members.
    pub fn cleanup_inactive_rooms(&self, max_inactive: Duration) -> usize {
        self.remove_inactive_rooms(max_inactive).len()
    }

    /// Same sweep as [`RoomManager::cleanup_inactive_rooms`], returning the removed ids.
    pub fn remove_inactive_rooms(&self, max_inactive: Duration) -> Vec<String> {
        let now = self.inner.clock.now();
        let mut registry = self.inner.registry();
        let stale = registry
            .rooms
            .values()
            .filter(|state| {
                let room = &state.room;
                let pinned = room.room_type.pinned_while_occupied() && !room.members.is_empty();
                !pinned && elapsed_between(room.last_activity, now) > max_inactive
            })
            .map(|state| state.room.id.clone())
            .collect::<Vec<_>>();

        for id in &stale {
            if let Some(state) = registry.rooms.remove(id) {
                registry.forget_room(&state);
            }
        }
        if !stale.is_empty() {
            info!(removed = stale.len(), "swept inactive rooms");
        }
        stale
    }

    /// Ids of the rooms `member` belongs to, sorted.
    pub fn rooms_for_member(&self, member: &str) -> Vec<String> {
        let mut rooms = self
            .inner
            .registry()
            .member_rooms
            .get(member)
            .map(|rooms| rooms.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub fn member_count(&self, room_id: &str) -> Option<usize> {
        self.inner
            .registry()
            .rooms
            .get(room_id)
            .map(|state| state.room.member_count())
    }

    pub fn room_count(&self) -> usize {
        self.inner.registry().rooms.len()
    }

    /// Every room, sorted by id.
    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms = self
            .inner
            .registry()
            .rooms
            .values()
            .map(|state| state.room.clone())
            .collect::<Vec<_>>();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }
}

/// Handle to a room subscription.
///
/// `unsubscribe` may be called any number of times, including after the room is gone.
pub struct Subscription {
    rooms: Weak<RoomsInner>,
    room_id: String,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(rooms) = self.rooms.upgrade() {
            rooms.remove_subscription(&self.room_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::state::clock::{Clock, ManualClock};

    fn manager() -> (RoomManager, ManualClock) {
        let clock = ManualClock::default();
        (RoomManager::new(Arc::new(clock.clone())), clock)
    }

    fn recorder() -> (Arc<Mutex<Vec<EventEnvelope>>>, impl Fn(&EventEnvelope) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |envelope: &EventEnvelope| {
            sink.lock().unwrap().push(envelope.clone())
        })
    }

    #[test]
    fn duplicate_create_fails_but_get_or_create_returns_the_room() {
        let (rooms, _) = manager();
        rooms
            .create_room("tournament-spring", "Spring Games", RoomType::Tournament, json!({"slug": "spring"}))
            .unwrap();

        assert_eq!(
            rooms.create_room("tournament-spring", "Other", RoomType::Match, Value::Null),
            Err(RoomError::AlreadyExists("tournament-spring".into()))
        );
        let existing = rooms.get_or_create_room("tournament-spring", "Other", RoomType::Match, Value::Null);
        assert_eq!(existing.name, "Spring Games");
        assert_eq!(existing.room_type, RoomType::Tournament);
        assert_eq!(rooms.room_count(), 1);
    }

    #[test]
    fn member_count_uses_set_semantics() {
        let (rooms, _) = manager();
        rooms.create_room("match-7", "Match 7", RoomType::Match, Value::Null).unwrap();
        for member in ["p1", "p2", "p3", "p4", "p1", "p2"] {
            assert!(rooms.join_room("match-7", member, json!({})));
        }
        for member in ["p1", "p3"] {
            assert!(rooms.leave_room("match-7", member));
        }

        assert_eq!(rooms.member_count("match-7"), Some(2));
        assert_eq!(rooms.rooms_for_member("p2"), vec!["match-7".to_string()]);
        assert!(rooms.rooms_for_member("p1").is_empty());
        assert!(!rooms.join_room("missing", "p1", json!({})));
        assert!(!rooms.leave_room("missing", "p1"));
    }

    #[test]
    fn broadcast_skips_the_excluded_member() {
        let (rooms, _) = manager();
        rooms.create_room("match-42", "Match 42", RoomType::Match, Value::Null).unwrap();
        rooms.join_room("match-42", "p1", json!({}));
        rooms.join_room("match-42", "p2", json!({}));
        let (p1_seen, p1_callback) = recorder();
        let (p2_seen, p2_callback) = recorder();
        rooms.subscribe_as("match-42", "p1", &["score-update"], p1_callback).unwrap();
        rooms.subscribe_as("match-42", "p2", &["score-update"], p2_callback).unwrap();

        let delivered = rooms
            .broadcast_to_room("match-42", "score-update", json!({"teamId": "t1", "points": 3}), Some("p1"))
            .unwrap();

        assert_eq!(delivered, 1);
        assert!(p1_seen.lock().unwrap().is_empty());
        let p2_seen = p2_seen.lock().unwrap();
        assert_eq!(p2_seen.len(), 1);
        assert_eq!(p2_seen[0].data, json!({"teamId": "t1", "points": 3}));
        assert_eq!(p2_seen[0].sender.as_deref(), Some("p1"));
    }

    #[test]
    fn delivery_follows_registration_order_and_event_names() {
        let (rooms, _) = manager();
        rooms.create_room("global", "Global", RoomType::Global, Value::Null).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, events) in [("first", vec!["announcement"]), ("second", vec![]), ("third", vec!["level-up"])] {
            let order = order.clone();
            rooms
                .subscribe("global", &events, move |_| order.lock().unwrap().push(label))
                .unwrap();
        }

        rooms.broadcast_to_room("global", "announcement", json!({}), None).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(
            rooms.broadcast_to_room("nowhere", "announcement", json!({}), None),
            Err(RoomError::NotFound("nowhere".into()))
        );
    }

    #[test]
    fn unsubscribe_is_idempotent_even_after_deletion() {
        let (rooms, _) = manager();
        rooms.create_room("match-1", "Match 1", RoomType::Match, Value::Null).unwrap();
        let (seen, callback) = recorder();
        let subscription = rooms.subscribe("match-1", &["*"], callback).unwrap();

        subscription.unsubscribe();
        rooms.broadcast_to_room("match-1", "score-update", json!({}), None).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        let (_, callback) = recorder();
        let other = rooms.subscribe("match-1", &[], callback).unwrap();
        assert!(rooms.delete_room("match-1"));
        other.unsubscribe();
        other.unsubscribe();
        subscription.unsubscribe();
        assert!(matches!(
            rooms.subscribe("match-1", &[], |_| {}),
            Err(RoomError::NotFound(_))
        ));
    }

    #[test]
    fn filtered_events_still_count_as_activity() {
        let (rooms, clock) = manager();
        rooms.create_room("match-3", "Match 3", RoomType::Match, Value::Null).unwrap();
        let (seen, callback) = recorder();
        rooms.subscribe("match-3", &[], callback).unwrap();
        assert!(rooms.set_event_filter("match-3", |envelope| envelope.event != "score-update"));

        clock.advance(Duration::from_secs(30));
        let delivered = rooms.broadcast_to_room("match-3", "score-update", json!({}), None).unwrap();

        assert_eq!(delivered, 0);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(rooms.get_room("match-3").unwrap().last_activity, clock.now());

        assert!(rooms.clear_event_filter("match-3"));
        assert_eq!(rooms.broadcast_to_room("match-3", "score-update", json!({}), None), Ok(1));
    }

    #[test]
    fn cleanup_keeps_occupied_presence_and_global_rooms() {
        let (rooms, clock) = manager();
        rooms.create_room("presence-full", "P", RoomType::Presence, Value::Null).unwrap();
        rooms.create_room("presence-empty", "P", RoomType::Presence, Value::Null).unwrap();
        rooms.create_room("global", "G", RoomType::Global, Value::Null).unwrap();
        rooms.create_room("match-9", "M", RoomType::Match, Value::Null).unwrap();
        rooms.join_room("presence-full", "p1", json!({}));
        rooms.join_room("global", "p1", json!({}));
        rooms.join_room("match-9", "p1", json!({}));

        clock.advance(Duration::from_secs(600));
        rooms.create_room("fresh", "F", RoomType::Private, Value::Null).unwrap();
        let removed = rooms.cleanup_inactive_rooms(Duration::from_secs(300));

        assert_eq!(removed, 2);
        let remaining = rooms.rooms().into_iter().map(|room| room.id).collect::<Vec<_>>();
        assert_eq!(remaining, vec!["fresh", "global", "presence-full"]);
        assert_eq!(rooms.rooms_for_member("p1"), vec!["global".to_string(), "presence-full".to_string()]);
    }

    #[test]
    fn presence_rooms_announce_joins_and_leaves() {
        let (rooms, _) = manager();
        rooms.create_room("presence-spring", "Spring", RoomType::Presence, Value::Null).unwrap();
        let (seen, callback) = recorder();
        rooms.subscribe("presence-spring", &["member-joined", "member-left"], callback).unwrap();

        rooms.join_room("presence-spring", "u1", json!({"name": "Ana"}));
        rooms.join_room("presence-spring", "u1", json!({"name": "Ana"}));
        rooms.leave_room("presence-spring", "u1");

        let seen = seen.lock().unwrap();
        let events = seen.iter().map(|e| e.event.as_str()).collect::<Vec<_>>();
        assert_eq!(events, vec!["member-joined", "member-left"]);
        assert_eq!(seen[0].data, json!({"memberId": "u1", "info": {"name": "Ana"}}));
    }
}
