//! Publishing domain events to rooms and the relay, plus the room inactivity sweep.

use std::sync::Arc;

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    dto::realtime::{RealtimeMetricsResponse, RoomSummary},
    realtime::{RealtimeEvent, RoomError},
    state::SharedState,
};

/// Deliver `event` to local subscribers of `room_id` and to the relay channel of the same name.
///
/// Delivery is best effort: failures are logged and never reach the caller.
pub fn publish(state: &SharedState, room_id: &str, event: impl Into<RealtimeEvent>) {
    let event = event.into();
    let name = event.name();
    let payload = match event.payload() {
        Ok(payload) => payload,
        Err(err) => {
            warn!(room = room_id, event = name, error = %err, "failed to encode event");
            return;
        }
    };

    match state
        .rooms()
        .broadcast_to_room(room_id, name, payload.clone(), None)
    {
        Ok(delivered) => debug!(room = room_id, event = name, delivered, "broadcast to room"),
        Err(RoomError::NotFound(_)) => debug!(room = room_id, event = name, "no local room"),
        Err(err) => warn!(room = room_id, event = name, error = %err, "room broadcast failed"),
    }

    let delivery = state.relay().publish(room_id, name, payload);
    let room = room_id.to_string();
    tokio::spawn(async move {
        if !delivery.await {
            warn!(room = %room, event = name, "relay dropped event");
        }
    });
}

/// Periodically delete rooms idle for longer than the configured threshold.
pub fn spawn_room_sweeper(state: &SharedState) -> JoinHandle<()> {
    let weak = Arc::downgrade(state);
    let period = state.config().rooms.sweep_interval;
    let max_inactive = state.config().rooms.max_inactive;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(state) = weak.upgrade() else {
                return;
            };
            let removed = state.rooms().remove_inactive_rooms(max_inactive);
            for room_id in &removed {
                state.relay().unsubscribe(room_id).await;
            }
            if !removed.is_empty() {
                info!(
                    removed = removed.len(),
                    remaining = state.rooms().room_count(),
                    "swept inactive rooms"
                );
            }
        }
    })
}

/// Rooms, relay status and pool aggregate.
pub fn metrics(state: &SharedState) -> RealtimeMetricsResponse {
    let rooms = state
        .rooms()
        .rooms()
        .into_iter()
        .map(|room| RoomSummary {
            member_count: room.member_count(),
            id: room.id,
            name: room.name,
            room_type: room.room_type,
        })
        .collect::<Vec<_>>();
    let pool = state.pool_metrics();

    RealtimeMetricsResponse {
        mode: if pool.is_some() { "pooled" } else { "local" }.to_string(),
        relay_connected: state.relay().is_connected(),
        room_count: rooms.len(),
        rooms,
        pool,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Mutex,
        time::Duration,
    };

    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        realtime::{MatchEvent, RoomType},
        state::{AppState, clock::ManualClock},
    };

    #[tokio::test]
    async fn publish_reaches_room_subscribers_and_relay_bindings() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        state
            .rooms()
            .create_room("match-1", "Match 1", RoomType::Match, json!({}))
            .unwrap();
        let room_seen = Arc::new(Mutex::new(Vec::new()));
        let sink = room_seen.clone();
        let _subscription = state
            .rooms()
            .subscribe("match-1", &["score-update"], move |envelope| {
                sink.lock().unwrap().push(envelope.data.clone());
            })
            .unwrap();
        let relay_seen = Arc::new(Mutex::new(0));
        let counter = relay_seen.clone();
        let channel = state.relay().subscribe("match-1").await.unwrap();
        let _binding = channel.bind("score-update", move |_, _| *counter.lock().unwrap() += 1);

        let id = Uuid::nil();
        publish(
            &state,
            "match-1",
            MatchEvent::ScoreUpdate {
                match_id: id,
                team_id: id,
                points: 3,
                score_a: 3,
                score_b: 0,
            },
        );

        assert_eq!(room_seen.lock().unwrap()[0]["points"], json!(3));
        assert_eq!(*relay_seen.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_idle_rooms() {
        let clock = Arc::new(ManualClock::default());
        let mut config = AppConfig::default();
        config.rooms.sweep_interval = Duration::from_secs(1);
        config.rooms.max_inactive = Duration::from_secs(10);
        let state = AppState::in_memory(config, clock.clone());
        state
            .rooms()
            .create_room("match-1", "Match 1", RoomType::Match, json!({}))
            .unwrap();
        let channel = state.relay().subscribe("match-1").await.unwrap();
        let relay_seen = Arc::new(Mutex::new(0));
        let counter = relay_seen.clone();
        let _binding = channel.bind("score-update", move |_, _| *counter.lock().unwrap() += 1);
        state.track_task(spawn_room_sweeper(&state));

        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(state.rooms().room_count(), 0);
        // The swept room's relay channel is released with it.
        assert!(state.relay().publish("match-1", "score-update", json!({})).await);
        assert_eq!(*relay_seen.lock().unwrap(), 0);
        assert_eq!(metrics(&state).mode, "local");
        state.close().await;
    }
}
