use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    realtime::{EventEnvelope, Subscription},
    state::SharedState,
};

/// Room events buffered per stream before a slow client starts losing them.
pub const ROOM_EVENT_BACKLOG: usize = 64;

/// Subscribe to `room_id`, restricted to `events` when non-empty.
///
/// At most [`ROOM_EVENT_BACKLOG`] envelopes wait for the reader; newer ones are dropped while
/// the queue is full.
pub fn subscribe_room(
    state: &SharedState,
    room_id: &str,
    events: &[&str],
) -> Result<(Subscription, mpsc::Receiver<EventEnvelope>), ServiceError> {
    let (tx, rx) = mpsc::channel(ROOM_EVENT_BACKLOG);
    let subscription = state
        .rooms()
        .subscribe(room_id, events, move |envelope| match tx.try_send(envelope.clone()) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(dropped)) => {
                debug!(room = %dropped.room, event = %dropped.event, "SSE client lagging; event dropped");
            }
        })?;
    Ok((subscription, rx))
}

/// Convert a room subscription into an SSE response, forwarding envelopes and dropping the
/// subscription once the client disconnects.
pub fn to_sse_stream(
    subscription: Subscription,
    mut receiver: mpsc::Receiver<EventEnvelope>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                envelope = receiver.recv() => {
                    let Some(envelope) = envelope else {
                        break;
                    };
                    let event = match Event::default().event(&envelope.event).json_data(&envelope) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!(room = %envelope.room, error = %err, "failed to encode room event");
                            continue;
                        }
                    };
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }

        subscription.unsubscribe();
        info!(room = subscription.room_id(), "room SSE stream disconnected");
    });

    // Dropped by axum on disconnect, which closes `tx` and stops the forwarder.
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        config::AppConfig,
        realtime::RoomType,
        state::{AppState, clock::ManualClock},
    };

    #[tokio::test]
    async fn room_events_reach_the_receiver_until_unsubscribed() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        state
            .rooms()
            .create_room("match-42", "Match 42", RoomType::Match, json!({}))
            .unwrap();
        let (subscription, mut receiver) = subscribe_room(&state, "match-42", &["score-update"]).unwrap();

        state
            .rooms()
            .broadcast_to_room("match-42", "chat", json!({}), None)
            .unwrap();
        state
            .rooms()
            .broadcast_to_room("match-42", "score-update", json!({ "points": 3 }), None)
            .unwrap();

        let envelope = receiver.recv().await.unwrap();
        assert_eq!(envelope.event, "score-update");
        assert_eq!(envelope.data, json!({ "points": 3 }));

        subscription.unsubscribe();
        state
            .rooms()
            .broadcast_to_room("match-42", "score-update", json!({ "points": 1 }), None)
            .unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_readers_keep_the_oldest_backlog_and_lose_the_rest() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        state
            .rooms()
            .create_room("global", "Everyone", RoomType::Global, json!({}))
            .unwrap();
        let (_subscription, mut receiver) = subscribe_room(&state, "global", &[]).unwrap();

        for n in 0..ROOM_EVENT_BACKLOG + 10 {
            state
                .rooms()
                .broadcast_to_room("global", "tick", json!({ "n": n }), None)
                .unwrap();
        }

        let mut received = Vec::new();
        while let Ok(envelope) = receiver.try_recv() {
            received.push(envelope.data["n"].as_u64().unwrap());
        }
        assert_eq!(received.len(), ROOM_EVENT_BACKLOG);
        assert_eq!(received.first(), Some(&0));
        assert_eq!(received.last(), Some(&(ROOM_EVENT_BACKLOG as u64 - 1)));
    }

    #[test]
    fn unknown_rooms_are_not_found() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        assert!(matches!(
            subscribe_room(&state, "nope", &[]),
            Err(ServiceError::NotFound(_))
        ));
    }
}
