//! Socket server behind `/ws`, speaking the relay frame protocol against the local channel hub.

use std::{collections::HashSet, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    realtime::{
        protocol::{RelayMessage, is_client_event},
        relay::ChannelHub,
    },
    state::SharedState,
};

/// Seconds of silence after which clients are expected to ping.
const ACTIVITY_TIMEOUT: u64 = 120;

/// Hub shared with the local relay; unavailable when events go through a hosted relay.
pub fn local_hub(state: &SharedState) -> Result<Arc<ChannelHub>, ServiceError> {
    state
        .local_relay()
        .map(|relay| relay.hub())
        .ok_or_else(|| ServiceError::NotFound("Socket server is disabled in pooled relay mode".into()))
}

/// Per-connection protocol state.
struct SocketSession {
    id: String,
    hub: Arc<ChannelHub>,
    frames: mpsc::UnboundedSender<String>,
    channels: HashSet<String>,
}

impl SocketSession {
    fn send(&self, message: RelayMessage) -> bool {
        self.frames.send(message.encode()).is_ok()
    }

    fn error(&self, message: impl Into<String>, code: u32) -> bool {
        self.send(RelayMessage::Error {
            message: message.into(),
            code: Some(code),
        })
    }

    /// Apply one inbound frame. Returns `false` once the writer is gone.
    fn handle(&mut self, message: RelayMessage) -> bool {
        match message {
            RelayMessage::Subscribe { channel } => {
                self.hub.attach_socket(&channel, &self.id, self.frames.clone());
                self.channels.insert(channel.clone());
                debug!(socket = %self.id, channel = %channel, "socket subscribed");
                self.send(RelayMessage::SubscriptionSucceeded { channel })
            }
            RelayMessage::Unsubscribe { channel } => {
                self.hub.detach_socket(&channel, &self.id);
                self.channels.remove(&channel);
                true
            }
            RelayMessage::Ping => self.send(RelayMessage::Pong),
            RelayMessage::Pong => true,
            RelayMessage::Event {
                channel,
                event,
                data,
            } => {
                if !is_client_event(&event) {
                    return self.error(format!("Only client- events may be sent, got {event}"), 4301);
                }
                if !self.channels.contains(&channel) {
                    return self.error(format!("Not subscribed to {channel}"), 4302);
                }
                let reached = self.hub.dispatch(&channel, &event, &data, Some(&self.id));
                debug!(socket = %self.id, channel = %channel, event = %event, reached, "client event");
                true
            }
            RelayMessage::ConnectionEstablished { .. }
            | RelayMessage::SubscriptionSucceeded { .. }
            | RelayMessage::Error { .. } => self.error("Unexpected server frame", 4300),
        }
    }
}

/// Handle the full lifecycle for an individual browser socket.
pub async fn handle_socket(hub: Arc<ChannelHub>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    // Dedicated writer task keeps hub deliveries flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = frames_rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = SocketSession {
        id: Uuid::new_v4().simple().to_string(),
        hub,
        frames: frames_tx,
        channels: HashSet::new(),
    };
    info!(socket = %session.id, "relay socket connected");
    if !session.send(RelayMessage::ConnectionEstablished {
        socket_id: session.id.clone(),
        activity_timeout: ACTIVITY_TIMEOUT,
    }) {
        finalize(writer_task, session).await;
        return;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match RelayMessage::decode(&text) {
                Ok(frame) => {
                    if !session.handle(frame) {
                        break;
                    }
                }
                Err(err) => {
                    warn!(socket = %session.id, error = %err, "failed to decode relay frame");
                    if !session.error("Malformed frame", 4200) {
                        break;
                    }
                }
            },
            Ok(Message::Close(_)) => {
                info!(socket = %session.id, "relay socket closed by client");
                break;
            }
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => {}
            Err(err) => {
                warn!(socket = %session.id, error = %err, "websocket error");
                break;
            }
        }
    }

    finalize(writer_task, session).await;
}

/// Detach the socket from every channel and let the writer wind down.
async fn finalize(writer_task: JoinHandle<()>, session: SocketSession) {
    let left = session.hub.detach_everywhere(&session.id);
    info!(socket = %session.id, channels = left, "relay socket disconnected");
    drop(session);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn session(hub: &Arc<ChannelHub>) -> (SocketSession, mpsc::UnboundedReceiver<String>) {
        let (frames, rx) = mpsc::unbounded_channel();
        (
            SocketSession {
                id: Uuid::new_v4().simple().to_string(),
                hub: hub.clone(),
                frames,
                channels: HashSet::new(),
            },
            rx,
        )
    }

    fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> RelayMessage {
        RelayMessage::decode(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn client_events_skip_their_sender() {
        let hub = ChannelHub::new();
        let (mut alice, mut alice_rx) = session(&hub);
        let (mut bob, mut bob_rx) = session(&hub);
        for peer in [&mut alice, &mut bob] {
            peer.handle(RelayMessage::Subscribe {
                channel: "match-1".into(),
            });
        }
        assert_eq!(
            next(&mut alice_rx),
            RelayMessage::SubscriptionSucceeded {
                channel: "match-1".into()
            }
        );
        next(&mut bob_rx);

        alice.handle(RelayMessage::Event {
            channel: "match-1".into(),
            event: "client-cheer".into(),
            data: json!({ "volume": 11 }),
        });

        assert!(alice_rx.try_recv().is_err());
        assert_eq!(
            next(&mut bob_rx),
            RelayMessage::Event {
                channel: "match-1".into(),
                event: "client-cheer".into(),
                data: json!({ "volume": 11 }),
            }
        );
    }

    #[test]
    fn server_event_names_and_foreign_channels_are_refused() {
        let hub = ChannelHub::new();
        let (mut socket, mut rx) = session(&hub);

        socket.handle(RelayMessage::Event {
            channel: "match-1".into(),
            event: "client-cheer".into(),
            data: json!({}),
        });
        assert!(matches!(next(&mut rx), RelayMessage::Error { code: Some(4302), .. }));

        socket.handle(RelayMessage::Subscribe {
            channel: "match-1".into(),
        });
        next(&mut rx);
        socket.handle(RelayMessage::Event {
            channel: "match-1".into(),
            event: "score-update".into(),
            data: json!({}),
        });
        assert!(matches!(next(&mut rx), RelayMessage::Error { code: Some(4301), .. }));

        socket.handle(RelayMessage::Ping);
        assert_eq!(next(&mut rx), RelayMessage::Pong);
    }
}
