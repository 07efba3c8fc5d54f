use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashSet;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{ChannelHandle, ChannelHub, ClientEventSink, Relay, RelayError};
use crate::realtime::{
    pool::{ConnectionId, ConnectionPool, InboundFrame, PoolEvent},
    protocol::RelayMessage,
};

/// Relay client speaking the hosted relay protocol over the connection pool.
#[derive(Clone)]
pub struct PooledRelay {
    inner: Arc<PooledInner>,
}

struct PooledInner {
    pool: ConnectionPool,
    hub: Arc<ChannelHub>,
    /// Channels this process asked for; used to re-subscribe after reconnects.
    channels: DashSet<String>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PooledRelay {
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            inner: Arc::new(PooledInner {
                pool,
                hub: ChannelHub::new(),
                channels: DashSet::new(),
                tasks: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Start the pool timers and the inbound pumps. Calling it again is a no-op.
    pub fn start(&self) {
        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !tasks.is_empty() || self.inner.is_closed() {
            return;
        }
        self.inner.pool.start();
        let weak = Arc::downgrade(&self.inner);
        tasks.push(tokio::spawn(frame_pump(
            weak.clone(),
            self.inner.pool.subscribe_frames(),
        )));
        tasks.push(tokio::spawn(event_pump(
            weak,
            self.inner.pool.subscribe_events(),
        )));
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }
}

impl PooledInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn on_frame(&self, frame: InboundFrame) {
        let message = match RelayMessage::decode(&frame.text) {
            Ok(message) => message,
            Err(err) => {
                warn!(connection = %frame.connection_id, error = %err, "dropping relay frame");
                return;
            }
        };
        match message {
            RelayMessage::Event {
                channel,
                event,
                data,
            } => {
                if self.channels.contains(&channel) {
                    self.hub.dispatch(&channel, &event, &data, None);
                }
            }
            RelayMessage::Ping => {
                self.pool
                    .send_message(frame.connection_id, RelayMessage::Pong.encode());
            }
            RelayMessage::ConnectionEstablished { socket_id, .. } => {
                debug!(connection = %frame.connection_id, %socket_id, "relay session established");
            }
            RelayMessage::SubscriptionSucceeded { channel } => {
                debug!(connection = %frame.connection_id, %channel, "relay subscription confirmed");
            }
            RelayMessage::Error { message, code } => {
                warn!(connection = %frame.connection_id, ?code, %message, "relay reported an error");
            }
            RelayMessage::Subscribe { .. } | RelayMessage::Unsubscribe { .. } | RelayMessage::Pong => {}
        }
    }

    fn send_subscribe(&self, connection: ConnectionId, channel: &str) -> bool {
        self.pool.send_message(
            connection,
            RelayMessage::Subscribe {
                channel: channel.to_string(),
            }
            .encode(),
        )
    }

    async fn place_and_subscribe(&self, channel: &str) -> Result<(), RelayError> {
        let connection = self.pool.get_connection_for_channel(channel).await?;
        if !self.send_subscribe(connection, channel) {
            debug!(channel, %connection, "subscribe deferred until the connection is up");
        }
        Ok(())
    }
}

impl ClientEventSink for PooledInner {
    fn send_client_event(&self, channel: &str, event: &str, data: Value) -> bool {
        if self.is_closed() {
            return false;
        }
        self.pool.send_to_channel(
            channel,
            RelayMessage::Event {
                channel: channel.to_string(),
                event: event.to_string(),
                data,
            }
            .encode(),
        )
    }

    fn is_connected(&self) -> bool {
        !self.is_closed() && self.pool.is_connected()
    }
}

async fn frame_pump(inner: Weak<PooledInner>, mut frames: broadcast::Receiver<InboundFrame>) {
    loop {
        let frame = match frames.recv().await {
            Ok(frame) => frame,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "relay frame pump lagged");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.on_frame(frame);
    }
}

async fn event_pump(inner: Weak<PooledInner>, mut events: broadcast::Receiver<PoolEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "relay event pump lagged");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match event {
            PoolEvent::Reconnected {
                connection_id,
                channels,
                ..
            } => {
                for channel in channels.iter().filter(|c| inner.channels.contains(*c)) {
                    inner.send_subscribe(connection_id, channel);
                }
                info!(connection = %connection_id, channels = channels.len(), "re-subscribed relay channels");
            }
            PoolEvent::ConnectionLost {
                connection_id,
                channels,
                ..
            } => {
                let orphaned = channels
                    .into_iter()
                    .filter(|c| inner.channels.contains(c))
                    .collect::<Vec<_>>();
                if orphaned.is_empty() {
                    continue;
                }
                warn!(connection = %connection_id, channels = orphaned.len(), "relay connection lost; moving channels");
                let weak = Arc::downgrade(&inner);
                tokio::spawn(async move {
                    for channel in orphaned {
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        if let Err(err) = inner.place_and_subscribe(&channel).await {
                            warn!(%channel, error = %err, "could not move relay channel");
                        }
                    }
                });
            }
            _ => {}
        }
    }
}

impl Relay for PooledRelay {
    fn subscribe(&self, channel: &str) -> BoxFuture<'static, Result<ChannelHandle, RelayError>> {
        let inner = self.inner.clone();
        let channel = channel.to_string();
        Box::pin(async move {
            if inner.is_closed() {
                return Err(RelayError::Closed);
            }
            inner.channels.insert(channel.clone());
            if let Err(err) = inner.place_and_subscribe(&channel).await {
                inner.channels.remove(&channel);
                return Err(err);
            }
            let hub = inner.hub.clone();
            Ok(ChannelHandle::new(&channel, hub, inner))
        })
    }

    fn unsubscribe(&self, channel: &str) -> BoxFuture<'static, ()> {
        let inner = &self.inner;
        if inner.channels.remove(channel).is_some() {
            inner.pool.send_to_channel(
                channel,
                RelayMessage::Unsubscribe {
                    channel: channel.to_string(),
                }
                .encode(),
            );
            inner.pool.release_channel(channel);
        }
        inner.hub.remove_bindings(channel);
        Box::pin(async {})
    }

    /// Sends the event on the connection serving `channel`. Channels nobody subscribed to go out
    /// on any live connection and are never left routed in the pool.
    fn publish(&self, channel: &str, event: &str, data: Value) -> BoxFuture<'static, bool> {
        let inner = self.inner.clone();
        let channel = channel.to_string();
        let event = event.to_string();
        Box::pin(async move {
            if inner.is_closed() {
                return false;
            }
            let message = RelayMessage::Event {
                channel: channel.clone(),
                event: event.clone(),
                data,
            }
            .encode();
            if let Some(connection) = inner.pool.connection_for(&channel) {
                return inner.pool.send_message(connection, message);
            }
            if inner.pool.send_unrouted(message.clone()) {
                return true;
            }

            // Nothing is live yet: borrow a slot for this send only.
            let connection = match inner.pool.get_connection_for_channel(&channel).await {
                Ok(connection) => connection,
                Err(err) => {
                    warn!(%channel, %event, error = %err, "relay publish failed");
                    return false;
                }
            };
            let sent = inner.pool.send_message(connection, message);
            if !inner.channels.contains(&channel) {
                inner.pool.release_channel(&channel);
            }
            sent
        })
    }

    fn is_connected(&self) -> bool {
        ClientEventSink::is_connected(&*self.inner)
    }

    fn close(&self) -> BoxFuture<'static, ()> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if inner.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            let tasks = std::mem::take(
                &mut *inner
                    .tasks
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            );
            for task in tasks {
                task.abort();
            }
            inner.channels.clear();
            inner.hub.clear();
            inner.pool.close().await;
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::{sync::mpsc, time::timeout};

    use super::*;
    use crate::realtime::pool::{
        BackoffConfig, Frame, PoolConfig, TransportEvent,
        transport::testing::{MemoryConnector, RemoteEnd},
    };

    fn relay() -> (PooledRelay, MemoryConnector) {
        let connector = MemoryConnector::new();
        let config = PoolConfig {
            max_connections: 2,
            max_channels_per_connection: 4,
            connection_timeout: Duration::from_secs(1),
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(100),
                max_attempts: 3,
                ..BackoffConfig::default()
            },
            ..PoolConfig::default()
        };
        let pool = ConnectionPool::new(
            config,
            vec!["ws://relay-a".to_string()],
            Arc::new(connector.clone()),
        )
        .unwrap();
        let relay = PooledRelay::new(pool);
        relay.start();
        (relay, connector)
    }

    async fn next_text(remote: &mut RemoteEnd) -> RelayMessage {
        loop {
            let frame = timeout(Duration::from_secs(5), remote.received.recv())
                .await
                .unwrap()
                .unwrap();
            if let Frame::Text(text) = frame {
                return RelayMessage::decode(&text).unwrap();
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn subscribing_sends_a_frame_and_routes_inbound_events() {
        let (relay, connector) = relay();
        let channel = relay.subscribe("match-42").await.unwrap();
        let mut remote = connector.take_remotes().pop().unwrap();
        assert_eq!(
            next_text(&mut remote).await,
            RelayMessage::Subscribe {
                channel: "match-42".into()
            }
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.bind("score-update", move |_, data| {
            let _ = tx.send(data.clone());
        });
        let inbound = RelayMessage::Event {
            channel: "match-42".into(),
            event: "score-update".into(),
            data: json!({"scoreA": 3}),
        };
        remote
            .send
            .send(TransportEvent::Frame(Frame::Text(inbound.encode())))
            .unwrap();

        let data = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, json!({"scoreA": 3}));
    }

    #[tokio::test(start_paused = true)]
    async fn publish_and_client_events_go_out_as_event_frames() {
        let (relay, connector) = relay();
        let channel = relay.subscribe("presence-spring").await.unwrap();
        let mut remote = connector.take_remotes().pop().unwrap();
        next_text(&mut remote).await;

        assert!(
            relay
                .publish("presence-spring", "vote-cast", json!({"totalVotes": 1}))
                .await
        );
        assert!(channel.trigger("client-typing", json!({"userId": "u1"})).unwrap());
        assert!(channel.trigger("vote-cast", json!({})).is_err());

        assert!(matches!(
            next_text(&mut remote).await,
            RelayMessage::Event { event, .. } if event == "vote-cast"
        ));
        assert!(matches!(
            next_text(&mut remote).await,
            RelayMessage::Event { event, .. } if event == "client-typing"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn channels_are_resubscribed_after_reconnect() {
        let (relay, connector) = relay();
        relay.subscribe("tournament-spring").await.unwrap();
        let remote = connector.take_remotes().pop().unwrap();
        remote
            .send
            .send(TransportEvent::Closed {
                reason: Some("going away".into()),
            })
            .unwrap();

        let mut replacement = loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Some(remote) = connector.take_remotes().pop() {
                break remote;
            }
        };
        assert_eq!(
            next_text(&mut replacement).await,
            RelayMessage::Subscribe {
                channel: "tournament-spring".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn publishing_to_unsubscribed_channels_does_not_consume_pool_slots() {
        let connector = MemoryConnector::new();
        let config = PoolConfig {
            max_connections: 1,
            max_connections_per_endpoint: 1,
            max_channels_per_connection: 2,
            connection_timeout: Duration::from_secs(1),
            ..PoolConfig::default()
        };
        let pool = ConnectionPool::new(
            config,
            vec!["ws://relay-a".to_string()],
            Arc::new(connector.clone()),
        )
        .unwrap();
        let relay = PooledRelay::new(pool);
        relay.start();

        for channel in ["match-1", "match-2", "match-3"] {
            assert!(relay.publish(channel, "score-update", json!({"points": 1})).await);
        }

        let pool = relay.pool();
        assert_eq!(pool.connection_count(), 1);
        for channel in ["match-1", "match-2", "match-3"] {
            assert_eq!(pool.connection_for(channel), None);
        }
        let mut remote = connector.take_remotes().pop().unwrap();
        for expected in ["match-1", "match-2", "match-3"] {
            assert!(matches!(
                next_text(&mut remote).await,
                RelayMessage::Event { channel, .. } if channel == expected
            ));
        }

        // Both channel slots are still free for real subscriptions.
        relay.subscribe("global").await.unwrap();
        relay.subscribe("presence-spring").await.unwrap();
        assert_eq!(pool.channels_of(pool.connection_for("global").unwrap()).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn channels_of_a_lost_connection_move_to_a_new_one() {
        let (relay, connector) = relay();
        relay.subscribe("tournament-spring").await.unwrap();
        let original = relay.pool().connection_for("tournament-spring").unwrap();
        let dead = connector.take_remotes().pop().unwrap();
        let mut events = relay.pool().subscribe_events();

        // Every reconnect fails until the pool gives the connection up.
        connector.refuse_connections(true);
        dead.send
            .send(TransportEvent::Closed {
                reason: Some("relay restarted".into()),
            })
            .unwrap();
        loop {
            let event = timeout(Duration::from_secs(30), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let PoolEvent::ConnectionLost { connection_id, .. } = event {
                assert_eq!(connection_id, original);
                break;
            }
        }
        connector.refuse_connections(false);

        let mut replacement = loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Some(remote) = connector.take_remotes().pop() {
                break remote;
            }
        };
        assert_eq!(
            next_text(&mut replacement).await,
            RelayMessage::Subscribe {
                channel: "tournament-spring".into()
            }
        );
        let moved = relay.pool().connection_for("tournament-spring").unwrap();
        assert_ne!(moved, original);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_releases_the_channel_and_close_is_idempotent() {
        let (relay, connector) = relay();
        relay.subscribe("global").await.unwrap();
        let mut remote = connector.take_remotes().pop().unwrap();
        next_text(&mut remote).await;

        relay.unsubscribe("global").await;
        relay.unsubscribe("global").await;
        assert_eq!(
            next_text(&mut remote).await,
            RelayMessage::Unsubscribe {
                channel: "global".into()
            }
        );
        assert_eq!(relay.pool().connection_for("global"), None);

        relay.close().await;
        relay.close().await;
        assert!(!relay.is_connected());
        assert!(matches!(
            relay.subscribe("global").await,
            Err(RelayError::Closed)
        ));
    }
}
