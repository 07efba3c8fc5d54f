use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::{ChannelHandle, ChannelHub, ClientEventSink, Relay, RelayError};

/// Relay that fans events out inside this process.
///
/// Browser sockets attach to the same [`ChannelHub`] through the `/ws` endpoint.
#[derive(Clone, Default)]
pub struct LocalRelay {
    inner: Arc<LocalInner>,
}

#[derive(Default)]
struct LocalInner {
    hub: Arc<ChannelHub>,
    closed: AtomicBool,
}

impl ClientEventSink for LocalInner {
    fn send_client_event(&self, channel: &str, event: &str, data: Value) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.hub.dispatch(channel, event, &data, None);
        true
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(&self) -> Arc<ChannelHub> {
        self.inner.hub.clone()
    }
}

impl Relay for LocalRelay {
    fn subscribe(&self, channel: &str) -> BoxFuture<'static, Result<ChannelHandle, RelayError>> {
        let result = if self.inner.closed.load(Ordering::SeqCst) {
            Err(RelayError::Closed)
        } else {
            Ok(ChannelHandle::new(
                channel,
                self.inner.hub.clone(),
                self.inner.clone(),
            ))
        };
        Box::pin(async move { result })
    }

    fn unsubscribe(&self, channel: &str) -> BoxFuture<'static, ()> {
        self.inner.hub.remove_bindings(channel);
        Box::pin(async {})
    }

    fn publish(&self, channel: &str, event: &str, data: Value) -> BoxFuture<'static, bool> {
        let accepted = if self.inner.closed.load(Ordering::SeqCst) {
            false
        } else {
            let reached = self.inner.hub.dispatch(channel, event, &data, None);
            debug!(channel, event, reached, "published relay event");
            true
        };
        Box::pin(async move { accepted })
    }

    fn is_connected(&self) -> bool {
        ClientEventSink::is_connected(&*self.inner)
    }

    fn close(&self) -> BoxFuture<'static, ()> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.hub.clear();
        }
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn bound_callbacks_receive_published_events() {
        let relay = LocalRelay::new();
        let channel = relay.subscribe("tournament-spring").await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let binding = channel.bind("leaderboard-updated", move |_, data| {
            sink.lock().unwrap().push(data.clone());
        });

        assert!(
            relay
                .publish("tournament-spring", "leaderboard-updated", json!({"rank": 1}))
                .await
        );
        binding.unbind();
        relay
            .publish("tournament-spring", "leaderboard-updated", json!({"rank": 2}))
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![json!({"rank": 1})]);
    }

    #[tokio::test]
    async fn trigger_only_accepts_client_events() {
        let relay = LocalRelay::new();
        let channel = relay.subscribe("presence-spring").await.unwrap();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        channel.bind_all(move |_, _| *counter.lock().unwrap() += 1);

        assert!(matches!(
            channel.trigger("score-update", json!({})),
            Err(RelayError::InvalidClientEvent(event)) if event == "score-update"
        ));
        assert!(channel.trigger("client-typing", json!({})).unwrap());
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn closed_relay_rejects_work() {
        let relay = LocalRelay::new();
        let channel = relay.subscribe("global").await.unwrap();
        relay.close().await;
        relay.close().await;

        assert!(!relay.is_connected());
        assert!(!channel.is_connected());
        assert!(!relay.publish("global", "announcement", json!({})).await);
        assert!(matches!(
            relay.subscribe("global").await,
            Err(RelayError::Closed)
        ));
    }
}
