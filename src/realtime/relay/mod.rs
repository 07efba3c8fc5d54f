//! Publish/subscribe relay used to fan realtime events out to browsers.
//!
//! Two implementations exist: [`LocalRelay`] serves subscribers in-process and over the `/ws`
//! endpoint, [`PooledRelay`] forwards to a hosted relay through the connection pool.

mod hub;
mod local;
mod pooled;

pub use hub::{Binding, ChannelHub, EventCallback, SocketId};
pub use local::LocalRelay;
pub use pooled::PooledRelay;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use super::{pool::PoolError, protocol::is_client_event};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("client events must be prefixed with `client-`, got `{0}`")]
    InvalidClientEvent(String),
    #[error("relay is closed")]
    Closed,
    #[error(transparent)]
    Pool(#[from] PoolError),
}

pub trait Relay: Send + Sync {
    /// Subscribe to `channel`, returning a handle to bind callbacks and trigger client events.
    fn subscribe(&self, channel: &str) -> BoxFuture<'static, Result<ChannelHandle, RelayError>>;

    /// Stop receiving events for `channel` and drop its bindings.
    fn unsubscribe(&self, channel: &str) -> BoxFuture<'static, ()>;

    /// Emit a server event. Returns whether the relay accepted it.
    fn publish(&self, channel: &str, event: &str, data: Value) -> BoxFuture<'static, bool>;

    fn is_connected(&self) -> bool;

    fn close(&self) -> BoxFuture<'static, ()>;
}

/// Outbound half the channel handle needs from its relay.
pub(crate) trait ClientEventSink: Send + Sync {
    fn send_client_event(&self, channel: &str, event: &str, data: Value) -> bool;

    fn is_connected(&self) -> bool;
}

/// Subscription to one relay channel.
#[derive(Clone)]
pub struct ChannelHandle {
    channel: String,
    hub: Arc<ChannelHub>,
    sink: Arc<dyn ClientEventSink>,
}

impl ChannelHandle {
    pub(crate) fn new(channel: &str, hub: Arc<ChannelHub>, sink: Arc<dyn ClientEventSink>) -> Self {
        Self {
            channel: channel.to_string(),
            hub,
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.channel
    }

    /// Call `callback` whenever `event` arrives on this channel.
    pub fn bind<F>(&self, event: &str, callback: F) -> Binding
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.hub.bind(&self.channel, Some(event), Arc::new(callback))
    }

    /// Call `callback` for every event on this channel.
    pub fn bind_all<F>(&self, callback: F) -> Binding
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.hub.bind(&self.channel, None, Arc::new(callback))
    }

    /// Trigger a client event on this channel.
    ///
    /// Only `client-` events are allowed; the returned flag says whether the relay took it.
    pub fn trigger(&self, event: &str, data: Value) -> Result<bool, RelayError> {
        if !is_client_event(event) {
            return Err(RelayError::InvalidClientEvent(event.to_string()));
        }
        Ok(self.sink.send_client_event(&self.channel, event, data))
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_connected()
    }
}
