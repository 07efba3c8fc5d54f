//! In-process channel registry: callback bindings plus attached browser sockets.

use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::realtime::protocol::RelayMessage;

/// Callback invoked with the event name and its payload.
pub type EventCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Identifier of a socket attached to the hub.
pub type SocketId = String;

struct BindingEntry {
    id: u64,
    /// `None` listens to every event on the channel.
    event: Option<String>,
    callback: EventCallback,
}

#[derive(Default)]
struct ChannelState {
    bindings: Vec<BindingEntry>,
    sockets: HashMap<SocketId, mpsc::UnboundedSender<String>>,
}

impl ChannelState {
    fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.sockets.is_empty()
    }
}

#[derive(Default)]
pub struct ChannelHub {
    channels: DashMap<String, ChannelState>,
    next_binding: AtomicU64,
}

impl ChannelHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `callback` for `event` (or every event when `None`) on `channel`.
    pub fn bind(self: &Arc<Self>, channel: &str, event: Option<&str>, callback: EventCallback) -> Binding {
        let id = self.next_binding.fetch_add(1, Ordering::Relaxed);
        self.channels
            .entry(channel.to_string())
            .or_default()
            .bindings
            .push(BindingEntry {
                id,
                event: event.map(str::to_string),
                callback,
            });
        Binding {
            hub: Arc::downgrade(self),
            channel: channel.to_string(),
            id,
            active: AtomicBool::new(true),
        }
    }

    fn unbind(&self, channel: &str, id: u64) {
        if let Some(mut state) = self.channels.get_mut(channel) {
            state.bindings.retain(|binding| binding.id != id);
        }
        self.channels.remove_if(channel, |_, state| state.is_empty());
    }

    /// Drop every in-process binding of `channel`, leaving attached sockets alone.
    pub fn remove_bindings(&self, channel: &str) {
        if let Some(mut state) = self.channels.get_mut(channel) {
            state.bindings.clear();
        }
        self.channels.remove_if(channel, |_, state| state.is_empty());
    }

    pub fn attach_socket(&self, channel: &str, socket: &str, sender: mpsc::UnboundedSender<String>) {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .sockets
            .insert(socket.to_string(), sender);
    }

    pub fn detach_socket(&self, channel: &str, socket: &str) -> bool {
        let removed = self
            .channels
            .get_mut(channel)
            .is_some_and(|mut state| state.sockets.remove(socket).is_some());
        self.channels.remove_if(channel, |_, state| state.is_empty());
        removed
    }

    /// Detach `socket` from every channel, returning how many it left.
    pub fn detach_everywhere(&self, socket: &str) -> usize {
        let channels = self
            .channels
            .iter()
            .filter(|entry| entry.sockets.contains_key(socket))
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        channels
            .iter()
            .filter(|channel| self.detach_socket(channel, socket))
            .count()
    }

    /// Deliver an event to matching bindings and attached sockets, skipping `origin`.
    ///
    /// Returns the number of receivers reached.
    pub fn dispatch(&self, channel: &str, event: &str, data: &Value, origin: Option<&str>) -> usize {
        let (callbacks, sockets) = match self.channels.get(channel) {
            Some(state) => (
                state
                    .bindings
                    .iter()
                    .filter(|binding| binding.event.as_deref().is_none_or(|name| name == event))
                    .map(|binding| binding.callback.clone())
                    .collect::<Vec<_>>(),
                state
                    .sockets
                    .iter()
                    .filter(|(socket, _)| Some(socket.as_str()) != origin)
                    .map(|(_, sender)| sender.clone())
                    .collect::<Vec<_>>(),
            ),
            None => return 0,
        };

        for callback in &callbacks {
            callback(event, data);
        }

        let frame = RelayMessage::Event {
            channel: channel.to_string(),
            event: event.to_string(),
            data: data.clone(),
        }
        .encode();
        let delivered_sockets = sockets
            .iter()
            .filter(|sender| sender.send(frame.clone()).is_ok())
            .count();

        callbacks.len() + delivered_sockets
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn clear(&self) {
        self.channels.clear();
    }
}

/// Handle returned by [`ChannelHub::bind`]; unbinding twice is harmless.
pub struct Binding {
    hub: Weak<ChannelHub>,
    channel: String,
    id: u64,
    active: AtomicBool,
}

impl Binding {
    pub fn unbind(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            hub.unbind(&self.channel, self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
