use std::{
    collections::{HashSet, VecDeque},
    fmt,
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use utoipa::ToSchema;

use super::transport::Frame;

/// Latency samples kept per connection.
const LATENCY_WINDOW: usize = 20;

/// Opaque identifier of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// Traffic counters of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetrics {
    pub messages_in: u64,
    pub messages_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub errors: u32,
    pub last_activity: Instant,
    latency: VecDeque<Duration>,
}

impl ConnectionMetrics {
    pub fn new(now: Instant) -> Self {
        Self {
            messages_in: 0,
            messages_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            errors: 0,
            last_activity: now,
            latency: VecDeque::with_capacity(LATENCY_WINDOW),
        }
    }

    pub fn record_latency(&mut self, sample: Duration) {
        if self.latency.len() == LATENCY_WINDOW {
            self.latency.pop_front();
        }
        self.latency.push_back(sample);
    }

    /// Mean of the retained latency samples.
    pub fn average_latency(&self) -> Option<Duration> {
        if self.latency.is_empty() {
            return None;
        }
        let total: Duration = self.latency.iter().sum();
        Some(total / self.latency.len() as u32)
    }
}

/// Derived reliability indicator in `[0, 1]`.
///
/// Anything not connected scores zero. Reconnect attempts, errors (counted up to five) and
/// latency (up to half a point at five seconds) each subtract from a perfect score.
pub fn health_score(
    state: ConnectionState,
    reconnect_attempts: u32,
    metrics: &ConnectionMetrics,
) -> f64 {
    if state != ConnectionState::Connected {
        return 0.0;
    }
    let latency_ms = metrics
        .average_latency()
        .map(|latency| latency.as_secs_f64() * 1_000.0)
        .unwrap_or(0.0);
    let score = 1.0
        - 0.15 * f64::from(reconnect_attempts)
        - 0.1 * f64::from(metrics.errors.min(5))
        - (latency_ms / 5_000.0).min(0.5);
    score.clamp(0.0, 1.0)
}

/// Pool-owned record of one relay connection.
pub(crate) struct PooledConnection {
    pub id: ConnectionId,
    pub endpoint: String,
    pub state: ConnectionState,
    pub channels: HashSet<String>,
    pub metrics: ConnectionMetrics,
    /// Consecutive failed reconnects; reset once a socket is attached.
    pub reconnect_attempts: u32,
    /// Bumped on every attached socket so stale reader events can be ignored.
    pub generation: u64,
    pub outbound: Option<mpsc::UnboundedSender<Frame>>,
    pub writer: Option<JoinHandle<()>>,
    pub reader: Option<JoinHandle<()>>,
    pub reconnect_task: Option<JoinHandle<()>>,
    pub ping_sent_at: Option<Instant>,
    pub state_tx: watch::Sender<ConnectionState>,
}

impl PooledConnection {
    pub fn new(id: ConnectionId, endpoint: String, now: Instant) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            id,
            endpoint,
            state: ConnectionState::Connecting,
            channels: HashSet::new(),
            metrics: ConnectionMetrics::new(now),
            reconnect_attempts: 0,
            generation: 0,
            outbound: None,
            writer: None,
            reader: None,
            reconnect_task: None,
            ping_sent_at: None,
            state_tx,
        }
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    pub fn health_score(&self) -> f64 {
        health_score(self.state, self.reconnect_attempts, &self.metrics)
    }

    /// Whether new channels may still be placed on this connection.
    pub fn accepts_channels(&self, max_channels: usize) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) && self.channels.len() < max_channels
    }

    /// Drop the socket ends, returning the writer so the caller can await pending sends.
    pub fn detach(&mut self) -> Option<JoinHandle<()>> {
        self.outbound = None;
        self.ping_sent_at = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.writer.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_connections_score() {
        let metrics = ConnectionMetrics::new(Instant::now());
        assert_eq!(health_score(ConnectionState::Failed, 0, &metrics), 0.0);
        assert_eq!(health_score(ConnectionState::Connected, 0, &metrics), 1.0);
    }

    #[test]
    fn attempts_errors_and_latency_lower_the_score() {
        let mut metrics = ConnectionMetrics::new(Instant::now());
        metrics.errors = 9;
        metrics.record_latency(Duration::from_millis(1_000));
        // 1 - 0.15 - 0.5 - 0.2
        let score = health_score(ConnectionState::Connected, 1, &metrics);
        assert!((score - 0.15).abs() < 1e-9);
        assert_eq!(health_score(ConnectionState::Connected, 9, &metrics), 0.0);
    }

    #[test]
    fn latency_window_is_bounded() {
        let mut metrics = ConnectionMetrics::new(Instant::now());
        for _ in 0..LATENCY_WINDOW {
            metrics.record_latency(Duration::from_millis(900));
        }
        metrics.record_latency(Duration::from_millis(100));
        let expected = (Duration::from_millis(900) * (LATENCY_WINDOW as u32 - 1)
            + Duration::from_millis(100))
            / LATENCY_WINDOW as u32;
        assert_eq!(metrics.average_latency(), Some(expected));
    }
}
