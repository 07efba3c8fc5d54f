use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex as StdMutex, RwLock, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval, sleep, timeout},
};
use tracing::{debug, error, info, warn};

use super::{
    InboundFrame, PoolError, PoolEvent,
    config::PoolConfig,
    connection::{ConnectionId, ConnectionState, PooledConnection},
    metrics::PoolMetricsSnapshot,
    transport::{Connector, Frame, RelaySocket, TransportEvent},
};

const EVENT_BUFFER: usize = 64;
const FRAME_BUFFER: usize = 1_024;

/// Shared handle to the relay connection pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    endpoints: Vec<String>,
    connector: Arc<dyn Connector>,
    connections: DashMap<ConnectionId, PooledConnection>,
    channel_index: DashMap<String, ConnectionId>,
    /// Serialises placement decisions so capacity checks and inserts are atomic.
    allocation: Mutex<()>,
    events: broadcast::Sender<PoolEvent>,
    frames: broadcast::Sender<InboundFrame>,
    snapshot: RwLock<PoolMetricsSnapshot>,
    timers: StdMutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl ConnectionPool {
    /// Build an idle pool; call [`ConnectionPool::start`] to run health checks and metrics.
    pub fn new(
        config: PoolConfig,
        endpoints: Vec<String>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        if endpoints.is_empty() {
            return Err(PoolError::NoEndpoints);
        }
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (frames, _) = broadcast::channel(FRAME_BUFFER);

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                endpoints,
                connector,
                connections: DashMap::new(),
                channel_index: DashMap::new(),
                allocation: Mutex::new(()),
                events,
                frames,
                snapshot: RwLock::new(PoolMetricsSnapshot::empty(SystemTime::now())),
                timers: StdMutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Spawn the health-check and metrics loops. Calling it again is a no-op.
    pub fn start(&self) {
        let mut timers = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !timers.is_empty() || self.inner.is_closed() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        timers.push(tokio::spawn(health_loop(
            weak.clone(),
            self.inner.config.health_check_interval,
        )));
        timers.push(tokio::spawn(metrics_loop(
            weak,
            self.inner.config.metrics_interval,
        )));
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }

    /// Text frames received on any connection.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<InboundFrame> {
        self.inner.frames.subscribe()
    }

    /// Return the connection serving `channel`, placing the channel on a connection first if
    /// needed.
    ///
    /// Reuses the least loaded unsaturated connection, otherwise opens one on the least loaded
    /// endpoint. May wait up to the connection timeout for an in-flight connect.
    pub async fn get_connection_for_channel(&self, channel: &str) -> Result<ConnectionId, PoolError> {
        let inner = &self.inner;
        inner.ensure_open()?;
        if let Some(id) = inner.lookup(channel) {
            return inner.await_ready(id, channel).await;
        }

        let guard = inner.allocation.lock().await;
        inner.ensure_open()?;
        if let Some(id) = inner.lookup(channel) {
            drop(guard);
            return inner.await_ready(id, channel).await;
        }

        if let Some(id) = inner.reusable_connection() {
            inner.assign(id, channel);
            drop(guard);
            return inner.await_ready(id, channel).await;
        }

        let max_connections = inner.config.max_connections;
        if inner.connections.len() >= max_connections {
            return Err(PoolError::Exhausted { max_connections });
        }
        let Some(endpoint) = inner.select_endpoint() else {
            return Err(PoolError::Exhausted { max_connections });
        };
        let id = inner.open(endpoint);
        inner.assign(id, channel);
        drop(guard);

        if let Err(err) = inner.establish(id, false).await {
            match err {
                PoolError::Closed | PoolError::UnknownConnection(_) => return Err(err),
                err => {
                    warn!(connection = %id, channel, error = %err, "relay connect failed; scheduling reconnect");
                    inner.schedule_reconnect(id);
                }
            }
        }
        Ok(id)
    }

    /// Queue a text frame on `connection`.
    ///
    /// Returns `false` without blocking when the connection is unknown or not connected; the
    /// message is dropped and the caller may retry.
    pub fn send_message(&self, connection: ConnectionId, message: impl Into<String>) -> bool {
        self.inner.send_message(connection, message.into())
    }

    /// Queue a text frame on whichever connection serves `channel`.
    pub fn send_to_channel(&self, channel: &str, message: impl Into<String>) -> bool {
        match self.inner.lookup(channel) {
            Some(id) => self.inner.send_message(id, message.into()),
            None => false,
        }
    }

    /// Queue a text frame on the least loaded live connection without routing any channel to it.
    ///
    /// Returns `false` when no connection is live.
    pub fn send_unrouted(&self, message: impl Into<String>) -> bool {
        match self.inner.live_connection() {
            Some(id) => self.inner.send_message(id, message.into()),
            None => false,
        }
    }

    /// Stop routing `channel`; returns whether it was mapped.
    pub fn release_channel(&self, channel: &str) -> bool {
        let Some((_, id)) = self.inner.channel_index.remove(channel) else {
            return false;
        };
        if let Some(mut connection) = self.inner.connections.get_mut(&id) {
            connection.channels.remove(channel);
        }
        true
    }

    pub fn connection_for(&self, channel: &str) -> Option<ConnectionId> {
        self.inner.lookup(channel)
    }

    pub fn connection_state(&self, connection: ConnectionId) -> Option<ConnectionState> {
        self.inner.connections.get(&connection).map(|c| c.state)
    }

    pub fn health_score(&self, connection: ConnectionId) -> Option<f64> {
        self.inner
            .connections
            .get(&connection)
            .map(|c| c.health_score())
    }

    /// Channels currently routed to `connection`, sorted.
    pub fn channels_of(&self, connection: ConnectionId) -> Vec<String> {
        self.inner
            .connections
            .get(&connection)
            .map(|c| sorted(c.channels.iter().cloned()))
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Whether at least one connection is live.
    pub fn is_connected(&self) -> bool {
        self.inner
            .connections
            .iter()
            .any(|c| c.state == ConnectionState::Connected)
    }

    /// Last snapshot produced by the metrics loop.
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Aggregate a fresh snapshot immediately and store it.
    pub fn refresh_metrics(&self) -> PoolMetricsSnapshot {
        self.inner.refresh_metrics()
    }

    /// Shut the pool down: stop timers, drop sockets and wait for queued frames to flush.
    ///
    /// Idempotent.
    pub async fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let timers = std::mem::take(
            &mut *inner
                .timers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for timer in timers {
            timer.abort();
        }

        // Waits out any allocation that passed its open check before the flag flipped.
        let guard = inner.allocation.lock().await;
        let ids = inner
            .connections
            .iter()
            .map(|entry| *entry.key())
            .collect::<Vec<_>>();
        let mut writers = Vec::new();
        for id in ids {
            if let Some((_, mut connection)) = inner.connections.remove(&id) {
                if let Some(task) = connection.reconnect_task.take() {
                    task.abort();
                }
                writers.extend(connection.detach());
                connection.set_state(ConnectionState::Disconnected);
            }
        }
        inner.channel_index.clear();
        drop(guard);

        for writer in writers {
            if timeout(inner.config.connection_timeout, writer).await.is_err() {
                warn!("relay writer did not flush before shutdown timeout");
            }
        }
        info!("relay connection pool closed");
    }
}

impl PoolInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), PoolError> {
        if self.is_closed() {
            Err(PoolError::Closed)
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: PoolEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn lookup(&self, channel: &str) -> Option<ConnectionId> {
        self.channel_index.get(channel).map(|entry| *entry.value())
    }

    fn assign(&self, id: ConnectionId, channel: &str) {
        self.channel_index.insert(channel.to_string(), id);
        if let Some(mut connection) = self.connections.get_mut(&id) {
            connection.channels.insert(channel.to_string());
        }
    }

    fn open(&self, endpoint: String) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(connection = %id, %endpoint, "opening relay connection");
        self.connections
            .insert(id, PooledConnection::new(id, endpoint, Instant::now()));
        id
    }

    /// Least loaded connection that still has room, preferring live ones and low latency.
    fn reusable_connection(&self) -> Option<ConnectionId> {
        let max_channels = self.config.max_channels_per_connection;
        self.connections
            .iter()
            .filter(|c| c.accepts_channels(max_channels))
            .min_by_key(|c| {
                (
                    c.state != ConnectionState::Connected,
                    c.channels.len(),
                    c.metrics.average_latency().unwrap_or(Duration::ZERO),
                    c.id,
                )
            })
            .map(|c| c.id)
    }

    fn live_connection(&self) -> Option<ConnectionId> {
        self.connections
            .iter()
            .filter(|c| c.state == ConnectionState::Connected)
            .min_by_key(|c| (c.channels.len(), c.id))
            .map(|c| c.id)
    }

    /// Endpoint with the fewest connections below its cap; ties go to the lowest latency.
    fn select_endpoint(&self) -> Option<String> {
        let mut load: HashMap<String, (usize, Duration, u32)> = HashMap::new();
        for connection in self.connections.iter() {
            let entry = load.entry(connection.endpoint.clone()).or_default();
            entry.0 += 1;
            if let Some(latency) = connection.metrics.average_latency() {
                entry.1 += latency;
                entry.2 += 1;
            }
        }

        self.endpoints
            .iter()
            .map(|endpoint| {
                let (count, total, samples) = load.get(endpoint).copied().unwrap_or_default();
                let latency = if samples == 0 { Duration::ZERO } else { total / samples };
                (endpoint, count, latency)
            })
            .filter(|(_, count, _)| *count < self.config.max_connections_per_endpoint)
            .min_by_key(|(_, count, latency)| (*count, *latency))
            .map(|(endpoint, _, _)| endpoint.clone())
    }

    async fn await_ready(&self, id: ConnectionId, channel: &str) -> Result<ConnectionId, PoolError> {
        let Some(mut state) = self.connections.get(&id).map(|c| c.state_tx.subscribe()) else {
            return Err(PoolError::UnknownConnection(id));
        };
        let ready = timeout(
            self.config.connection_timeout,
            state.wait_for(|state| *state != ConnectionState::Connecting),
        )
        .await;
        match ready {
            Ok(Ok(_)) => Ok(id),
            Ok(Err(_)) => Err(PoolError::UnknownConnection(id)),
            Err(_) => Err(PoolError::ConnectTimeout {
                channel: channel.to_string(),
            }),
        }
    }

    /// Dial the connection's endpoint and attach the socket on success.
    async fn establish(self: &Arc<Self>, id: ConnectionId, reconnect: bool) -> Result<(), PoolError> {
        let Some(endpoint) = self.connections.get(&id).map(|c| c.endpoint.clone()) else {
            return Err(PoolError::UnknownConnection(id));
        };

        let socket = match timeout(self.config.connection_timeout, self.connector.connect(&endpoint)).await
        {
            Ok(Ok(socket)) => socket,
            Ok(Err(err)) => {
                self.connect_failed(id, &endpoint, err.to_string());
                return Err(err.into());
            }
            Err(_) => {
                self.connect_failed(id, &endpoint, "connect timed out".to_string());
                return Err(PoolError::EndpointTimeout { endpoint });
            }
        };

        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let Some(channels) = self.attach(id, socket) else {
            return Err(PoolError::UnknownConnection(id));
        };

        if reconnect {
            info!(connection = %id, %endpoint, channels = channels.len(), "relay connection restored");
            self.emit(PoolEvent::Reconnected {
                connection_id: id,
                endpoint,
                channels,
            });
        } else {
            info!(connection = %id, %endpoint, "relay connection established");
            self.emit(PoolEvent::Connected {
                connection_id: id,
                endpoint,
            });
        }
        Ok(())
    }

    fn connect_failed(&self, id: ConnectionId, endpoint: &str, error: String) {
        if let Some(mut connection) = self.connections.get_mut(&id) {
            connection.metrics.errors += 1;
            connection.set_state(ConnectionState::Failed);
        }
        warn!(connection = %id, endpoint, error = %error, "relay connect failed");
        self.emit(PoolEvent::ConnectionFailed {
            connection_id: id,
            endpoint: endpoint.to_string(),
            error,
        });
    }

    /// Install a fresh socket, returning the connection's channels.
    fn attach(self: &Arc<Self>, id: ConnectionId, socket: RelaySocket) -> Option<Vec<String>> {
        let RelaySocket {
            outbound,
            mut inbound,
            writer,
        } = socket;
        let mut connection = self.connections.get_mut(&id)?;
        connection.generation += 1;
        let generation = connection.generation;

        let pool = Arc::downgrade(self);
        let reader = tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                let Some(pool) = pool.upgrade() else {
                    return;
                };
                let closed = matches!(event, TransportEvent::Closed { .. });
                pool.on_transport_event(id, generation, event);
                if closed {
                    return;
                }
            }
            if let Some(pool) = pool.upgrade() {
                pool.on_transport_event(id, generation, TransportEvent::Closed { reason: None });
            }
        });

        connection.outbound = Some(outbound);
        connection.writer = Some(writer);
        connection.reader = Some(reader);
        connection.reconnect_attempts = 0;
        connection.metrics.last_activity = Instant::now();
        connection.set_state(ConnectionState::Connected);
        Some(sorted(connection.channels.iter().cloned()))
    }

    fn on_transport_event(self: &Arc<Self>, id: ConnectionId, generation: u64, event: TransportEvent) {
        let mut text_frame = None;
        {
            let Some(mut connection) = self.connections.get_mut(&id) else {
                return;
            };
            if connection.generation != generation {
                return;
            }
            let now = Instant::now();
            match event {
                TransportEvent::Frame(Frame::Text(text)) => {
                    connection.metrics.messages_in += 1;
                    connection.metrics.bytes_in += text.len() as u64;
                    connection.metrics.last_activity = now;
                    text_frame = Some(text);
                }
                TransportEvent::Frame(Frame::Pong) => {
                    connection.metrics.last_activity = now;
                    if let Some(sent) = connection.ping_sent_at.take() {
                        connection.metrics.record_latency(now.duration_since(sent));
                    }
                }
                TransportEvent::Frame(Frame::Ping) => {
                    connection.metrics.last_activity = now;
                    if let Some(outbound) = &connection.outbound {
                        let _ = outbound.send(Frame::Pong);
                    }
                }
                TransportEvent::Closed { reason } => {
                    if connection.state != ConnectionState::Connected {
                        return;
                    }
                    let endpoint = connection.endpoint.clone();
                    drop(connection.detach());
                    connection.set_state(ConnectionState::Disconnected);
                    drop(connection);

                    let error = reason.unwrap_or_else(|| "socket closed".to_string());
                    warn!(connection = %id, %endpoint, %error, "relay connection dropped");
                    self.emit(PoolEvent::ConnectionFailed {
                        connection_id: id,
                        endpoint,
                        error,
                    });
                    self.schedule_reconnect(id);
                    return;
                }
            }
        }

        if let Some(text) = text_frame {
            let _ = self.frames.send(InboundFrame {
                connection_id: id,
                text,
            });
        }
    }

    fn send_message(&self, id: ConnectionId, message: String) -> bool {
        let Some(mut connection) = self.connections.get_mut(&id) else {
            return false;
        };
        if connection.state != ConnectionState::Connected {
            return false;
        }
        let bytes = message.len() as u64;
        let sent = connection
            .outbound
            .as_ref()
            .is_some_and(|outbound| outbound.send(Frame::Text(message)).is_ok());
        if sent {
            connection.metrics.messages_out += 1;
            connection.metrics.bytes_out += bytes;
        } else {
            connection.metrics.errors += 1;
        }
        sent
    }

    /// Ping live connections and fail the ones that stayed silent too long.
    fn check_health(self: &Arc<Self>) {
        let now = Instant::now();
        let mut stale = Vec::new();
        for mut connection in self.connections.iter_mut() {
            if connection.state != ConnectionState::Connected {
                continue;
            }
            let silent_for = now.duration_since(connection.metrics.last_activity);
            if silent_for > self.config.health_timeout {
                stale.push((connection.id, connection.endpoint.clone(), silent_for));
                continue;
            }
            let pinged = connection
                .outbound
                .as_ref()
                .is_some_and(|outbound| outbound.send(Frame::Ping).is_ok());
            if pinged {
                connection.ping_sent_at = Some(now);
            }
        }

        for (id, endpoint, silent_for) in stale {
            if let Some(mut connection) = self.connections.get_mut(&id) {
                drop(connection.detach());
                connection.metrics.errors += 1;
                connection.set_state(ConnectionState::Failed);
            }
            warn!(connection = %id, %endpoint, ?silent_for, "relay connection failed health check");
            self.emit(PoolEvent::ConnectionFailed {
                connection_id: id,
                endpoint,
                error: format!("no activity for {}ms", silent_for.as_millis()),
            });
            self.schedule_reconnect(id);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, id: ConnectionId) {
        if self.is_closed() {
            return;
        }
        let Some(mut connection) = self.connections.get_mut(&id) else {
            return;
        };
        if connection
            .reconnect_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            return;
        }
        connection.reconnect_task = Some(tokio::spawn(reconnect_loop(Arc::downgrade(self), id)));
    }

    /// Drop a connection whose reconnect budget is spent.
    fn give_up(&self, id: ConnectionId) {
        let Some((_, mut connection)) = self.connections.remove(&id) else {
            return;
        };
        drop(connection.detach());
        connection.set_state(ConnectionState::Failed);
        for channel in &connection.channels {
            self.channel_index.remove_if(channel, |_, owner| *owner == id);
        }
        let channels = sorted(connection.channels.iter().cloned());
        error!(
            connection = %id,
            endpoint = %connection.endpoint,
            channels = channels.len(),
            "relay connection lost after exhausting reconnect attempts"
        );
        self.emit(PoolEvent::ConnectionLost {
            connection_id: id,
            endpoint: connection.endpoint.clone(),
            channels,
        });
    }

    fn refresh_metrics(&self) -> PoolMetricsSnapshot {
        let guards = self.connections.iter().collect::<Vec<_>>();
        let snapshot = PoolMetricsSnapshot::collect(
            guards.iter().map(|guard| guard.value()),
            SystemTime::now(),
        );
        drop(guards);
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot.clone();
        snapshot
    }
}

async fn reconnect_loop(pool: Weak<PoolInner>, id: ConnectionId) {
    loop {
        let (attempt, delay) = {
            let Some(pool) = pool.upgrade() else {
                return;
            };
            if pool.is_closed() {
                return;
            }
            let Some(mut connection) = pool.connections.get_mut(&id) else {
                return;
            };
            connection.reconnect_attempts += 1;
            let attempt = connection.reconnect_attempts;
            if attempt > pool.config.backoff.max_attempts {
                drop(connection);
                pool.give_up(id);
                return;
            }
            (attempt, pool.config.backoff.delay_for(attempt))
        };

        debug!(connection = %id, attempt, ?delay, "scheduling relay reconnect");
        sleep(delay).await;

        let Some(pool) = pool.upgrade() else {
            return;
        };
        match pool.connections.get_mut(&id) {
            Some(mut connection) => connection.set_state(ConnectionState::Connecting),
            None => return,
        }
        match pool.establish(id, true).await {
            Ok(()) => {
                if let Some(mut connection) = pool.connections.get_mut(&id) {
                    connection.reconnect_task = None;
                }
                return;
            }
            Err(PoolError::Closed | PoolError::UnknownConnection(_)) => return,
            Err(err) => debug!(connection = %id, attempt, error = %err, "relay reconnect attempt failed"),
        }
    }
}

async fn health_loop(pool: Weak<PoolInner>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(pool) = pool.upgrade() else {
            return;
        };
        pool.check_health();
    }
}

async fn metrics_loop(pool: Weak<PoolInner>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(pool) = pool.upgrade() else {
            return;
        };
        let snapshot = pool.refresh_metrics();
        pool.emit(PoolEvent::MetricsUpdated(snapshot));
    }
}

fn sorted(channels: impl Iterator<Item = String>) -> Vec<String> {
    let mut channels = channels.collect::<Vec<_>>();
    channels.sort();
    channels
}
