//! Bounded pool of relay connections with channel routing, health checks and reconnection.

mod config;
mod connection;
mod manager;
mod metrics;
pub mod transport;

pub use config::{BackoffConfig, PoolConfig};
pub use connection::{ConnectionId, ConnectionMetrics, ConnectionState, health_score};
pub use manager::ConnectionPool;
pub use metrics::PoolMetricsSnapshot;
pub use transport::{Connector, Frame, RelaySocket, TransportError, TransportEvent, WsConnector};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("connection pool exhausted: {max_connections} connection(s) saturated")]
    Exhausted { max_connections: usize },
    #[error("connection pool is closed")]
    Closed,
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("timed out waiting for a connection serving `{channel}`")]
    ConnectTimeout { channel: String },
    #[error("timed out connecting to `{endpoint}`")]
    EndpointTimeout { endpoint: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no relay endpoints configured")]
    NoEndpoints,
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

/// Notification broadcast by the pool to interested callers.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    Connected {
        connection_id: ConnectionId,
        endpoint: String,
    },
    /// A connection came back after failing; its channels need re-subscribing.
    Reconnected {
        connection_id: ConnectionId,
        endpoint: String,
        channels: Vec<String>,
    },
    ConnectionFailed {
        connection_id: ConnectionId,
        endpoint: String,
        error: String,
    },
    /// Reconnect attempts are exhausted; the connection and its channels are gone.
    ConnectionLost {
        connection_id: ConnectionId,
        endpoint: String,
        channels: Vec<String>,
    },
    MetricsUpdated(PoolMetricsSnapshot),
}

/// Text frame received on a pooled connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub connection_id: ConnectionId,
    pub text: String,
}
