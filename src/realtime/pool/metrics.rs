use std::{collections::BTreeMap, time::SystemTime};

use serde::Serialize;
use serde_with::{TimestampMilliSeconds, serde_as};
use utoipa::ToSchema;

use super::connection::{ConnectionState, PooledConnection};

/// Pool-wide aggregate refreshed on the metrics interval.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetricsSnapshot {
    pub total_connections: usize,
    pub active_connections: usize,
    pub connecting: usize,
    pub failed: usize,
    pub total_channels: usize,
    pub messages_in: u64,
    pub messages_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Mean latency across connections with samples, in milliseconds.
    pub average_latency_ms: Option<f64>,
    /// Mean health score of all connections; `1.0` for an empty pool.
    pub health_ratio: f64,
    /// Channels served per connection.
    pub channel_distribution: BTreeMap<String, usize>,
    /// Connections opened per endpoint.
    pub endpoint_distribution: BTreeMap<String, usize>,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    #[schema(value_type = i64)]
    pub collected_at: SystemTime,
}

impl PoolMetricsSnapshot {
    pub fn empty(now: SystemTime) -> Self {
        Self {
            total_connections: 0,
            active_connections: 0,
            connecting: 0,
            failed: 0,
            total_channels: 0,
            messages_in: 0,
            messages_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            average_latency_ms: None,
            health_ratio: 1.0,
            channel_distribution: BTreeMap::new(),
            endpoint_distribution: BTreeMap::new(),
            collected_at: now,
        }
    }

    pub(crate) fn collect<'a>(
        connections: impl IntoIterator<Item = &'a PooledConnection>,
        now: SystemTime,
    ) -> Self {
        let mut snapshot = Self::empty(now);
        let mut health_total = 0.0;
        let mut latency_total = 0.0;
        let mut latency_count = 0u32;

        for connection in connections {
            snapshot.total_connections += 1;
            match connection.state {
                ConnectionState::Connected => snapshot.active_connections += 1,
                ConnectionState::Connecting => snapshot.connecting += 1,
                ConnectionState::Failed => snapshot.failed += 1,
                ConnectionState::Disconnected => {}
            }
            let metrics = &connection.metrics;
            snapshot.total_channels += connection.channels.len();
            snapshot.messages_in += metrics.messages_in;
            snapshot.messages_out += metrics.messages_out;
            snapshot.bytes_in += metrics.bytes_in;
            snapshot.bytes_out += metrics.bytes_out;
            if let Some(latency) = metrics.average_latency() {
                latency_total += latency.as_secs_f64() * 1_000.0;
                latency_count += 1;
            }
            health_total += connection.health_score();
            snapshot
                .channel_distribution
                .insert(connection.id.to_string(), connection.channels.len());
            *snapshot
                .endpoint_distribution
                .entry(connection.endpoint.clone())
                .or_default() += 1;
        }

        if snapshot.total_connections > 0 {
            snapshot.health_ratio = health_total / snapshot.total_connections as f64;
        }
        if latency_count > 0 {
            snapshot.average_latency_ms = Some(latency_total / f64::from(latency_count));
        }
        snapshot
    }
}
