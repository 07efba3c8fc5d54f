use serde::Serialize;
use utoipa::ToSchema;

use crate::realtime::{RoomType, pool::PoolMetricsSnapshot};

/// One live room.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub room_type: RoomType,
    pub member_count: usize,
}

/// Snapshot of the real-time layer.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeMetricsResponse {
    /// `local` or `pooled`.
    pub mode: String,
    pub relay_connected: bool,
    pub room_count: usize,
    pub rooms: Vec<RoomSummary>,
    /// Connection pool aggregate; absent with the in-process relay.
    pub pool: Option<PoolMetricsSnapshot>,
}
