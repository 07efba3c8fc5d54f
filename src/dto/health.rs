use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall status ("ok" or "degraded").
    pub status: String,
    /// Whether the document store answered its health check.
    pub storage: bool,
    /// Whether the cache backend answered a ping; the service works without it.
    pub cache: bool,
    /// Whether the relay currently accepts events.
    pub relay: bool,
}

impl HealthResponse {
    /// Build a response; only storage decides between "ok" and "degraded".
    pub fn new(storage: bool, cache: bool, relay: bool) -> Self {
        Self {
            status: if storage { "ok" } else { "degraded" }.to_string(),
            storage,
            cache,
            relay,
        }
    }
}
