use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe every collaborator, logging the ones that fail.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage = match state.require_documents().await {
        Ok(documents) => match documents.store().health_check().await {
            Ok(()) => !state.is_degraded().await,
            Err(err) => {
                warn!(error = %err, "document store health check failed");
                false
            }
        },
        Err(_) => {
            warn!("document store unavailable (degraded mode)");
            false
        }
    };

    let cache = state.cache().is_healthy().await;
    let relay = state.relay().is_connected();

    HealthResponse::new(storage, cache, relay)
}
