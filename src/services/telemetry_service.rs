use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    dao::cache::keys, dto::telemetry::TelemetryAck, error::ServiceError, state::SharedState,
};

/// Client-side telemetry sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    Logs,
    Errors,
    Metrics,
    Analytics,
}

impl TelemetryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TelemetryKind::Logs => "logs",
            TelemetryKind::Errors => "errors",
            TelemetryKind::Metrics => "metrics",
            TelemetryKind::Analytics => "analytics",
        }
    }

    /// Field every payload of this kind must carry as a non-empty string.
    pub fn required_field(self) -> &'static str {
        match self {
            TelemetryKind::Logs | TelemetryKind::Errors => "message",
            TelemetryKind::Metrics => "name",
            TelemetryKind::Analytics => "event",
        }
    }
}

/// Check the minimal shape of a telemetry payload, log it and bump the per-kind counter.
pub async fn record(
    state: &SharedState,
    kind: TelemetryKind,
    payload: Value,
) -> Result<TelemetryAck, ServiceError> {
    let field = kind.required_field();
    let Some(label) = payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
    else {
        return Err(ServiceError::InvalidInput(format!("Missing required field: {field}")));
    };

    match kind {
        TelemetryKind::Errors => error!(target: "telemetry", kind = kind.as_str(), label, %payload, "client error"),
        TelemetryKind::Logs => match payload.get("level").and_then(Value::as_str) {
            Some("error") => error!(target: "telemetry", kind = kind.as_str(), label, %payload, "client log"),
            Some("warn") => warn!(target: "telemetry", kind = kind.as_str(), label, %payload, "client log"),
            _ => info!(target: "telemetry", kind = kind.as_str(), label, %payload, "client log"),
        },
        TelemetryKind::Metrics | TelemetryKind::Analytics => {
            info!(target: "telemetry", kind = kind.as_str(), label, %payload, "client telemetry")
        }
    }
    state
        .cache()
        .increment_by(&keys::telemetry_counter(kind.as_str()), 1)
        .await;

    Ok(TelemetryAck { success: true })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, clock::ManualClock},
    };

    #[tokio::test]
    async fn payloads_need_the_kind_specific_field() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));

        assert!(matches!(
            record(&state, TelemetryKind::Metrics, json!({ "message": "x" })).await,
            Err(ServiceError::InvalidInput(message)) if message == "Missing required field: name"
        ));
        assert!(matches!(
            record(&state, TelemetryKind::Analytics, json!({ "event": "  " })).await,
            Err(ServiceError::InvalidInput(_))
        ));

        record(&state, TelemetryKind::Logs, json!({ "message": "hi", "level": "warn" }))
            .await
            .unwrap();
        let ack = record(&state, TelemetryKind::Logs, json!({ "message": "again" }))
            .await
            .unwrap();
        assert!(ack.success);
        assert_eq!(
            state.cache().increment_by(&keys::telemetry_counter("logs"), 0).await,
            Some(2)
        );
    }
}
