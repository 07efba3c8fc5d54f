use serde::Serialize;
use utoipa::ToSchema;

/// Acknowledgement returned by the telemetry sinks.
#[derive(Debug, Serialize, ToSchema)]
pub struct TelemetryAck {
    pub success: bool,
}
