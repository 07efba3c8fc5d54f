use std::time::Duration;

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};

use super::PoolError;

/// Reconnection policy: exponential growth from `initial_delay`, capped at `max_delay`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub initial_delay: Duration,
    pub multiplier: f64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_delay: Duration,
    /// Attempts made before the connection is given up for good.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl BackoffConfig {
    /// Delay to wait before reconnect attempt number `attempt` (starting at 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Limits and timers of the relay connection pool.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub max_connections_per_endpoint: usize,
    /// Channels a connection serves before it is considered saturated.
    pub max_channels_per_connection: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub connection_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub health_check_interval: Duration,
    /// Silence after which a connection is declared failed.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub health_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub metrics_interval: Duration,
    pub backoff: BackoffConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_connections_per_endpoint: 5,
            max_channels_per_connection: 100,
            connection_timeout: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(30),
            health_timeout: Duration::from_secs(60),
            metrics_interval: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Reject configurations the pool cannot operate with.
    pub fn validate(&self) -> Result<(), PoolError> {
        let problem = if self.max_connections == 0 {
            Some("max_connections must be at least 1")
        } else if self.max_connections_per_endpoint == 0 {
            Some("max_connections_per_endpoint must be at least 1")
        } else if self.max_channels_per_connection == 0 {
            Some("max_channels_per_connection must be at least 1")
        } else if self.health_check_interval.is_zero() || self.metrics_interval.is_zero() {
            Some("timer intervals must be non-zero")
        } else if self.backoff.multiplier < 1.0 {
            Some("backoff multiplier must be >= 1")
        } else {
            None
        };

        match problem {
            Some(reason) => Err(PoolError::InvalidConfig(reason.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        let backoff = BackoffConfig {
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
            max_attempts: 10,
        };
        let delays = (1..=5).map(|n| backoff.delay_for(n)).collect::<Vec<_>>();
        assert_eq!(
            delays,
            [100, 200, 400, 500, 500].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn durations_are_read_as_milliseconds() {
        let config: PoolConfig = serde_json::from_str(
            r#"{"max_connections": 3, "connection_timeout": 2500, "backoff": {"max_attempts": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.connection_timeout, Duration::from_millis(2_500));
        assert_eq!(config.backoff.max_attempts, 2);
        assert_eq!(config.backoff.multiplier, 2.0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = PoolConfig {
            max_connections: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
    }
}
