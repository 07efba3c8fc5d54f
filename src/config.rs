//! Application-level configuration, resolved once at startup and shared read-only.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::realtime::pool::PoolConfig;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BEER_OLYMPICS_CONFIG_PATH";
/// Secret used to sign tokens when none is configured. Never acceptable in production.
const DEV_JWT_SECRET: &str = "beer-olympics-dev-secret";
/// Fallback color returned when the palette is exhausted.
const DEFAULT_COLOR: &str = "#ffffff";

/// Deployment flavour; production hides internal error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Development,
    Production,
}

/// How real-time events leave the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeMode {
    /// In-process relay, served to browsers on `/ws`.
    Local,
    /// Hosted relay reached through the connection pool.
    Pooled { endpoints: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CouchSettings {
    pub base_url: String,
    #[serde(default = "default_couch_database")]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_couch_database() -> String {
    "beer_olympics".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloudinarySettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// `ws://` or `wss://` relay URLs; empty selects the local relay.
    pub endpoints: Vec<String>,
    /// Application key appended to relay URLs.
    pub app_key: Option<String>,
    pub pool: PoolConfig,
}

/// Inactivity sweep of rooms.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sweep_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_inactive: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            max_inactive: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub port: u16,
    pub environment: AppEnv,
    pub redis_url: Option<String>,
    pub couch: Option<CouchSettings>,
    pub cloudinary: Option<CloudinarySettings>,
    pub relay: RelaySettings,
    pub rooms: RoomSettings,
    pub jwt_secret: String,
    /// Largest decoded media upload accepted, in bytes.
    pub max_upload_bytes: usize,
    colors: Vec<String>,
}

impl AppConfig {
    /// Load the configuration file, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_file(&resolve_config_path());
        config.apply_overrides(|name| env::var(name).ok().filter(|value| !value.is_empty()));
        if config.environment == AppEnv::Production && config.jwt_secret == DEV_JWT_SECRET {
            warn!("JWT_SECRET is not set; tokens are signed with the development secret");
        }
        config
    }

    fn from_file(path: &PathBuf) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration file");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Apply overrides looked up by variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT")
            .or_else(|| lookup("SERVER_PORT"))
            .and_then(|value| value.parse::<u16>().ok())
        {
            self.port = port;
        }
        match lookup("APP_ENV").as_deref() {
            Some("production") => self.environment = AppEnv::Production,
            Some("development") => self.environment = AppEnv::Development,
            Some(other) => warn!(value = other, "ignoring unknown APP_ENV"),
            None => {}
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis_url = Some(url);
        }
        if let Some(base_url) = lookup("COUCH_BASE_URL") {
            let previous = self.couch.take();
            self.couch = Some(CouchSettings {
                base_url,
                database: previous
                    .as_ref()
                    .map(|couch| couch.database.clone())
                    .unwrap_or_else(default_couch_database),
                username: previous.as_ref().and_then(|couch| couch.username.clone()),
                password: previous.and_then(|couch| couch.password),
            });
        }
        if let Some(couch) = self.couch.as_mut() {
            if let Some(database) = lookup("COUCH_DB") {
                couch.database = database;
            }
            if let Some(username) = lookup("COUCH_USERNAME") {
                couch.username = Some(username);
            }
            if let Some(password) = lookup("COUCH_PASSWORD") {
                couch.password = Some(password);
            }
        }
        if let Some(endpoints) = lookup("RELAY_ENDPOINTS") {
            self.relay.endpoints = endpoints
                .split(',')
                .map(str::trim)
                .filter(|endpoint| !endpoint.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(key) = lookup("RELAY_APP_KEY") {
            self.relay.app_key = Some(key);
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
            lookup("CLOUDINARY_CLOUD_NAME"),
            lookup("CLOUDINARY_API_KEY"),
            lookup("CLOUDINARY_API_SECRET"),
        ) {
            self.cloudinary = Some(CloudinarySettings {
                cloud_name,
                api_key,
                api_secret,
            });
        }
    }

    pub fn realtime_mode(&self) -> RealtimeMode {
        if self.relay.endpoints.is_empty() {
            RealtimeMode::Local
        } else {
            RealtimeMode::Pooled {
                endpoints: self.relay.endpoints.clone(),
            }
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == AppEnv::Production
    }

    /// Return the first palette color not already listed in `used`.
    ///
    /// When every palette entry is taken we fall back to white so callers always receive a
    /// value.
    pub fn first_unused_color(&self, used: &[&str]) -> String {
        self.colors
            .iter()
            .find(|candidate| !used.iter().any(|existing| existing.eq_ignore_ascii_case(candidate)))
            .cloned()
            .unwrap_or_else(|| DEFAULT_COLOR.to_string())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            environment: AppEnv::Development,
            redis_url: None,
            couch: None,
            cloudinary: None,
            relay: RelaySettings::default(),
            rooms: RoomSettings::default(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            colors: default_colors(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: Option<u16>,
    environment: Option<AppEnv>,
    redis_url: Option<String>,
    couch: Option<CouchSettings>,
    cloudinary: Option<CloudinarySettings>,
    relay: RelaySettings,
    rooms: RoomSettings,
    jwt_secret: Option<String>,
    max_upload_bytes: Option<usize>,
    colors: Vec<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            port: raw.port.unwrap_or(defaults.port),
            environment: raw.environment.unwrap_or(defaults.environment),
            redis_url: raw.redis_url,
            couch: raw.couch,
            cloudinary: raw.cloudinary,
            relay: raw.relay,
            rooms: raw.rooms,
            jwt_secret: raw.jwt_secret.unwrap_or(defaults.jwt_secret),
            max_upload_bytes: raw.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
            colors: if raw.colors.is_empty() {
                defaults.colors
            } else {
                raw.colors
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in team palette shipped with the binary.
fn default_colors() -> Vec<String> {
    [
        "#e53935", "#1e88e5", "#43a047", "#fdd835", "#8e24aa", "#fb8c00", "#00acc1", "#d81b60",
        "#6d4c41", "#3949ab", "#7cb342", "#f4511e",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn relay_endpoints_select_the_pooled_mode() {
        let mut config = AppConfig::default();
        assert_eq!(config.realtime_mode(), RealtimeMode::Local);

        config.apply_overrides(lookup(&[(
            "RELAY_ENDPOINTS",
            "wss://ws-eu.relay.example, ,wss://ws-us.relay.example",
        )]));
        assert_eq!(
            config.realtime_mode(),
            RealtimeMode::Pooled {
                endpoints: vec![
                    "wss://ws-eu.relay.example".into(),
                    "wss://ws-us.relay.example".into()
                ]
            }
        );
    }

    #[test]
    fn environment_overrides_file_values() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "port": 3000,
                "couch": {"base_url": "http://couch:5984"},
                "relay": {"pool": {"max_connections": 4, "connection_timeout": 2500}},
                "rooms": {"max_inactive": 1000}
            }"#,
        )
        .unwrap();
        let mut config = AppConfig::from(raw);
        assert_eq!(config.relay.pool.max_connections, 4);
        assert_eq!(config.relay.pool.connection_timeout, Duration::from_millis(2_500));
        assert_eq!(config.rooms.max_inactive, Duration::from_secs(1));

        config.apply_overrides(lookup(&[
            ("SERVER_PORT", "9000"),
            ("APP_ENV", "production"),
            ("COUCH_DB", "olympics"),
            ("JWT_SECRET", "s3cret"),
        ]));

        assert_eq!(config.port, 9000);
        assert!(config.is_production());
        let couch = config.couch.unwrap();
        assert_eq!(couch.base_url, "http://couch:5984");
        assert_eq!(couch.database, "olympics");
        assert_eq!(config.jwt_secret, "s3cret");
    }

    #[test]
    fn cloudinary_needs_all_three_credentials() {
        let mut config = AppConfig::default();
        config.apply_overrides(lookup(&[("CLOUDINARY_CLOUD_NAME", "demo")]));
        assert!(config.cloudinary.is_none());
    }

    #[test]
    fn first_unused_color_skips_taken_entries() {
        let config = AppConfig::default();
        assert_eq!(config.first_unused_color(&[]), "#e53935");
        assert_eq!(config.first_unused_color(&["#E53935"]), "#1e88e5");
    }
}
