use std::time::Duration;

use crate::config::CouchSettings;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters of the CouchDB document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    /// Basic-auth pair; only sent when both halves are configured.
    pub credentials: Option<(String, String)>,
    /// Upper bound for every HTTP call, so a hung server trips the storage supervisor.
    pub request_timeout: Duration,
}

impl From<CouchSettings> for CouchConfig {
    fn from(settings: CouchSettings) -> Self {
        Self {
            base_url: settings.base_url,
            database: settings.database,
            credentials: settings.username.zip(settings.password),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_need_both_halves() {
        let settings = CouchSettings {
            base_url: "http://localhost:5984".into(),
            database: "beer_olympics".into(),
            username: Some("admin".into()),
            password: None,
        };
        let config = CouchConfig::from(settings.clone());
        assert_eq!(config.credentials, None);

        let config = CouchConfig::from(CouchSettings {
            password: Some("secret".into()),
            ..settings
        });
        assert_eq!(config.credentials, Some(("admin".into(), "secret".into())));
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}
