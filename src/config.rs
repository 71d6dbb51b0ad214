//! Client configuration: a TOML file, then `LEAD_IMPORT_*` environment
//! overrides (a `.env` file is honoured).

use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use tracing::debug;
use crate::channel::WsConfig;
use crate::core::Result;

pub const DEFAULT_CONFIG_FILE: &str = "lead-import.toml";
pub const ENV_PREFIX: &str = "LEAD_IMPORT_";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub import_endpoint: String,
    pub channel_url: String,
    pub token: Option<String>,
    pub request_timeout_secs: u64,
    pub reconnect: bool,
    /// 0 retries forever
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub ping_interval_ms: Option<u64>,
    /// Unset waits for a stuck job forever
    pub stall_timeout_secs: Option<u64>,
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            import_endpoint: "http://localhost:3000/api/leads/import".to_string(),
            channel_url: "ws://localhost:3000/ws".to_string(),
            token: None,
            request_timeout_secs: 120,
            reconnect: true,
            max_reconnect_attempts: 0,
            reconnect_delay_ms: 1000,
            ping_interval_ms: None,
            stall_timeout_secs: None,
            event_buffer: 256,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let config_str = fs::read_to_string(path)?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Config> {
        Ok(toml::from_str(config_str)?)
    }

    /// Explicit file if given, else `lead-import.toml` when present, else
    /// defaults; environment overrides win over both.
    pub fn resolve(path: Option<&Path>) -> Result<Config> {
        dotenvy::dotenv().ok();

        let config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Config::default(),
        };

        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Unparseable values are skipped
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(endpoint) = var("ENDPOINT") {
            self.import_endpoint = endpoint;
        }
        if let Some(url) = var("CHANNEL_URL") {
            self.channel_url = url;
        }
        if let Some(token) = var("TOKEN") {
            self.token = Some(token);
        }
        if let Some(secs) = var("REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(secs) = var("STALL_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.stall_timeout_secs = Some(secs);
        }
        if let Some(reconnect) = var("RECONNECT").and_then(|v| v.parse().ok()) {
            self.reconnect = reconnect;
        }

        debug!(endpoint = %self.import_endpoint, channel = %self.channel_url, "configuration resolved");
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.import_endpoint = endpoint.into();
        self
    }

    pub fn with_channel_url(mut self, url: impl Into<String>) -> Self {
        self.channel_url = url.into();
        self
    }

    pub fn with_stall_timeout_secs(mut self, secs: u64) -> Self {
        self.stall_timeout_secs = Some(secs);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn ws_config(&self) -> WsConfig {
        let config = WsConfig::new(self.channel_url.clone())
            .reconnect(self.reconnect)
            .max_reconnect_attempts(self.max_reconnect_attempts)
            .reconnect_delay_ms(self.reconnect_delay_ms);

        match self.ping_interval_ms {
            Some(ms) => config.ping_interval_ms(ms),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use super::*;
    use crate::core::ImportError;

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            import_endpoint = "https://crm.example.com/api/leads/import"
            stall_timeout_secs = 90
            "#,
        )
        .unwrap();

        assert_eq!(config.import_endpoint, "https://crm.example.com/api/leads/import");
        assert_eq!(config.stall_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.channel_url, Config::default().channel_url);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let result = Config::parse("request_timeout_secs = \"soon\"");
        assert!(matches!(result, Err(ImportError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "channel_url = \"wss://crm.example.com/ws\"").unwrap();
        writeln!(file, "max_reconnect_attempts = 5").unwrap();

        let config = Config::load(file.path()).unwrap();
        let ws = config.ws_config();
        assert_eq!(ws.url, "wss://crm.example.com/ws");
        assert_eq!(ws.max_reconnect_attempts, 5);
        assert!(ws.reconnect);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = Config::load(Path::new("/does/not/exist/lead-import.toml"));
        assert!(matches!(result, Err(ImportError::Io(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LEAD_IMPORT_ENDPOINT", "http://10.0.0.5/api/leads/import"),
            ("LEAD_IMPORT_TOKEN", "Bearer abc"),
            ("LEAD_IMPORT_STALL_TIMEOUT_SECS", "30"),
            ("LEAD_IMPORT_REQUEST_TIMEOUT_SECS", "not-a-number"),
        ]);

        let config = Config::default().with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.import_endpoint, "http://10.0.0.5/api/leads/import");
        assert_eq!(config.token.as_deref(), Some("Bearer abc"));
        assert_eq!(config.stall_timeout_secs, Some(30));
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn test_zero_stall_timeout_disables_watchdog() {
        let config = Config::default().with_stall_timeout_secs(0);
        assert_eq!(config.stall_timeout(), None);
    }
}
