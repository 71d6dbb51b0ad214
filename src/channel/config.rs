use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsConfig {
    pub url: String,
    pub reconnect: bool,
    /// 0 retries forever
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub ping_interval_ms: Option<u64>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/ws".to_string(),
            reconnect: true,
            max_reconnect_attempts: 0,
            reconnect_delay_ms: 1000,
            ping_interval_ms: None,
        }
    }
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    pub fn max_reconnect_attempts(mut self, max: u32) -> Self {
        self.max_reconnect_attempts = max;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }

    pub fn ping_interval_ms(mut self, ms: u64) -> Self {
        self.ping_interval_ms = Some(ms);
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Whether another attempt is allowed after `attempts` consecutive failures.
    pub fn may_retry(&self, attempts: u32) -> bool {
        self.reconnect && (self.max_reconnect_attempts == 0 || attempts <= self.max_reconnect_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let cfg = WsConfig::default();
        assert_eq!(cfg.url, "ws://localhost:3000/ws");
        assert!(cfg.reconnect);
        assert_eq!(cfg.max_reconnect_attempts, 0);
        assert_eq!(cfg.reconnect_delay(), Duration::from_secs(1));
        assert!(cfg.ping_interval_ms.is_none());
    }

    #[test]
    fn test_builder() {
        let cfg = WsConfig::new("wss://crm.example.com/ws")
            .reconnect(false)
            .max_reconnect_attempts(3)
            .reconnect_delay_ms(500)
            .ping_interval_ms(25000);

        assert_eq!(cfg.url, "wss://crm.example.com/ws");
        assert!(!cfg.reconnect);
        assert_eq!(cfg.max_reconnect_attempts, 3);
        assert_eq!(cfg.reconnect_delay_ms, 500);
        assert_eq!(cfg.ping_interval_ms, Some(25000));
    }

    #[test]
    fn test_may_retry() {
        let unlimited = WsConfig::default();
        assert!(unlimited.may_retry(1_000));

        let limited = WsConfig::default().max_reconnect_attempts(2);
        assert!(limited.may_retry(1));
        assert!(limited.may_retry(2));
        assert!(!limited.may_retry(3));

        let disabled = WsConfig::default().reconnect(false);
        assert!(!disabled.may_retry(1));
    }
}
