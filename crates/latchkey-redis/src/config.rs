// Redis connection configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Redis store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://:password@host:6379/0`
    #[serde(default = "default_url")]
    pub url: String,
    /// Initial connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on a single command round trip in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_command_timeout_ms() -> u64 {
    2000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379/");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.command_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_builder() {
        let config = RedisConfig::new("redis://cache:6380/1")
            .with_command_timeout(Duration::from_millis(750));
        assert_eq!(config.url, "redis://cache:6380/1");
        assert_eq!(config.command_timeout_ms, 750);
        assert_eq!(config.connect_timeout_ms, 5000);
    }
}
