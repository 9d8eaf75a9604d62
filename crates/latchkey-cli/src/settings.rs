//! Layered configuration: file, then `LATCHKEY__*` environment, then flags

use std::path::Path;

use anyhow::Context;
use config::{Config, Environment, File};
use latchkey_core::LockConfig;
use latchkey_redis::RedisConfig;
use serde::Deserialize;

use crate::cli::Cli;

/// Configuration file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "conf/latchkey.yml";

/// Environment prefix; nested keys use `__`, e.g. `LATCHKEY__LOCK__DEFAULT_TTL_MS`
const ENV_PREFIX: &str = "LATCHKEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub lock: LockConfig,
    pub redis: RedisConfig,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Values given on the command line; they win over every other source
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub redis_url: Option<String>,
    pub namespace: Option<String>,
    pub log_level: Option<String>,
}

impl From<&Cli> for Overrides {
    fn from(cli: &Cli) -> Self {
        Self {
            redis_url: cli.redis_url.clone(),
            namespace: cli.namespace.clone(),
            log_level: cli.log_level.clone(),
        }
    }
}

impl Settings {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        Self::from_sources(cli.config.as_deref(), &Overrides::from(cli))
    }

    /// Build settings from an explicit (required) file or the optional default one
    pub fn from_sources(config_file: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        builder = match config_file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(v) = &overrides.redis_url {
            builder = builder.set_override("redis.url", v.as_str())?;
        }
        if let Some(v) = &overrides.namespace {
            builder = builder.set_override("lock.namespace", v.as_str())?;
        }
        if let Some(v) = &overrides.log_level {
            builder = builder.set_override("log.level", v.as_str())?;
        }

        let settings: Settings = builder
            .build()
            .context("failed to load configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        settings.lock.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yml");

        assert!(Settings::from_sources(Some(&missing), &Overrides::default()).is_err());
    }

    #[test]
    fn test_yaml_file_and_overrides() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "lock:\n  namespace: jobs\n  default_ttl_ms: 10000\n  retry:\n    max_retries: 4\nredis:\n  url: redis://cache:6379/2\n"
        )
        .unwrap();

        let settings = Settings::from_sources(Some(file.path()), &Overrides::default()).unwrap();
        assert_eq!(settings.lock.namespace, "jobs");
        assert_eq!(settings.lock.default_ttl_ms, 10000);
        assert_eq!(settings.lock.retry.max_retries, 4);
        assert_eq!(settings.lock.retry.base_delay_ms, 50);
        assert_eq!(settings.redis.url, "redis://cache:6379/2");
        assert_eq!(settings.redis.command_timeout_ms, 2000);
        assert_eq!(settings.log.level, "warn");

        let overrides = Overrides {
            redis_url: Some("redis://other:6379/".to_string()),
            namespace: Some("reports".to_string()),
            log_level: Some("debug".to_string()),
        };
        let settings = Settings::from_sources(Some(file.path()), &overrides).unwrap();
        assert_eq!(settings.lock.namespace, "reports");
        assert_eq!(settings.redis.url, "redis://other:6379/");
        assert_eq!(settings.log.level, "debug");
        assert_eq!(settings.lock.default_ttl_ms, 10000);
    }

    #[test]
    fn test_invalid_lock_config_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[lock]\ndefault_ttl_ms = 5000\nmax_ttl_ms = 1000\n").unwrap();

        let err = Settings::from_sources(Some(file.path()), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("max_ttl_ms"));
    }
}
