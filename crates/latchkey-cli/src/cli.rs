//! Command line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Distributed locks over a shared Redis server
#[derive(Debug, Parser)]
#[command(name = "latchkey", version, about)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON); defaults to conf/latchkey.yml if present
    #[arg(short = 'c', long = "config", env = "LATCHKEY_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long = "redis-url", env = "LATCHKEY_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Lock key namespace
    #[arg(short = 'n', long = "namespace")]
    pub namespace: Option<String>,

    /// Log level filter; RUST_LOG takes precedence
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Acquire a lock and print its token as JSON
    Acquire {
        resource: String,
        /// Lock TTL in milliseconds (default: lock.default_ttl_ms)
        #[arg(long = "ttl-ms")]
        ttl_ms: Option<u64>,
        /// How long to keep retrying while contended (default: lock.default_wait_ms)
        #[arg(long = "wait-ms")]
        wait_ms: Option<u64>,
    },

    /// Extend a held lock and print the renewed token
    Renew {
        resource: String,
        /// Token JSON printed by `acquire` or a previous `renew`
        #[arg(long)]
        token: String,
        #[arg(long = "ttl-ms")]
        ttl_ms: Option<u64>,
    },

    /// Release a held lock
    Release {
        resource: String,
        #[arg(long)]
        token: String,
    },

    /// Show the current holder of a lock
    Inspect { resource: String },

    /// Remove a lock regardless of its owner
    ForceRelease { resource: String },

    /// Run a command while holding a lock, renewing it in the background
    Run {
        resource: String,
        #[arg(long = "ttl-ms")]
        ttl_ms: Option<u64>,
        #[arg(long = "wait-ms")]
        wait_ms: Option<u64>,
        /// Command and arguments, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_trailing_command() {
        let cli = Cli::try_parse_from([
            "latchkey",
            "--namespace",
            "batch",
            "run",
            "nightly-report",
            "--ttl-ms",
            "60000",
            "--",
            "sh",
            "-c",
            "echo hi",
        ])
        .unwrap();

        assert_eq!(cli.namespace.as_deref(), Some("batch"));
        match cli.command {
            Command::Run {
                resource,
                ttl_ms,
                wait_ms,
                command,
            } => {
                assert_eq!(resource, "nightly-report");
                assert_eq!(ttl_ms, Some(60000));
                assert_eq!(wait_ms, None);
                assert_eq!(command, vec!["sh", "-c", "echo hi"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["latchkey", "run", "job-1"]).is_err());
    }

    #[test]
    fn test_release_requires_token() {
        assert!(Cli::try_parse_from(["latchkey", "release", "job-1"]).is_err());
        assert!(
            Cli::try_parse_from(["latchkey", "release", "job-1", "--token", "{}"]).is_ok()
        );
    }
}
