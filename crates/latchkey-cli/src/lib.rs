//! Latchkey CLI - operator commands for distributed locks
//!
//! Loads layered configuration, initializes logging, connects to Redis and
//! runs one subcommand. Library entry points are exposed so the commands can
//! be driven against any [`LockStore`](latchkey_core::LockStore) in tests.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod settings;

use std::sync::Arc;

use anyhow::Context;
use latchkey_core::LockManager;
use latchkey_redis::RedisStore;
use tracing::debug;

pub use cli::{Cli, Command};
pub use commands::{execute, exit_code};
pub use settings::Settings;

/// Run the parsed command line end to end; returns the process exit status
pub async fn run_cli(cli: Cli) -> anyhow::Result<u8> {
    let settings = Settings::load(&cli)?;
    logging::init_logging(&settings.log.level)?;
    debug!(namespace = %settings.lock.namespace, "Configuration loaded");

    let store = RedisStore::connect(&settings.redis)
        .await
        .context("failed to connect to Redis")?;
    let manager = Arc::new(LockManager::new(Arc::new(store), settings.lock)?);

    let mut stdout = std::io::stdout();
    execute(manager, cli.command, &mut stdout).await
}
