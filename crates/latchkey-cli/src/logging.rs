//! Console logging bootstrap
//!
//! Logs go to stderr so stdout stays reserved for command output (tokens,
//! records). `RUST_LOG` overrides the configured level. Records emitted
//! through the `log` facade by dependencies are bridged into `tracing` by
//! `try_init`.

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter);

    Registry::default()
        .with(console_layer)
        .try_init()
        .context("failed to initialize logging")
}
