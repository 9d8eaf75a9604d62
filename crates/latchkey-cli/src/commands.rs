//! Subcommand execution against a configured lock manager

use std::io::Write;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use latchkey_core::{LockError, LockKeeper, LockManager, LockRecord, LockToken, ReleaseOutcome};
use tokio::process::Command as ChildCommand;
use tracing::{info, warn};

use crate::cli::Command;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONTENDED: u8 = 2;
pub const EXIT_LOST: u8 = 3;
/// Conventional status for a process stopped by Ctrl-C
pub const EXIT_INTERRUPTED: u8 = 130;

/// Process exit status for a failed command
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<LockError>() {
        Some(LockError::Contended { .. }) => EXIT_CONTENDED,
        Some(LockError::Lost { .. }) => EXIT_LOST,
        _ => EXIT_FAILURE,
    }
}

/// Execute `command`, writing its output to `out`; returns the exit status
pub async fn execute<W: Write>(
    manager: Arc<LockManager>,
    command: Command,
    out: &mut W,
) -> anyhow::Result<u8> {
    match command {
        Command::Acquire {
            resource,
            ttl_ms,
            wait_ms,
        } => {
            let ttl = ttl_or_default(&manager, ttl_ms);
            let wait = wait_or_default(&manager, wait_ms);
            let token = manager.acquire(&resource, ttl, wait).await?;
            writeln!(out, "{}", serde_json::to_string(&token)?)?;
            Ok(EXIT_OK)
        }
        Command::Renew {
            resource,
            token,
            ttl_ms,
        } => {
            let token = parse_token(&resource, &token)?;
            let ttl = ttl_ms.map(Duration::from_millis).unwrap_or_else(|| token.ttl());
            let renewed = manager.renew(&token, ttl).await?;
            writeln!(out, "{}", serde_json::to_string(&renewed)?)?;
            Ok(EXIT_OK)
        }
        Command::Release { resource, token } => {
            let token = parse_token(&resource, &token)?;
            let outcome = manager.release(token).await;
            writeln!(out, "{}", outcome)?;
            Ok(match outcome {
                ReleaseOutcome::Released | ReleaseOutcome::NotHeld => EXIT_OK,
                ReleaseOutcome::Unconfirmed => EXIT_FAILURE,
            })
        }
        Command::Inspect { resource } => {
            match manager.inspect(&resource).await? {
                Some(record) => {
                    let now = manager.clock().now_millis();
                    writeln!(out, "{}", format_record(&resource, &record, now))?;
                }
                None => writeln!(out, "unlocked")?,
            }
            Ok(EXIT_OK)
        }
        Command::ForceRelease { resource } => {
            let removed = manager.force_release(&resource).await?;
            writeln!(out, "{}", if removed { "removed" } else { "unlocked" })?;
            Ok(EXIT_OK)
        }
        Command::Run {
            resource,
            ttl_ms,
            wait_ms,
            command,
        } => {
            let ttl = ttl_or_default(&manager, ttl_ms);
            let wait = wait_or_default(&manager, wait_ms);
            run_locked(manager, &resource, ttl, wait, &command).await
        }
    }
}

enum Finished {
    Exited(std::io::Result<ExitStatus>),
    LockLost,
    Interrupted,
}

/// Hold `resource` for as long as the child process runs
async fn run_locked(
    manager: Arc<LockManager>,
    resource: &str,
    ttl: Duration,
    wait: Duration,
    argv: &[String],
) -> anyhow::Result<u8> {
    let Some((program, args)) = argv.split_first() else {
        bail!("no command given");
    };

    let token = manager.acquire(resource, ttl, wait).await?;
    let keeper = LockKeeper::spawn(manager.clone(), token);

    let mut child = match ChildCommand::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            keeper.release().await;
            return Err(e).with_context(|| format!("failed to start '{}'", program));
        }
    };
    info!(resource = %resource, program = %program, "Running command under lock");

    let finished = tokio::select! {
        status = child.wait() => Finished::Exited(status),
        _ = keeper.lost() => Finished::LockLost,
        _ = tokio::signal::ctrl_c() => Finished::Interrupted,
    };

    match finished {
        Finished::Exited(status) => {
            let outcome = keeper.release().await;
            info!(resource = %resource, outcome = %outcome, "Command finished, lock released");
            let status = status.context("failed to wait for command")?;
            Ok(status_code(status))
        }
        Finished::LockLost => {
            warn!(resource = %resource, "Lock lost while command was running, killing it");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill command");
            }
            Err(LockError::Lost {
                resource: resource.to_string(),
            }
            .into())
        }
        Finished::Interrupted => {
            warn!(resource = %resource, "Interrupted, stopping command");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill command");
            }
            keeper.release().await;
            Ok(EXIT_INTERRUPTED)
        }
    }
}

fn status_code(status: ExitStatus) -> u8 {
    status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(EXIT_FAILURE)
}

fn ttl_or_default(manager: &LockManager, ttl_ms: Option<u64>) -> Duration {
    ttl_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| manager.config().default_ttl())
}

fn wait_or_default(manager: &LockManager, wait_ms: Option<u64>) -> Duration {
    wait_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| manager.config().default_wait())
}

fn parse_token(resource: &str, raw: &str) -> anyhow::Result<LockToken> {
    let token: LockToken =
        serde_json::from_str(raw).context("--token is not a lock token printed by acquire")?;
    if token.resource() != resource {
        bail!(
            "token was issued for '{}', not '{}'",
            token.resource(),
            resource
        );
    }
    Ok(token)
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

/// Human-readable view of a stored record
pub fn format_record(resource: &str, record: &LockRecord, now: i64) -> String {
    let remaining = if record.is_stale(now, 0) {
        "expired".to_string()
    } else {
        format!("{}ms", record.remaining(now).as_millis())
    };
    format!(
        "resource:    {}\nowner:       {}\nacquired_at: {}\nexpires_at:  {}\nremaining:   {}",
        resource,
        record.owner_token,
        format_millis(record.acquired_at),
        format_millis(record.expires_at),
        remaining
    )
}
