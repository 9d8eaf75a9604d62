//! Redis implementation of [`LockStore`]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use latchkey_core::{LockStore, StoreError};
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError, RedisResult};
use tracing::{info, warn};

use crate::config::RedisConfig;
use crate::scripts::Scripts;

/// Lock store over a shared auto-reconnecting Redis connection
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    scripts: Arc<Scripts>,
    command_timeout: Duration,
}

impl RedisStore {
    /// Open a connection described by `config`
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str()).map_err(classify)?;
        let addr = client.get_connection_info().addr.clone();

        let conn = match tokio::time::timeout(
            config.connect_timeout(),
            ConnectionManager::new(client),
        )
        .await
        {
            Ok(conn) => conn.map_err(classify)?,
            Err(_) => {
                warn!(addr = ?addr, "Timed out connecting to Redis");
                return Err(StoreError::Timeout);
            }
        };

        info!(addr = ?addr, "Connected to Redis");
        Ok(Self {
            conn,
            scripts: Arc::new(Scripts::new()),
            command_timeout: config.command_timeout(),
        })
    }

    /// Bound a command by the configured timeout and map its failure
    async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(op, error = %e, "Redis command failed");
                Err(classify(e))
            }
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.command_timeout.as_millis() as u64,
                    "Redis command timed out"
                );
                Err(StoreError::Timeout)
            }
        }
    }
}

#[async_trait]
impl LockStore for RedisStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX").arg("PX").arg(ttl_ms(ttl));

        let reply: Option<String> = self.run("set_if_absent", cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.scripts.compare_and_swap.prepare_invoke();
        invocation.key(key).arg(expected).arg(new).arg(ttl_ms(ttl));

        let swapped: i64 = self
            .run("compare_and_swap", invocation.invoke_async(&mut conn))
            .await?;
        Ok(swapped == 1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.scripts.compare_and_delete.prepare_invoke();
        invocation.key(key).arg(expected);

        let deleted: i64 = self
            .run("compare_and_delete", invocation.invoke_async(&mut conn))
            .await?;
        Ok(deleted == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);

        let value: Option<String> = self.run("get", cmd.query_async(&mut conn)).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);

        let removed: i64 = self.run("delete", cmd.query_async(&mut conn)).await?;
        Ok(removed > 0)
    }
}

/// `PX` rejects zero, so sub-millisecond TTLs round up
fn ttl_ms(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Map a client error onto the store error taxonomy
pub(crate) fn classify(err: RedisError) -> StoreError {
    if err.is_timeout() {
        return StoreError::Timeout;
    }
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || matches!(
            err.kind(),
            ErrorKind::BusyLoadingError
                | ErrorKind::TryAgain
                | ErrorKind::ClusterDown
                | ErrorKind::MasterDown
        )
    {
        return StoreError::Unavailable(err.to_string());
    }
    StoreError::Backend(err.to_string())
}
