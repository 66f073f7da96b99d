//! Broker-backed queue on a redis list.
//!
//! Producers `RPUSH` onto `<key>`. The consumer moves payloads one by one
//! onto `<key>:processing` and trims exactly those entries once the batch
//! applied. A batch that fails is moved to `<key>:failed` for inspection
//! instead of being retried here. Payloads left in the processing list, by a
//! crashed consumer or by a batch interrupted by a redis error, are put back
//! at the head of the queue before anything new is taken.
//!
//! One consumer per key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use issue_index_core::{Error, IndexerData, Indexer, Result};

use crate::{Dispatcher, Queue, QueueOptions};

const ACCUMULATE_POLL: Duration = Duration::from_millis(50);

/// Turns the indexer connection string into a redis URL.
///
/// Accepts either a `redis://`/`rediss://`/`unix://` URL or whitespace
/// separated pairs: `addrs=host:port[,host:port...] password=secret db=0`.
/// Only the first address is used.
pub fn redis_url(conn_str: &str) -> Result<String> {
    let conn_str = conn_str.trim();
    if ["redis://", "rediss://", "unix://"].iter().any(|scheme| conn_str.starts_with(scheme)) {
        return Ok(conn_str.to_string());
    }
    let mut addrs = None;
    let mut password = None;
    let mut db = 0i64;
    for field in conn_str.split_whitespace() {
        let Some((key, value)) = field.split_once('=') else { continue };
        match key.to_ascii_lowercase().as_str() {
            "addrs" => addrs = Some(value),
            "password" => password = Some(value),
            "db" => {
                db = value
                    .parse()
                    .map_err(|_| Error::InvalidConfig(format!("redis db index '{}' is not a number", value)))?
            }
            _ => {}
        }
    }
    let mut candidates = addrs.unwrap_or_default().split(',').map(str::trim).filter(|a| !a.is_empty());
    let addr = candidates
        .next()
        .ok_or_else(|| Error::InvalidConfig(format!("redis connection string '{}' has no addrs", conn_str)))?;
    if candidates.next().is_some() {
        tracing::warn!(addr, "several redis addresses configured, connecting to the first one only");
    }
    let auth = password.filter(|p| !p.is_empty()).map(|p| format!(":{}@", p)).unwrap_or_default();
    Ok(format!("redis://{}{}/{}", auth, addr, db))
}

fn redis_err(context: &str, e: redis::RedisError) -> Error { Error::Queue(format!("{}: {}", context, e)) }

pub struct RedisQueue {
    connection: ConnectionManager,
    key: String,
    processing_key: String,
    failed_key: String,
    dispatcher: Dispatcher,
    options: QueueOptions,
}

impl RedisQueue {
    pub async fn connect(url: &str, key: &str, indexer: Arc<dyn Indexer>, options: QueueOptions) -> Result<Self> {
        let client = Client::open(url).map_err(|e| Error::InvalidConfig(format!("Failed to create Redis client: {}", e)))?;
        let connection = ConnectionManager::new(client).await.map_err(|e| redis_err("Failed to connect to Redis", e))?;

        let mut test_conn = connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut test_conn)
            .await
            .map_err(|e| redis_err("Redis connection test failed", e))?;

        Ok(Self {
            connection,
            key: key.to_string(),
            processing_key: format!("{}:processing", key),
            failed_key: format!("{}:failed", key),
            dispatcher: Dispatcher::new(indexer),
            options,
        })
    }

    async fn move_one(&self, from: &str, to: &str, from_side: &str, to_side: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        redis::cmd("LMOVE")
            .arg(from)
            .arg(to)
            .arg(from_side)
            .arg(to_side)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| redis_err("LMOVE failed", e))
    }

    async fn take(&self) -> Result<Option<String>> {
        self.move_one(&self.key, &self.processing_key, "LEFT", "RIGHT").await
    }

    /// Puts payloads a previous consumer never acknowledged back in front.
    async fn requeue_unacked(&self) -> Result<usize> {
        let mut moved = 0;
        while self.move_one(&self.processing_key, &self.key, "RIGHT", "LEFT").await?.is_some() {
            moved += 1;
        }
        Ok(moved)
    }

    /// Drops the `count` newest entries of the processing list, which are
    /// the batch just applied.
    async fn ack(&self, count: usize) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("LTRIM")
            .arg(&self.processing_key)
            .arg(0)
            .arg(-(count as i64) - 1)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_err("Failed to acknowledge batch", e))
    }

    /// Moves the `count` newest processing entries to the head of the
    /// dead-letter list, keeping their order.
    async fn dead_letter(&self, count: usize) -> Result<usize> {
        let mut moved = 0;
        while moved < count && self.move_one(&self.processing_key, &self.failed_key, "RIGHT", "LEFT").await?.is_some() {
            moved += 1;
        }
        Ok(moved)
    }

    async fn len(&self, key: &str) -> Result<usize> {
        let mut conn = self.connection.clone();
        redis::cmd("LLEN")
            .arg(key)
            .query_async::<_, usize>(&mut conn)
            .await
            .map_err(|e| redis_err("LLEN failed", e))
    }

    /// Collects up to `batch_size` payloads, waiting at most `flush_interval`
    /// after the first one.
    async fn accumulate(&self, first: String, shutdown: &CancellationToken) -> Result<Vec<String>> {
        let mut raw = vec![first];
        let deadline = Instant::now() + self.options.flush_interval;
        while raw.len() < self.options.batch_size && !shutdown.is_cancelled() {
            match self.take().await? {
                Some(item) => raw.push(item),
                None => {
                    let now = Instant::now();
                    if now >= deadline { break; }
                    sleep(ACCUMULATE_POLL.min(deadline - now)).await;
                }
            }
        }
        Ok(raw)
    }

    /// Accumulates a batch starting with `first`, applies it, then
    /// acknowledges or dead-letters it.
    async fn consume(&self, first: String, shutdown: &CancellationToken) -> Result<()> {
        let raw = self.accumulate(first, shutdown).await?;
        let size = raw.len();
        let mut batch = Vec::with_capacity(size);
        for item in &raw {
            match serde_json::from_str::<IndexerData>(item) {
                Ok(data) => batch.push(data),
                Err(e) => tracing::error!(error = %e, "skipping undecodable redis payload"),
            }
        }
        match self.dispatcher.apply(batch).await {
            Ok(()) => {
                self.ack(size).await?;
                tracing::debug!(size, "applied issue index batch");
            }
            Err(e) => {
                let moved = self.dead_letter(size).await?;
                tracing::error!(size, moved, failed_key = %self.failed_key, error = %e, "issue index batch failed, moved to dead-letter list");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn push(&self, data: IndexerData) -> Result<()> {
        let payload = serde_json::to_string(&data)?;
        let mut conn = self.connection.clone();
        redis::cmd("RPUSH")
            .arg(&self.key)
            .arg(payload)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| redis_err("RPUSH failed", e))?;
        Ok(())
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let requeued = self.requeue_unacked().await?;
        tracing::info!(key = %self.key, requeued, "redis issue queue started");
        let mut unacked = false;
        loop {
            if shutdown.is_cancelled() { break; }
            if unacked {
                match self.requeue_unacked().await {
                    Ok(requeued) => {
                        unacked = false;
                        tracing::warn!(requeued, "returned interrupted batch to the redis issue queue");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "redis issue queue unavailable, retrying");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = sleep(self.options.flush_interval) => continue,
                        }
                    }
                }
            }
            let first = match self.take().await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(self.options.flush_interval) => continue,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "redis issue queue unavailable, retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(self.options.flush_interval) => continue,
                    }
                }
            };

            if let Err(e) = self.consume(first, &shutdown).await {
                tracing::error!(error = %e, "redis issue queue batch handling failed");
                unacked = true;
            }
        }
        tracing::info!(key = %self.key, "redis issue queue stopped");
        Ok(())
    }

    async fn pending(&self) -> Result<usize> {
        Ok(self.len(&self.key).await? + self.len(&self.processing_key).await?)
    }
}
