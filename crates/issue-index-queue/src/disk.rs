//! Durable queue on an embedded sled log.
//!
//! Every payload is stored under a monotonically increasing big-endian key
//! and flushed before `push` returns. The consumer reads the oldest keys,
//! applies them, and only then removes them, so anything not yet removed
//! when the process dies is replayed on the next start (at-least-once).
//!
//! sled calls block the calling thread, so log reads, appends and removals
//! run on the blocking pool.

use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sled::IVec;
use tokio::sync::Notify;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use issue_index_core::{Error, IndexerData, Indexer, Result};

use crate::{Dispatcher, Queue, QueueOptions};

const TREE: &str = "issue_indexer_queue";
const SPACE_POLL: Duration = Duration::from_millis(50);

pub struct DiskQueue {
    db: sled::Db,
    tree: sled::Tree,
    dispatcher: Dispatcher,
    options: QueueOptions,
    /// Reserved or stored payloads not yet removed from the log.
    pending: AtomicUsize,
    arrived: Notify,
    drained: Notify,
}

fn queue_err(context: &str, e: impl Display) -> Error { Error::Queue(format!("{}: {}", context, e)) }

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| queue_err("queue log task failed", e))?
}

impl DiskQueue {
    pub fn open(dir: &Path, indexer: Arc<dyn Indexer>, options: QueueOptions) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db = sled::open(dir).map_err(|e| queue_err("Failed to open queue log", e))?;
        let tree = db.open_tree(TREE).map_err(|e| queue_err("Failed to open queue tree", e))?;
        let replay = tree.len();
        if replay > 0 {
            tracing::info!(replay, path = %dir.display(), "replaying unapplied issue payloads");
        }
        Ok(Self {
            db,
            tree,
            dispatcher: Dispatcher::new(indexer),
            options,
            pending: AtomicUsize::new(replay),
            arrived: Notify::new(),
            drained: Notify::new(),
        })
    }

    /// Claims one of the `capacity` slots, waiting up to `push_timeout`.
    async fn reserve(&self) -> Result<()> {
        let deadline = Instant::now() + self.options.push_timeout;
        loop {
            let current = self.pending.load(Ordering::SeqCst);
            if current < self.options.capacity {
                if self.pending.compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                    return Ok(());
                }
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::QueueFull { capacity: self.options.capacity });
            }
            let _ = timeout(SPACE_POLL.min(deadline - now), self.drained.notified()).await;
        }
    }

    async fn append(&self, value: Vec<u8>) -> Result<()> {
        let db = self.db.clone();
        let tree = self.tree.clone();
        blocking(move || {
            let id = db.generate_id().map_err(|e| queue_err("Failed to allocate queue key", e))?;
            tree.insert(id.to_be_bytes(), value).map_err(|e| queue_err("Failed to append to queue log", e))?;
            tree.flush().map_err(|e| queue_err("Failed to flush queue log", e))?;
            Ok(())
        })
        .await
    }

    /// Oldest `limit` entries. Entries that no longer decode are returned as
    /// keys only so they get removed with the batch.
    async fn peek(&self, limit: usize) -> Result<(Vec<IVec>, Vec<IndexerData>)> {
        let tree = self.tree.clone();
        blocking(move || {
            let mut keys = Vec::with_capacity(limit);
            let mut batch = Vec::with_capacity(limit);
            for entry in tree.iter().take(limit) {
                let (key, value) = entry.map_err(|e| queue_err("Failed to read queue log", e))?;
                match serde_json::from_slice::<IndexerData>(&value) {
                    Ok(data) => batch.push(data),
                    Err(e) => tracing::error!(error = %e, "discarding undecodable queue entry"),
                }
                keys.push(key);
            }
            Ok((keys, batch))
        })
        .await
    }

    async fn ack(&self, keys: Vec<IVec>) -> Result<()> {
        let count = keys.len();
        let tree = self.tree.clone();
        blocking(move || {
            let mut removal = sled::Batch::default();
            for key in keys { removal.remove(key); }
            tree.apply_batch(removal).map_err(|e| queue_err("Failed to acknowledge batch", e))?;
            tree.flush().map_err(|e| queue_err("Failed to flush queue log", e))?;
            Ok(())
        })
        .await?;
        self.pending.fetch_sub(count, Ordering::SeqCst);
        self.drained.notify_waiters();
        Ok(())
    }

    /// Reads, applies and removes one batch. Returns whether anything was
    /// in the log.
    async fn consume(&self) -> Result<bool> {
        let (keys, batch) = self.peek(self.options.batch_size).await?;
        if keys.is_empty() {
            return Ok(false);
        }
        if !batch.is_empty() {
            self.dispatcher.apply_or_drop(batch).await;
        }
        self.ack(keys).await?;
        Ok(true)
    }
}

#[async_trait]
impl Queue for DiskQueue {
    async fn push(&self, data: IndexerData) -> Result<()> {
        let value = serde_json::to_vec(&data)?;
        self.reserve().await?;
        if let Err(e) = self.append(value).await {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            self.drained.notify_waiters();
            return Err(e);
        }
        self.arrived.notify_one();
        Ok(())
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(pending = self.pending.load(Ordering::SeqCst), "disk issue queue started");
        loop {
            while self.pending.load(Ordering::SeqCst) == 0 {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("disk issue queue stopped");
                        return Ok(());
                    }
                    _ = self.arrived.notified() => {}
                }
            }

            let deadline = Instant::now() + self.options.flush_interval;
            while self.pending.load(Ordering::SeqCst) < self.options.batch_size && !shutdown.is_cancelled() {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = self.arrived.notified() => {}
                    _ = sleep_until(deadline) => break,
                }
            }

            let backoff = match self.consume().await {
                Ok(true) => false,
                // Slots reserved by producers whose append is still running.
                Ok(false) => true,
                Err(e) => {
                    tracing::error!(error = %e, "disk issue queue unavailable, retrying");
                    true
                }
            };

            if shutdown.is_cancelled() {
                let left = self.pending.load(Ordering::SeqCst);
                tracing::info!(left, "disk issue queue stopped; remaining payloads replay on next start");
                return Ok(());
            }
            if backoff {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = self.arrived.notified() => {}
                    _ = sleep(self.options.flush_interval) => {}
                }
            }
        }
    }

    async fn pending(&self) -> Result<usize> { Ok(self.pending.load(Ordering::SeqCst)) }
}
