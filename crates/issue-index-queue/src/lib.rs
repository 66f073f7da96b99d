//! issue-index-queue
//!
//! Work queues feeding an [`Indexer`]. Producers `push` payloads; a single
//! `run` loop per queue batches them and applies each batch through the
//! [`Dispatcher`]. Variants differ in durability:
//!
//! - [`ChannelQueue`]: in-process, best effort, lost on crash
//! - [`DiskQueue`]: sled-backed log, replayed after restart
//! - [`RedisQueue`]: redis list, acknowledged after the batch applied
//! - [`DummyQueue`]: discards everything, for indexers with nothing to apply

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use issue_index_core::config::{IndexerSettings, QueueKind};
use issue_index_core::{IndexerData, Indexer, Result};

pub mod channel;
pub mod dispatch;
pub mod disk;
pub mod dummy;
pub mod redis_queue;

pub use channel::ChannelQueue;
pub use dispatch::Dispatcher;
pub use disk::DiskQueue;
pub use dummy::DummyQueue;
pub use redis_queue::{redis_url, RedisQueue};

#[async_trait]
pub trait Queue: Send + Sync {
    /// Accepts one payload. Success means queued, not yet indexed.
    async fn push(&self, data: IndexerData) -> Result<()>;

    /// Consumes the queue until `shutdown` is cancelled. The batch in flight
    /// when cancellation arrives is still applied.
    async fn run(&self, shutdown: CancellationToken) -> Result<()>;

    /// Payloads accepted but not applied yet.
    async fn pending(&self) -> Result<usize>;
}

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Largest batch handed to the indexer at once.
    pub batch_size: usize,
    /// Pending payloads after which `push` starts waiting.
    pub capacity: usize,
    /// How long a partial batch may wait for more payloads.
    pub flush_interval: Duration,
    /// How long `push` waits for room before giving up with `QueueFull`.
    pub push_timeout: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self { Self::from(&IndexerSettings::default()) }
}

impl From<&IndexerSettings> for QueueOptions {
    fn from(settings: &IndexerSettings) -> Self {
        Self {
            batch_size: settings.batch_number.max(1),
            capacity: settings.queue_length.max(1),
            flush_interval: settings.flush_interval(),
            push_timeout: settings.push_timeout(),
        }
    }
}

pub const REDIS_QUEUE_KEY: &str = "issue_indexer_queue";

/// Builds the queue selected by `settings.queue_type`.
pub async fn create_queue(settings: &IndexerSettings, base_dir: &Path, indexer: Arc<dyn Indexer>) -> Result<Arc<dyn Queue>> {
    let options = QueueOptions::from(settings);
    match settings.queue_type {
        QueueKind::Channel => {
            tracing::info!(capacity = options.capacity, batch = options.batch_size, "initializing channel issue queue");
            Ok(Arc::new(ChannelQueue::new(indexer, options)))
        }
        QueueKind::Disk => {
            let dir = settings.queue_dir(base_dir);
            tracing::info!(path = %dir.display(), batch = options.batch_size, "initializing disk issue queue");
            Ok(Arc::new(DiskQueue::open(&dir, indexer, options)?))
        }
        QueueKind::Redis => {
            let url = redis_url(&settings.queue_conn_str)?;
            tracing::info!(batch = options.batch_size, "initializing redis issue queue");
            Ok(Arc::new(RedisQueue::connect(&url, REDIS_QUEUE_KEY, indexer, options).await?))
        }
    }
}
