use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use issue_index_core::{Error, IndexerData, Indexer, Result};

use crate::{Dispatcher, Queue, QueueOptions};

/// Bounded in-process queue.
///
/// Payloads live only in memory: whatever is still buffered when the process
/// stops is lost. When the buffer is full, `push` waits up to
/// `push_timeout` and then fails with [`Error::QueueFull`].
pub struct ChannelQueue {
    sender: mpsc::Sender<IndexerData>,
    receiver: Mutex<Option<mpsc::Receiver<IndexerData>>>,
    dispatcher: Dispatcher,
    options: QueueOptions,
    pending: AtomicUsize,
}

impl ChannelQueue {
    pub fn new(indexer: Arc<dyn Indexer>, options: QueueOptions) -> Self {
        let (sender, receiver) = mpsc::channel(options.capacity.max(1));
        Self { sender, receiver: Mutex::new(Some(receiver)), dispatcher: Dispatcher::new(indexer), options, pending: AtomicUsize::new(0) }
    }

    fn take_receiver(&self) -> Result<mpsc::Receiver<IndexerData>> {
        self.receiver
            .lock()
            .map_err(|_| Error::Queue("channel receiver lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| Error::Queue("channel queue is already being consumed".to_string()))
    }

    /// Waits for the next payload. `None` once shutdown was requested.
    async fn next(rx: &mut mpsc::Receiver<IndexerData>, shutdown: &CancellationToken) -> Option<IndexerData> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            item = rx.recv() => item,
        }
    }
}

#[async_trait]
impl Queue for ChannelQueue {
    async fn push(&self, data: IndexerData) -> Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let outcome = match timeout(self.options.push_timeout, self.sender.send(data)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(_)) => Error::Queue("channel queue is closed".to_string()),
            Err(_) => Error::QueueFull { capacity: self.options.capacity },
        };
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Err(outcome)
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut rx = self.take_receiver()?;
        tracing::info!("channel issue queue started");
        while let Some(first) = Self::next(&mut rx, &shutdown).await {
            let mut batch = vec![first];
            let deadline = Instant::now() + self.options.flush_interval;
            while batch.len() < self.options.batch_size {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = sleep_until(deadline) => break,
                    item = rx.recv() => match item {
                        Some(item) => batch.push(item),
                        None => break,
                    },
                }
            }
            let size = batch.len();
            self.dispatcher.apply_or_drop(batch).await;
            self.pending.fetch_sub(size, Ordering::SeqCst);
        }
        let lost = rx.len();
        if lost > 0 {
            tracing::warn!(lost, "channel issue queue stopped with unapplied payloads");
        }
        tracing::info!("channel issue queue stopped");
        Ok(())
    }

    async fn pending(&self) -> Result<usize> { Ok(self.pending.load(Ordering::SeqCst)) }
}
