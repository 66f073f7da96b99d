use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use issue_index_core::{IndexerData, Result};

use crate::Queue;

/// Queue for indexers that answer from the primary store and have nothing to
/// apply. Payloads are accepted and discarded.
#[derive(Debug, Default)]
pub struct DummyQueue;

#[async_trait]
impl Queue for DummyQueue {
    async fn push(&self, _data: IndexerData) -> Result<()> { Ok(()) }

    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        shutdown.cancelled().await;
        Ok(())
    }

    async fn pending(&self) -> Result<usize> { Ok(0) }
}
