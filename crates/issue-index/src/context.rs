use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use issue_index_core::config::IndexerSettings;
use issue_index_core::{Error, Indexer, IndexerData, Issue, IssueStore, Result, SearchResult};
use issue_index_queue::Queue;

use crate::backend::{create_indexer, create_queue_for};
use crate::populate::{populate, with_store, PopulateHandle};

/// Hits fetched by [`IssueIndexer::search_by_keyword`].
pub const MAX_SEARCH_RESULTS: usize = 1000;

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// The issue indexer of one process: indexer, queue and the consumer task
/// draining it. Created once at startup and handed to whoever needs it.
pub struct IssueIndexer {
    indexer: Arc<dyn Indexer>,
    queue: Arc<dyn Queue>,
    store: Arc<dyn IssueStore>,
    shutdown: CancellationToken,
    consumer: Option<JoinHandle<()>>,
}

impl IssueIndexer {
    /// Opens the configured indexer and queue and starts consuming.
    ///
    /// When the index did not exist yet it is populated from `store`: inline
    /// when `sync_populate` is set, otherwise in the background, in which
    /// case the job's handle is returned.
    pub async fn init(
        settings: &IndexerSettings,
        base_dir: &Path,
        store: Arc<dyn IssueStore>,
    ) -> Result<(Self, Option<PopulateHandle>)> {
        settings.validate()?;
        let started = Instant::now();
        let indexer = create_indexer(settings, base_dir, Arc::clone(&store));
        let existed = {
            let indexer = Arc::clone(&indexer);
            tokio::task::spawn_blocking(move || indexer.init())
                .await
                .map_err(|e| Error::Operation(format!("indexer init task failed: {}", e)))??
        };
        let queue = create_queue_for(settings, base_dir, Arc::clone(&indexer)).await?;

        let shutdown = CancellationToken::new();
        let consumer = tokio::spawn({
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            async move {
                if let Err(e) = queue.run(shutdown).await {
                    tracing::error!(error = %e, "issue queue consumer exited with error");
                }
            }
        });
        tracing::info!(existed, elapsed_ms = started.elapsed().as_millis() as u64, "issue indexer initialized");

        let this = Self { indexer, queue, store, shutdown, consumer: Some(consumer) };
        if existed {
            return Ok((this, None));
        }
        if settings.sync_populate {
            populate(Arc::clone(&this.store), Arc::clone(&this.queue), this.shutdown.clone()).await?;
            return Ok((this, None));
        }
        let handle = PopulateHandle::spawn(Arc::clone(&this.store), Arc::clone(&this.queue), this.shutdown.clone());
        Ok((this, Some(handle)))
    }

    /// Queues every issue of the store again, e.g. after the index was
    /// damaged. Existing documents are overwritten in place.
    pub fn repopulate(&self) -> PopulateHandle {
        PopulateHandle::spawn(Arc::clone(&self.store), Arc::clone(&self.queue), self.shutdown.clone())
    }

    /// Queues the current state of `issue` for indexing.
    pub async fn update_issue(&self, issue: &Issue) -> Result<()> {
        self.push(IndexerData::upsert(issue)).await
    }

    /// Queues removal of every issue of a repository. Call before the
    /// repository's issues are removed from the store.
    pub async fn delete_repo_issues(&self, repo_id: i64) -> Result<()> {
        let ids = with_store(&self.store, move |s| s.issue_ids(repo_id)).await.map_err(|e| {
            tracing::warn!(repo_id, error = %e, "failed to list repository issues for index removal");
            e
        })?;
        if ids.is_empty() {
            return Ok(());
        }
        self.push(IndexerData::delete(ids)).await
    }

    pub async fn delete_issues(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.push(IndexerData::delete(ids.to_vec())).await
    }

    async fn push(&self, data: IndexerData) -> Result<()> {
        let ids = data.ids();
        self.queue.push(data).await.map_err(|e| {
            tracing::warn!(?ids, error = %e, "failed to queue issue index update");
            e
        })
    }

    /// Candidate issue ids for `keyword`, best match first, capped at
    /// [`MAX_SEARCH_RESULTS`]. `repo_id == 0` searches every repository.
    pub async fn search_by_keyword(&self, repo_id: i64, keyword: &str) -> Result<Vec<i64>> {
        let result = self.search(keyword, repo_id, MAX_SEARCH_RESULTS, 0).await?;
        Ok(result.hits.into_iter().map(|hit| hit.id).collect())
    }

    pub async fn search(&self, keyword: &str, repo_id: i64, limit: usize, offset: usize) -> Result<SearchResult> {
        let indexer = Arc::clone(&self.indexer);
        let keyword = keyword.to_string();
        tokio::task::spawn_blocking(move || indexer.search(&keyword, repo_id, limit, offset))
            .await
            .map_err(|e| Error::Operation(format!("search task failed: {}", e)))?
            .map_err(|e| {
                tracing::warn!(repo_id, error = %e, "issue search failed");
                e
            })
    }

    pub async fn pending(&self) -> Result<usize> { self.queue.pending().await }

    /// Waits until every accepted payload was applied. Returns `false` if
    /// `timeout` elapsed first.
    pub async fn wait_until_drained(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.queue.pending().await? == 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(DRAIN_POLL).await;
        }
    }

    /// Stops the consumer after it flushed its batch in flight.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(consumer) = self.consumer.take() {
            consumer.await.map_err(|e| Error::Operation(format!("issue queue consumer panicked: {}", e)))?;
        }
        tracing::info!("issue indexer stopped");
        Ok(())
    }
}

impl Drop for IssueIndexer {
    fn drop(&mut self) { self.shutdown.cancel(); }
}
