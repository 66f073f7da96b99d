use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use issue_index_core::{Error, IndexerData, IssueStore, Result};
use issue_index_queue::Queue;

pub const POPULATE_PAGE_SIZE: usize = 50;

/// Runs a synchronous store call on the blocking pool.
pub(crate) async fn with_store<T, F>(store: &Arc<dyn IssueStore>, f: F) -> Result<T>
where
    F: FnOnce(&dyn IssueStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| Error::Operation(format!("issue store task failed: {}", e)))?
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateStats {
    pub repositories: usize,
    pub issues: usize,
    pub failed_repositories: usize,
}

/// Pushes an upsert for every issue of every repository in the store.
///
/// Repositories are walked page by page in id order. A page that cannot be
/// listed aborts the job; a repository whose issues cannot be loaded or
/// queued is logged, counted and skipped. Cancelling `shutdown` stops the
/// walk between repositories. Running it again is harmless: upserts are
/// idempotent.
pub async fn populate(store: Arc<dyn IssueStore>, queue: Arc<dyn Queue>, shutdown: CancellationToken) -> Result<PopulateStats> {
    let started = Instant::now();
    tracing::info!("populating issue indexer");
    let mut stats = PopulateStats::default();
    let mut page = 1;
    'pages: loop {
        let repos = with_store(&store, move |s| s.repositories(page, POPULATE_PAGE_SIZE)).await?;
        for repo in &repos {
            if shutdown.is_cancelled() {
                tracing::warn!(?stats, "issue indexer population interrupted by shutdown");
                break 'pages;
            }
            match populate_repository(&store, queue.as_ref(), repo.id).await {
                Ok(issues) => {
                    stats.repositories += 1;
                    stats.issues += issues;
                }
                Err(e) => {
                    stats.failed_repositories += 1;
                    tracing::warn!(repo_id = repo.id, repo = %repo.name, error = %e, "failed to populate repository issues");
                }
            }
        }
        if repos.len() < POPULATE_PAGE_SIZE { break; }
        page += 1;
    }
    tracing::info!(
        repositories = stats.repositories,
        issues = stats.issues,
        failed = stats.failed_repositories,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "issue indexer population finished"
    );
    Ok(stats)
}

async fn populate_repository(store: &Arc<dyn IssueStore>, queue: &dyn Queue, repo_id: i64) -> Result<usize> {
    let issues = with_store(store, move |s| s.issues(repo_id)).await?;
    for issue in &issues {
        queue.push(IndexerData::upsert(issue)).await?;
    }
    Ok(issues.len())
}

/// A population job running in the background.
pub struct PopulateHandle {
    task: JoinHandle<Result<PopulateStats>>,
}

impl PopulateHandle {
    pub fn spawn(store: Arc<dyn IssueStore>, queue: Arc<dyn Queue>, shutdown: CancellationToken) -> Self {
        Self { task: tokio::spawn(populate(store, queue, shutdown)) }
    }

    pub fn is_finished(&self) -> bool { self.task.is_finished() }

    /// Waits for the job. Completion means every issue was queued, not that
    /// the queue has drained.
    pub async fn wait(self) -> Result<PopulateStats> {
        self.task.await.map_err(|e| Error::Operation(format!("population task failed: {}", e)))?
    }
}
