use std::path::Path;
use std::sync::Arc;

use issue_index_core::config::{IndexerKind, IndexerSettings};
use issue_index_core::{DbIndexer, Indexer, IssueStore, Result};
use issue_index_queue::{create_queue, DummyQueue, Queue};
use issue_index_text::TantivyIndexer;

/// Indexer selected by `settings.issue_type`.
pub fn create_indexer(settings: &IndexerSettings, base_dir: &Path, store: Arc<dyn IssueStore>) -> Arc<dyn Indexer> {
    match settings.issue_type {
        IndexerKind::Tantivy => {
            let path = settings.issue_path(base_dir);
            tracing::info!(path = %path.display(), "initializing tantivy issue indexer");
            Arc::new(TantivyIndexer::new(path))
        }
        IndexerKind::Db => {
            tracing::info!("initializing database issue indexer");
            Arc::new(DbIndexer::new(store))
        }
    }
}

/// Queue feeding `indexer`. The database indexer has nothing to apply and
/// always gets a [`DummyQueue`], whatever `queue_type` says.
pub async fn create_queue_for(settings: &IndexerSettings, base_dir: &Path, indexer: Arc<dyn Indexer>) -> Result<Arc<dyn Queue>> {
    match settings.issue_type {
        IndexerKind::Db => Ok(Arc::new(DummyQueue)),
        IndexerKind::Tantivy => create_queue(settings, base_dir, indexer).await,
    }
}
