use std::sync::Arc;

use crate::error::{Error, Result};
use crate::traits::{Indexer, IssueStore};
use crate::types::{IssueDocument, Match, SearchResult};

/// Pass-through indexer that answers searches with a primary-store query.
///
/// There is no separate index to maintain, so writes are no-ops and `init`
/// always reports an existing index.
pub struct DbIndexer {
    store: Arc<dyn IssueStore>,
}

impl DbIndexer {
    pub fn new(store: Arc<dyn IssueStore>) -> Self { Self { store } }
}

impl Indexer for DbIndexer {
    fn init(&self) -> Result<bool> { Ok(true) }

    fn index(&self, _issues: &[IssueDocument]) -> Result<()> { Ok(()) }

    fn delete(&self, _ids: &[i64]) -> Result<()> { Ok(()) }

    fn search(&self, keyword: &str, repo_id: i64, limit: usize, offset: usize) -> Result<SearchResult> {
        let (total, issues) = self
            .store
            .search_issues(keyword, repo_id, limit, offset)
            .map_err(|e| Error::Search(e.to_string()))?;
        let hits = issues.into_iter().map(|i| Match { id: i.id, repo_id: i.repo_id, score: 0.0 }).collect();
        Ok(SearchResult { total, hits })
    }
}
