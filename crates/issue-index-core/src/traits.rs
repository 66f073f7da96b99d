use crate::error::Result;
use crate::types::{Issue, IssueDocument, Repository, SearchResult};

/// An issue index backend.
///
/// Writes (`index`, `delete`) are only ever driven by one dispatcher at a
/// time; `search` may be called concurrently with a write in progress and
/// must observe either the state before or after it.
pub trait Indexer: Send + Sync {
    /// Opens or creates the index. Returns whether it already existed; a
    /// freshly created index has to be populated by the caller.
    fn init(&self) -> Result<bool>;

    /// Upserts every document of the batch. Either the whole batch becomes
    /// visible or the call fails.
    fn index(&self, issues: &[IssueDocument]) -> Result<()>;

    /// Removes documents by id. Unknown ids are ignored.
    fn delete(&self, ids: &[i64]) -> Result<()>;

    /// `repo_id == 0` searches across all repositories.
    fn search(&self, keyword: &str, repo_id: i64, limit: usize, offset: usize) -> Result<SearchResult>;
}

/// Read access to the primary store that owns issues.
pub trait IssueStore: Send + Sync {
    /// Repositories ordered by id. `page` starts at 1.
    fn repositories(&self, page: usize, page_size: usize) -> Result<Vec<Repository>>;

    /// Issues of one repository with their comments loaded.
    fn issues(&self, repo_id: i64) -> Result<Vec<Issue>>;

    fn issue_ids(&self, repo_id: i64) -> Result<Vec<i64>>;

    /// Keyword query answered by the store itself. Returns the total number
    /// of matches and the requested page.
    fn search_issues(&self, keyword: &str, repo_id: i64, limit: usize, offset: usize) -> Result<(u64, Vec<Issue>)>;
}
