//! issue-index
//!
//! Wires an issue [`Indexer`](issue_index_core::Indexer) to its queue and
//! exposes the producer and search entrypoints through [`IssueIndexer`].

pub mod backend;
pub mod context;
pub mod populate;

pub use context::{IssueIndexer, MAX_SEARCH_RESULTS};
pub use populate::{populate, PopulateHandle, PopulateStats, POPULATE_PAGE_SIZE};

pub use issue_index_core::config::{resolve_with_base, Config, IndexerKind, IndexerSettings, QueueKind};
pub use issue_index_core::{Comment, CommentKind, Error, Issue, IssueStore, MemoryIssueStore, Repository, Result, SearchResult};
