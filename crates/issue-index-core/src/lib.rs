#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod db_indexer;
pub mod error;
pub mod store;
pub mod traits;
pub mod types;

pub use db_indexer::DbIndexer;
pub use error::{Error, Result};
pub use store::MemoryIssueStore;
pub use traits::{Indexer, IssueStore};
pub use types::{Comment, CommentKind, IndexerData, Issue, IssueDocument, Match, Repository, SearchResult};
