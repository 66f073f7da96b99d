//! issue-index-text
//!
//! Tantivy-backed full-text `Indexer` for issues. See `index` for the
//! write path and `search` for query construction.

pub mod index;
pub mod search;
pub mod tantivy_utils;

pub use index::TantivyIndexer;
