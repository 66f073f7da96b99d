use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use issue_index_core::{Error, Indexer, IssueDocument, Result, SearchResult};

use crate::search::{build_query, run_query};
use crate::tantivy_utils::{build_schema, register_tokenizer, IssueFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

struct OpenIndex {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	fields: IssueFields,
}

/// Full-text issue index stored in a tantivy directory.
///
/// The index is opened lazily by [`Indexer::init`]. Every write commits and
/// reloads the reader; searchers are snapshots, so a concurrent search sees
/// a batch either entirely or not at all.
pub struct TantivyIndexer {
	index_dir: PathBuf,
	open: OnceLock<OpenIndex>,
}

impl TantivyIndexer {
	pub fn new(index_dir: PathBuf) -> Self { Self { index_dir, open: OnceLock::new() } }

	pub fn index_dir(&self) -> &Path { &self.index_dir }

	fn index_exists(path: &Path) -> bool { path.join("meta.json").exists() }

	fn open_or_create(&self) -> Result<(OpenIndex, bool)> {
		std::fs::create_dir_all(&self.index_dir)?;
		let existed = Self::index_exists(&self.index_dir);
		let index = if existed {
			Index::open_in_dir(&self.index_dir).map_err(|e| Error::Index(format!("Failed to open existing index: {}", e)))?
		} else {
			Index::create_in_dir(&self.index_dir, build_schema()).map_err(|e| Error::Index(format!("Failed to create new index: {}", e)))?
		};
		register_tokenizer(&index);
		let fields = IssueFields::resolve(&index.schema())?;
		let writer = index.writer(WRITER_HEAP_BYTES).map_err(|e| Error::Index(format!("Failed to create writer: {}", e)))?;
		let reader = index
			.reader_builder()
			.reload_policy(ReloadPolicy::Manual)
			.try_into()
			.map_err(|e| Error::Index(format!("Failed to create reader: {}", e)))?;
		Ok((OpenIndex { index, reader, writer: Mutex::new(writer), fields }, existed))
	}

	fn opened(&self) -> Result<&OpenIndex> {
		self.open.get().ok_or_else(|| Error::Index(format!("index at {} is not initialized", self.index_dir.display())))
	}

	/// Runs `stage` against the writer and commits; any failure rolls the
	/// writer back so none of the staged operations become visible.
	fn write<F>(&self, stage: F) -> Result<()>
	where
		F: FnOnce(&IndexWriter, &IssueFields) -> tantivy::Result<()>,
	{
		let open = self.opened()?;
		let mut writer = open.writer.lock().map_err(|_| Error::Index("index writer lock poisoned".to_string()))?;
		let staged = match stage(&writer, &open.fields) {
			Ok(()) => writer.commit().map(|_| ()),
			Err(e) => Err(e),
		};
		if let Err(e) = staged {
			if let Err(rollback) = writer.rollback() {
				tracing::error!(error = %rollback, "failed to roll back index writer");
			}
			return Err(Error::Index(e.to_string()));
		}
		open.reader.reload().map_err(|e| Error::Index(format!("Failed to reload reader: {}", e)))
	}
}

fn to_document(fields: &IssueFields, issue: &IssueDocument) -> TantivyDocument {
	let mut doc = TantivyDocument::default();
	doc.add_i64(fields.id, issue.id);
	doc.add_i64(fields.repo_id, issue.repo_id);
	doc.add_text(fields.title, &issue.title);
	doc.add_text(fields.content, &issue.content);
	for comment in &issue.comments { doc.add_text(fields.comments, comment); }
	doc
}

impl Indexer for TantivyIndexer {
	fn init(&self) -> Result<bool> {
		if self.open.get().is_some() { return Ok(true); }
		let (open, existed) = self.open_or_create()?;
		if self.open.set(open).is_err() {
			// Lost a race with a concurrent init; that one owns the writer.
			return Ok(true);
		}
		tracing::info!(path = %self.index_dir.display(), existed, "opened tantivy issue index");
		Ok(existed)
	}

	fn index(&self, issues: &[IssueDocument]) -> Result<()> {
		if issues.is_empty() { return Ok(()); }
		self.write(|writer, fields| {
			for issue in issues {
				writer.delete_term(Term::from_field_i64(fields.id, issue.id));
				writer.add_document(to_document(fields, issue))?;
			}
			Ok(())
		})?;
		tracing::debug!(count = issues.len(), "indexed issues");
		Ok(())
	}

	fn delete(&self, ids: &[i64]) -> Result<()> {
		if ids.is_empty() { return Ok(()); }
		self.write(|writer, fields| {
			for id in ids { writer.delete_term(Term::from_field_i64(fields.id, *id)); }
			Ok(())
		})?;
		tracing::debug!(count = ids.len(), "deleted issues from index");
		Ok(())
	}

	fn search(&self, keyword: &str, repo_id: i64, limit: usize, offset: usize) -> Result<SearchResult> {
		let open = self.opened().map_err(|e| Error::Search(e.to_string()))?;
		if keyword.trim().is_empty() { return Ok(SearchResult::default()); }
		let query = build_query(&open.index, &open.fields, keyword, repo_id);
		run_query(&open.reader.searcher(), &open.fields, query.as_ref(), limit, offset)
	}
}
