use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, Searcher, TantivyDocument, Term};

use issue_index_core::{Error, Match, Result, SearchResult};

use crate::tantivy_utils::IssueFields;

/// Parses `keyword` across title, content and comments and, when `repo_id`
/// is non-zero, restricts matches to that repository.
///
/// Parsing is lenient: query-syntax mistakes in user input degrade to the
/// terms that could be understood instead of failing the search.
pub fn build_query(index: &Index, fields: &IssueFields, keyword: &str, repo_id: i64) -> Box<dyn Query> {
	let mut parser = QueryParser::for_index(index, fields.text_fields());
	parser.set_conjunction_by_default();
	let (text_query, errors) = parser.parse_query_lenient(keyword);
	if !errors.is_empty() {
		tracing::debug!(keyword, errors = errors.len(), "ignored unparsable parts of search keyword");
	}
	if repo_id == 0 { return text_query; }
	let scope = TermQuery::new(Term::from_field_i64(fields.repo_id, repo_id), IndexRecordOption::Basic);
	Box::new(BooleanQuery::new(vec![(Occur::Must, text_query), (Occur::Must, Box::new(scope))]))
}

pub fn run_query(searcher: &Searcher, fields: &IssueFields, query: &dyn Query, limit: usize, offset: usize) -> Result<SearchResult> {
	if limit == 0 {
		let total = searcher.search(query, &Count).map_err(search_err)?;
		return Ok(SearchResult { total: total as u64, hits: Vec::new() });
	}
	let collector = (Count, TopDocs::with_limit(limit).and_offset(offset));
	let (total, top_docs) = searcher.search(query, &collector).map_err(search_err)?;
	let mut hits = Vec::with_capacity(top_docs.len());
	for (score, addr) in top_docs {
		let doc: TantivyDocument = searcher.doc(addr).map_err(search_err)?;
		let id = doc.get_first(fields.id).and_then(|v| v.as_i64()).ok_or_else(|| Error::Search("stored document without id".to_string()))?;
		let repo_id = doc.get_first(fields.repo_id).and_then(|v| v.as_i64()).unwrap_or_default();
		hits.push(Match { id, repo_id, score: f64::from(score) });
	}
	Ok(SearchResult { total: total as u64, hits })
}

fn search_err(e: tantivy::TantivyError) -> Error { Error::Search(e.to_string()) }
