use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use issue_index_core::{Error, Result};

pub const TOKENIZER: &str = "text_with_stopwords";

/// Field handles of the issue schema, resolved once per opened index.
#[derive(Debug, Clone, Copy)]
pub struct IssueFields {
	pub id: Field,
	pub repo_id: Field,
	pub title: Field,
	pub content: Field,
	pub comments: Field,
}

impl IssueFields {
	pub fn resolve(schema: &Schema) -> Result<Self> {
		let get = |name: &str| schema.get_field(name).map_err(|e| Error::Index(format!("schema field '{}': {}", name, e)));
		Ok(Self { id: get("id")?, repo_id: get("repo_id")?, title: get("title")?, content: get("content")?, comments: get("comments")? })
	}

	pub fn text_fields(&self) -> Vec<Field> { vec![self.title, self.content, self.comments] }
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let _id_field = schema_builder.add_i64_field("id", INDEXED | STORED | FAST);
	let _repo_id_field = schema_builder.add_i64_field("repo_id", INDEXED | STORED | FAST);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	let _title_field = schema_builder.add_text_field("title", text_options.clone());
	let _content_field = schema_builder.add_text_field("content", text_options.clone());
	let _comments_field = schema_builder.add_text_field("comments", text_options);
	schema_builder.build()
}

/// Words too common in issue text to be worth indexing.
const STOP_WORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had",
	"has", "have", "having", "he", "how", "if", "in", "is", "it", "its", "may", "might", "must", "not", "of", "on",
	"or", "shall", "should", "so", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
	"to", "was", "what", "when", "where", "which", "who", "whom", "whose", "why", "will", "with", "would",
];

/// Registers the analyzer named [`TOKENIZER`] on `index`. Must run before
/// the first query is parsed or document written.
pub fn register_tokenizer(index: &Index) {
	let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|word| (*word).to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, analyzer);
}
