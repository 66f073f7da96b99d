//! Domain types shared by every indexer and queue backend.

use serde::{Deserialize, Serialize};

/// A repository owning issues. Only the fields the indexer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
}

/// Kind of an issue comment. Only plain discussion comments are searchable;
/// the rest are timeline events (label changes, closes, references).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    #[default]
    Comment,
    Reopen,
    Close,
    Label,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub kind: CommentKind,
    pub content: String,
}

/// An issue as owned by the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub repo_id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// The searchable projection of an issue.
///
/// - `id`: issue identifier, unique across repositories
/// - `repo_id`: owning repository, used to scope searches
/// - `title`/`content`: primary searchable text
/// - `comments`: discussion comments in timeline order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDocument {
    pub id: i64,
    pub repo_id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub comments: Vec<String>,
}

impl From<&Issue> for IssueDocument {
    fn from(issue: &Issue) -> Self {
        let comments = issue
            .comments
            .iter()
            .filter(|c| c.kind == CommentKind::Comment)
            .map(|c| c.content.clone())
            .collect();
        Self {
            id: issue.id,
            repo_id: issue.repo_id,
            title: issue.title.clone(),
            content: issue.content.clone(),
            comments,
        }
    }
}

/// A unit of work travelling through the queue: either an upsert of one
/// issue or the removal of a set of issues, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum IndexerData {
    Upsert(IssueDocument),
    Delete { ids: Vec<i64> },
}

impl IndexerData {
    pub fn upsert(issue: &Issue) -> Self {
        Self::Upsert(IssueDocument::from(issue))
    }

    pub fn delete(ids: Vec<i64>) -> Self {
        Self::Delete { ids }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    /// Every issue id this payload touches.
    pub fn ids(&self) -> Vec<i64> {
        match self {
            Self::Upsert(doc) => vec![doc.id],
            Self::Delete { ids } => ids.clone(),
        }
    }
}

/// One search hit. `score` is backend-defined and not comparable across
/// backends; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub repo_id: i64,
    pub score: f64,
}

/// A page of hits plus the total number of matching issues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub total: u64,
    pub hits: Vec<Match>,
}
