//! In-process `IssueStore` used by the CLI fixtures and by tests.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};
use crate::traits::IssueStore;
use crate::types::{Issue, Repository};

#[derive(Default)]
struct Tables {
    repositories: BTreeMap<i64, Repository>,
    issues: BTreeMap<i64, Issue>,
}

#[derive(Default)]
pub struct MemoryIssueStore {
    tables: RwLock<Tables>,
}

/// On-disk fixture layout accepted by [`MemoryIssueStore::from_json_file`].
#[derive(Debug, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub repositories: Vec<Repository>,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl MemoryIssueStore {
    pub fn new() -> Self { Self::default() }

    pub fn from_fixtures(fixtures: Fixtures) -> Result<Self> {
        let store = Self::new();
        for repo in fixtures.repositories { store.insert_repository(repo)?; }
        for issue in fixtures.issues { store.upsert_issue(issue)?; }
        Ok(store)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let fixtures: Fixtures = serde_json::from_str(&raw)?;
        Self::from_fixtures(fixtures)
    }

    pub fn insert_repository(&self, repo: Repository) -> Result<()> {
        self.write()?.repositories.insert(repo.id, repo);
        Ok(())
    }

    /// Inserts or replaces an issue. The owning repository must exist.
    pub fn upsert_issue(&self, issue: Issue) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.repositories.contains_key(&issue.repo_id) {
            return Err(Error::Store(format!("issue {} references unknown repository {}", issue.id, issue.repo_id)));
        }
        tables.issues.insert(issue.id, issue);
        Ok(())
    }

    pub fn remove_issue(&self, id: i64) -> Result<Option<Issue>> {
        Ok(self.write()?.issues.remove(&id))
    }

    /// Removes a repository and its issues, returning the removed issue ids.
    pub fn remove_repository(&self, repo_id: i64) -> Result<Vec<i64>> {
        let mut tables = self.write()?;
        tables.repositories.remove(&repo_id);
        let ids: Vec<i64> = tables.issues.values().filter(|i| i.repo_id == repo_id).map(|i| i.id).collect();
        for id in &ids { tables.issues.remove(id); }
        Ok(ids)
    }

    pub fn issue(&self, id: i64) -> Result<Option<Issue>> {
        Ok(self.read()?.issues.get(&id).cloned())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| Error::Store("issue store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| Error::Store("issue store lock poisoned".to_string()))
    }
}

fn matches_keyword(issue: &Issue, needle: &str) -> bool {
    issue.title.to_lowercase().contains(needle)
        || issue.content.to_lowercase().contains(needle)
        || issue.comments.iter().any(|c| c.content.to_lowercase().contains(needle))
}

impl IssueStore for MemoryIssueStore {
    fn repositories(&self, page: usize, page_size: usize) -> Result<Vec<Repository>> {
        let skip = page.saturating_sub(1) * page_size;
        Ok(self.read()?.repositories.values().skip(skip).take(page_size).cloned().collect())
    }

    fn issues(&self, repo_id: i64) -> Result<Vec<Issue>> {
        Ok(self.read()?.issues.values().filter(|i| i.repo_id == repo_id).cloned().collect())
    }

    fn issue_ids(&self, repo_id: i64) -> Result<Vec<i64>> {
        Ok(self.read()?.issues.values().filter(|i| i.repo_id == repo_id).map(|i| i.id).collect())
    }

    // Newest issues first, like an `ORDER BY id DESC` keyword query.
    fn search_issues(&self, keyword: &str, repo_id: i64, limit: usize, offset: usize) -> Result<(u64, Vec<Issue>)> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() { return Ok((0, Vec::new())); }
        let tables = self.read()?;
        let found: Vec<&Issue> = tables
            .issues
            .values()
            .rev()
            .filter(|i| repo_id == 0 || i.repo_id == repo_id)
            .filter(|i| matches_keyword(i, &needle))
            .collect();
        let total = found.len() as u64;
        let page = found.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((total, page))
    }
}
