use std::sync::Arc;

use issue_index_core::{Error, IndexerData, Indexer, IssueDocument, Result};

/// Consecutive payloads of the same kind, applied with one indexer call.
#[derive(Debug, PartialEq)]
pub(crate) enum Run {
    Upsert(Vec<IssueDocument>),
    Delete(Vec<i64>),
}

/// Splits a batch into maximal runs of upserts and deletes in arrival order,
/// so a later payload for an issue is never applied before an earlier one.
pub(crate) fn split_runs(batch: Vec<IndexerData>) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for data in batch {
        match data {
            IndexerData::Upsert(doc) => {
                if let Some(Run::Upsert(docs)) = runs.last_mut() {
                    docs.push(doc);
                } else {
                    runs.push(Run::Upsert(vec![doc]));
                }
            }
            IndexerData::Delete { ids } if ids.is_empty() => {}
            IndexerData::Delete { ids } => {
                if let Some(Run::Delete(pending)) = runs.last_mut() {
                    pending.extend(ids);
                } else {
                    runs.push(Run::Delete(ids));
                }
            }
        }
    }
    runs
}

/// Applies batches to the indexer off the async executor.
#[derive(Clone)]
pub struct Dispatcher {
    indexer: Arc<dyn Indexer>,
}

impl Dispatcher {
    pub fn new(indexer: Arc<dyn Indexer>) -> Self { Self { indexer } }

    /// Applies the batch run by run. The first failing run aborts the rest of
    /// the batch and its error is returned.
    pub async fn apply(&self, batch: Vec<IndexerData>) -> Result<()> {
        for run in split_runs(batch) {
            let indexer = Arc::clone(&self.indexer);
            tokio::task::spawn_blocking(move || match run {
                Run::Upsert(docs) => indexer.index(&docs),
                Run::Delete(ids) => indexer.delete(&ids),
            })
            .await
            .map_err(|e| Error::Operation(format!("indexer task failed: {}", e)))??;
        }
        Ok(())
    }

    /// Applies the batch and logs a failure instead of returning it. Returns
    /// whether the batch applied.
    pub async fn apply_or_drop(&self, batch: Vec<IndexerData>) -> bool {
        let size = batch.len();
        match self.apply(batch).await {
            Ok(()) => {
                tracing::debug!(size, "applied issue index batch");
                true
            }
            Err(e) => {
                tracing::error!(size, error = %e, "dropping issue index batch");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn up(id: i64) -> IndexerData {
        IndexerData::Upsert(IssueDocument { id, repo_id: 1, title: String::new(), content: format!("v{}", id), comments: vec![] })
    }

    fn ids(runs: &[Run]) -> Vec<(char, Vec<i64>)> {
        runs.iter()
            .map(|r| match r {
                Run::Upsert(docs) => ('u', docs.iter().map(|d| d.id).collect()),
                Run::Delete(ids) => ('d', ids.clone()),
            })
            .collect()
    }

    #[test]
    fn keeps_arrival_order_across_kinds() {
        let runs = split_runs(vec![up(5), IndexerData::delete(vec![5]), up(5)]);
        assert_eq!(ids(&runs), vec![('u', vec![5]), ('d', vec![5]), ('u', vec![5])]);
    }

    #[test]
    fn merges_neighbours_of_the_same_kind() {
        let runs = split_runs(vec![
            up(1),
            up(2),
            IndexerData::delete(vec![3]),
            IndexerData::delete(vec![4, 5]),
            up(6),
        ]);
        assert_eq!(ids(&runs), vec![('u', vec![1, 2]), ('d', vec![3, 4, 5]), ('u', vec![6])]);
    }

    #[test]
    fn skips_empty_deletes() {
        let runs = split_runs(vec![IndexerData::delete(vec![]), up(1)]);
        assert_eq!(ids(&runs), vec![('u', vec![1])]);
        assert!(split_runs(vec![]).is_empty());
    }
}
