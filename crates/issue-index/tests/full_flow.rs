use std::sync::Arc;
use std::time::Duration;

use issue_index::{
    Comment, CommentKind, Error, IndexerKind, IndexerSettings, Issue, IssueIndexer, IssueStore, MemoryIssueStore, QueueKind,
    Repository, MAX_SEARCH_RESULTS,
};
use tempfile::TempDir;

const DRAIN: Duration = Duration::from_secs(10);

fn settings(queue_type: QueueKind) -> IndexerSettings {
    IndexerSettings { queue_type, flush_interval_ms: 20, batch_number: 10, ..IndexerSettings::default() }
}

fn issue(id: i64, repo_id: i64, title: &str, content: &str) -> Issue {
    Issue { id, repo_id, title: title.to_string(), content: content.to_string(), comments: vec![] }
}

fn repo(id: i64) -> Repository { Repository { id, name: format!("org/repo-{}", id) } }

/// 60 repositories, one issue each, plus four more issues in repository 1,
/// so population has to walk past the first page.
fn seeded_store() -> Arc<MemoryIssueStore> {
    let store = MemoryIssueStore::new();
    for id in 1..=60 {
        store.insert_repository(repo(id)).unwrap();
        store.upsert_issue(issue(id, id, "widget broken", &format!("widget fails in repo {}", id))).unwrap();
    }
    for id in 61..=64 {
        store.upsert_issue(issue(id, 1, "widget slow", "rendering takes forever")).unwrap();
    }
    Arc::new(store)
}

async fn sorted_hits(indexer: &IssueIndexer, repo_id: i64, keyword: &str) -> Vec<i64> {
    let mut ids = indexer.search_by_keyword(repo_id, keyword).await.unwrap();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn background_population_indexes_every_issue() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store();
    let (indexer, handle) = IssueIndexer::init(&settings(QueueKind::Channel), tmp.path(), store.clone()).await.unwrap();

    let stats = handle.expect("new index is populated").wait().await.unwrap();
    assert_eq!(stats.repositories, 60);
    assert_eq!(stats.issues, 64);
    assert_eq!(stats.failed_repositories, 0);
    assert!(indexer.wait_until_drained(DRAIN).await.unwrap());

    assert_eq!(sorted_hits(&indexer, 0, "widget").await, (1..=64).collect::<Vec<_>>());
    assert_eq!(sorted_hits(&indexer, 1, "widget").await, vec![1, 61, 62, 63, 64]);
    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn existing_index_is_not_repopulated() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store();
    let (indexer, handle) = IssueIndexer::init(&settings(QueueKind::Channel), tmp.path(), store.clone()).await.unwrap();
    handle.expect("first start populates").wait().await.unwrap();
    assert!(indexer.wait_until_drained(DRAIN).await.unwrap());
    indexer.shutdown().await.unwrap();

    let (indexer, handle) = IssueIndexer::init(&settings(QueueKind::Channel), tmp.path(), store).await.unwrap();
    assert!(handle.is_none());
    assert_eq!(indexer.search_by_keyword(0, "widget").await.unwrap().len(), 64);
    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn synchronous_population_completes_before_init_returns() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = settings(QueueKind::Disk);
    cfg.sync_populate = true;
    let (indexer, handle) = IssueIndexer::init(&cfg, tmp.path(), seeded_store()).await.unwrap();
    assert!(handle.is_none());
    assert!(indexer.wait_until_drained(DRAIN).await.unwrap());
    assert_eq!(indexer.search_by_keyword(0, "rendering").await.unwrap().len(), 4);
    indexer.shutdown().await.unwrap();
    assert!(tmp.path().join("indexers/issues.queue").exists());
}

#[tokio::test]
async fn later_updates_win_over_earlier_ones() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryIssueStore::new());
    store.insert_repository(repo(1)).unwrap();
    let (indexer, _) = IssueIndexer::init(&settings(QueueKind::Channel), tmp.path(), store).await.unwrap();

    indexer.update_issue(&issue(5, 1, "tracker", "alpha release blocker")).await.unwrap();
    indexer.delete_issues(&[5]).await.unwrap();
    indexer.update_issue(&issue(5, 1, "tracker", "bravo release blocker")).await.unwrap();
    assert!(indexer.wait_until_drained(DRAIN).await.unwrap());

    assert!(indexer.search_by_keyword(1, "alpha").await.unwrap().is_empty());
    assert_eq!(indexer.search_by_keyword(1, "bravo").await.unwrap(), vec![5]);
    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn crash_report_disappears_after_delete() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryIssueStore::new());
    store.insert_repository(repo(10)).unwrap();
    let (indexer, _) = IssueIndexer::init(&settings(QueueKind::Channel), tmp.path(), store).await.unwrap();

    let mut report = issue(1, 10, "Fix crash", "Null pointer on startup");
    report.comments = vec![
        Comment { kind: CommentKind::Comment, content: "stacktrace attached".to_string() },
        Comment { kind: CommentKind::Label, content: "needs-triage".to_string() },
    ];
    indexer.update_issue(&report).await.unwrap();
    assert!(indexer.wait_until_drained(DRAIN).await.unwrap());
    assert_eq!(indexer.search_by_keyword(10, "crash").await.unwrap(), vec![1]);
    assert_eq!(indexer.search_by_keyword(10, "stacktrace").await.unwrap(), vec![1]);
    assert!(indexer.search_by_keyword(10, "triage").await.unwrap().is_empty(), "timeline events are not indexed");
    assert!(indexer.search_by_keyword(11, "crash").await.unwrap().is_empty());

    indexer.delete_issues(&[1]).await.unwrap();
    assert!(indexer.wait_until_drained(DRAIN).await.unwrap());
    assert!(indexer.search_by_keyword(10, "crash").await.unwrap().is_empty());
    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn deleting_a_repository_removes_only_its_issues() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store();
    let (indexer, handle) = IssueIndexer::init(&settings(QueueKind::Channel), tmp.path(), store.clone()).await.unwrap();
    handle.expect("populates").wait().await.unwrap();
    assert!(indexer.wait_until_drained(DRAIN).await.unwrap());

    indexer.delete_repo_issues(1).await.unwrap();
    store.remove_repository(1).unwrap();
    indexer.delete_repo_issues(1).await.unwrap();
    assert!(indexer.wait_until_drained(DRAIN).await.unwrap());

    assert!(indexer.search_by_keyword(1, "widget").await.unwrap().is_empty());
    assert_eq!(indexer.search_by_keyword(2, "widget").await.unwrap(), vec![2]);
    assert_eq!(indexer.search_by_keyword(0, "widget").await.unwrap().len(), 59);
    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn database_backend_answers_from_the_store() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store();
    let cfg = IndexerSettings { issue_type: IndexerKind::Db, queue_type: QueueKind::Redis, ..settings(QueueKind::Channel) };
    let (indexer, handle) = IssueIndexer::init(&cfg, tmp.path(), store.clone()).await.unwrap();
    assert!(handle.is_none(), "nothing to populate");

    indexer.update_issue(&issue(2, 2, "widget broken", "now about gears")).await.unwrap();
    assert_eq!(indexer.pending().await.unwrap(), 0);
    assert_eq!(indexer.search_by_keyword(3, "widget").await.unwrap(), vec![3]);
    assert_eq!(indexer.search_by_keyword(1, "rendering").await.unwrap(), vec![64, 63, 62, 61]);
    assert!(!tmp.path().join("indexers").exists(), "no index directory for the database backend");
    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn keyword_search_is_capped() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryIssueStore::new();
    store.insert_repository(repo(1)).unwrap();
    for id in 1..=1100 {
        store.upsert_issue(issue(id, 1, "flaky test", "intermittent failure")).unwrap();
    }
    let store: Arc<dyn IssueStore> = Arc::new(store);
    let cfg = IndexerSettings { issue_type: IndexerKind::Db, ..IndexerSettings::default() };
    let (indexer, _) = IssueIndexer::init(&cfg, tmp.path(), store).await.unwrap();

    assert_eq!(indexer.search_by_keyword(1, "flaky").await.unwrap().len(), MAX_SEARCH_RESULTS);
    assert_eq!(indexer.search("flaky", 1, 10, 0).await.unwrap().total, 1100);
    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_settings_refuse_to_start() {
    let tmp = TempDir::new().unwrap();
    let cfg = IndexerSettings { batch_number: 0, ..IndexerSettings::default() };
    let err = IssueIndexer::init(&cfg, tmp.path(), seeded_store()).await.err().expect("rejected");
    assert!(matches!(err, Error::InvalidConfig(_)));
}
