use issue_index_core::{Indexer, IssueDocument};
use issue_index_text::TantivyIndexer;
use tempfile::TempDir;

fn doc(id: i64, repo_id: i64, title: &str, content: &str) -> IssueDocument {
    IssueDocument { id, repo_id, title: title.to_string(), content: content.to_string(), comments: vec![] }
}

fn fresh_indexer() -> (TempDir, TantivyIndexer) {
    let tmp = TempDir::new().expect("tmp");
    let indexer = TantivyIndexer::new(tmp.path().join("issues.index"));
    let existed = indexer.init().expect("init");
    assert!(!existed, "a new directory has no index yet");
    (tmp, indexer)
}

#[test]
fn crash_issue_is_found_then_gone_after_delete() {
    let (_tmp, indexer) = fresh_indexer();
    indexer.index(&[doc(1, 10, "Fix crash", "Null pointer on startup")]).expect("index");

    let res = indexer.search("crash", 10, 10, 0).expect("search");
    assert_eq!(res.total, 1);
    assert_eq!(res.hits.len(), 1);
    assert_eq!(res.hits[0].id, 1);
    assert_eq!(res.hits[0].repo_id, 10);
    assert!(res.hits[0].score > 0.0);

    indexer.delete(&[1]).expect("delete");
    let res = indexer.search("crash", 10, 10, 0).expect("search");
    assert_eq!(res.total, 0);
    assert!(res.hits.is_empty());
}

#[test]
fn upserting_twice_leaves_one_document_with_latest_text() {
    let (_tmp, indexer) = fresh_indexer();
    let v1 = doc(5, 1, "Login broken", "password reset fails");
    indexer.index(&[v1.clone()]).expect("index v1");
    indexer.index(&[v1]).expect("index v1 again");
    assert_eq!(indexer.search("password", 0, 10, 0).expect("search").total, 1);

    indexer.index(&[doc(5, 1, "Login broken", "oauth callback fails")]).expect("index v2");
    assert_eq!(indexer.search("password", 0, 10, 0).expect("search").total, 0);
    let res = indexer.search("oauth", 0, 10, 0).expect("search");
    assert_eq!(res.total, 1);
    assert_eq!(res.hits[0].id, 5);
}

#[test]
fn same_id_twice_in_one_batch_keeps_the_later_version() {
    let (_tmp, indexer) = fresh_indexer();
    indexer
        .index(&[doc(9, 1, "first", "alpha"), doc(9, 1, "second", "bravo")])
        .expect("index");
    assert_eq!(indexer.search("alpha", 0, 10, 0).expect("search").total, 0);
    assert_eq!(indexer.search("bravo", 0, 10, 0).expect("search").total, 1);
}

#[test]
fn scoped_search_never_returns_other_repositories() {
    let (_tmp, indexer) = fresh_indexer();
    indexer
        .index(&[doc(1, 100, "Memory leak", "leak in parser"), doc(2, 200, "Another leak", "leak in lexer")])
        .expect("index");
    let a = indexer.search("leak", 100, 10, 0).expect("search");
    assert_eq!(a.hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1]);
    let b = indexer.search("leak", 300, 10, 0).expect("search");
    assert_eq!(b.total, 0);
    let all = indexer.search("leak", 0, 10, 0).expect("search");
    assert_eq!(all.total, 2);
}

#[test]
fn comments_are_searchable() {
    let (_tmp, indexer) = fresh_indexer();
    let mut d = doc(3, 1, "Slow build", "takes minutes");
    d.comments = vec!["probably the linker".to_string(), "try mold".to_string()];
    indexer.index(&[d]).expect("index");
    let res = indexer.search("linker", 1, 10, 0).expect("search");
    assert_eq!(res.hits.len(), 1);
    assert_eq!(res.hits[0].id, 3);
}

#[test]
fn pagination_applies_limit_and_offset_but_not_total() {
    let (_tmp, indexer) = fresh_indexer();
    let docs: Vec<IssueDocument> = (1..=7).map(|i| doc(i, 1, &format!("issue {}", i), "widget misbehaves")).collect();
    indexer.index(&docs).expect("index");

    let first = indexer.search("widget", 0, 3, 0).expect("search");
    assert_eq!(first.total, 7);
    assert_eq!(first.hits.len(), 3);
    let last = indexer.search("widget", 0, 3, 6).expect("search");
    assert_eq!(last.total, 7);
    assert_eq!(last.hits.len(), 1);

    let mut seen: Vec<i64> = Vec::new();
    for offset in [0, 3, 6] {
        seen.extend(indexer.search("widget", 0, 3, offset).expect("search").hits.iter().map(|h| h.id));
    }
    seen.sort();
    assert_eq!(seen, (1..=7).collect::<Vec<_>>());

    let count_only = indexer.search("widget", 0, 0, 0).expect("search");
    assert_eq!(count_only.total, 7);
    assert!(count_only.hits.is_empty());
}

#[test]
fn delete_of_unknown_id_is_not_an_error() {
    let (_tmp, indexer) = fresh_indexer();
    indexer.delete(&[42, 43]).expect("delete");
}

#[test]
fn malformed_keyword_does_not_fail_search() {
    let (_tmp, indexer) = fresh_indexer();
    indexer.index(&[doc(1, 1, "Parser panics", "on unbalanced input")]).expect("index");
    let res = indexer.search("parser AND (", 0, 10, 0).expect("lenient search");
    assert!(res.total <= 1);
    assert_eq!(indexer.search("   ", 0, 10, 0).expect("search").total, 0);
}

#[test]
fn search_before_init_is_an_error() {
    let tmp = TempDir::new().expect("tmp");
    let indexer = TantivyIndexer::new(tmp.path().join("never-opened"));
    assert!(indexer.search("anything", 0, 10, 0).is_err());
}

#[test]
fn reopening_reports_existing_index_and_keeps_documents() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("issues.index");
    {
        let indexer = TantivyIndexer::new(path.clone());
        assert!(!indexer.init().expect("init"));
        assert!(indexer.init().expect("second init is idempotent"));
        indexer.index(&[doc(11, 2, "Persisted issue", "survives restart")]).expect("index");
    }
    let reopened = TantivyIndexer::new(path);
    assert!(reopened.init().expect("reopen"), "index directory already populated");
    let res = reopened.search("restart", 2, 10, 0).expect("search");
    assert_eq!(res.hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![11]);
}
