use std::env;
use std::sync::Arc;
use std::time::Duration;

use issue_index::{resolve_with_base, Config, IssueIndexer, IssueStore, MemoryIssueStore, MAX_SEARCH_RESULTS};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <keyword> [--repo <id>] [--limit <n>]", args[0]);
        eprintln!("Example: {} 'crash startup' --repo 2", args[0]);
        std::process::exit(1);
    }
    let keyword = &args[1];
    let mut repo_id = 0i64; let mut limit = 10usize;
    let mut i = 2; while i < args.len() { match args[i].as_str() {
        "--repo" | "-r" => { match args.get(i + 1).and_then(|v| v.parse::<i64>().ok()) { Some(id) => { repo_id = id; i += 1; } None => { eprintln!("Error: --repo requires a repository id"); std::process::exit(1); } } }
        "--limit" | "-n" => { match args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) { Some(n) => { limit = n.min(MAX_SEARCH_RESULTS); i += 1; } None => { eprintln!("Error: --limit requires a number"); std::process::exit(1); } } }
        other => { eprintln!("Unknown argument: {}", other); std::process::exit(1); } } i += 1; }

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.indexer()?;
    let fixtures: String = config.get("data.fixtures").unwrap_or_else(|_| "test_data/issues.json".to_string());
    let store = Arc::new(MemoryIssueStore::from_json_file(&resolve_with_base(config.base_dir(), fixtures))?);
    println!("🔍 issue-index-search\n====================");
    println!("Keyword: {}", keyword); println!("Scope: {}", if repo_id == 0 { "all repositories".to_string() } else { format!("repository {}", repo_id) });

    tokio::runtime::Runtime::new()?.block_on(async {
        let (indexer, handle) = IssueIndexer::init(&settings, config.base_dir(), store.clone()).await?;
        if let Some(handle) = handle {
            println!("⚠️  Index was empty, populating first");
            handle.wait().await?;
            indexer.wait_until_drained(Duration::from_secs(60)).await?;
        }
        let results = indexer.search(keyword, repo_id, limit, 0).await?;
        println!("\n🔍 Found {} issues for: \"{}\" (showing {})", results.total, keyword, results.hits.len());
        for (n, hit) in results.hits.iter().enumerate() {
            let title = store.issue(hit.id)?.map(|issue| issue.title).unwrap_or_else(|| "<deleted>".to_string());
            println!("  {}. #{}  repo={}  score={:.4}  {}", n + 1, hit.id, hit.repo_id, hit.score, title);
        }
        let total = store.issue_ids(repo_id).map(|ids| ids.len()).unwrap_or(0);
        if repo_id != 0 { println!("\n📊 Repository has {} issues in the store", total); }
        indexer.shutdown().await?;
        Ok::<(), anyhow::Error>(())
    })
}
