use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use issue_index::{resolve_with_base, Config, IssueIndexer, MemoryIssueStore};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let args: Vec<String> = env::args().skip(1).collect();
    let mut force = false; let mut fixtures = None; let mut drain_secs = 300u64;
    let mut i = 0; while i < args.len() { match args[i].as_str() {
        "--force" | "-f" => force = true,
        "--drain-timeout" => { match args.get(i + 1).and_then(|v| v.parse::<u64>().ok()) { Some(secs) => { drain_secs = secs; i += 1; } None => { eprintln!("Error: --drain-timeout requires a number of seconds"); std::process::exit(1); } } }
        _ if !args[i].starts_with('-') => fixtures = Some(PathBuf::from(&args[i])), _ => {} } i += 1; }
    let fixtures = fixtures.unwrap_or_else(|| {
        let path: String = config.get("data.fixtures").unwrap_or_else(|_| "test_data/issues.json".to_string());
        resolve_with_base(config.base_dir(), path)
    });
    let settings = config.indexer()?;
    println!("Issue Indexer Populate\n======================");
    println!("Fixtures: {}", fixtures.display());
    println!("Indexer: {:?}  Queue: {:?}", settings.issue_type, settings.queue_type);
    let store = Arc::new(MemoryIssueStore::from_json_file(&fixtures)?);

    tokio::runtime::Runtime::new()?.block_on(async {
        let (indexer, handle) = IssueIndexer::init(&settings, config.base_dir(), store).await?;
        let handle = match handle {
            Some(handle) => Some(handle),
            None if force => { println!("♻️  Index exists, re-queueing every issue (--force)"); Some(indexer.repopulate()) }
            None if settings.sync_populate => None,
            None => { println!("Index already exists, nothing to populate. Use --force to rebuild."); None }
        };
        if let Some(handle) = handle {
            let stats = handle.wait().await?;
            println!("📊 Queued {} issues from {} repositories ({} failed)", stats.issues, stats.repositories, stats.failed_repositories);
        }

        let total = indexer.pending().await? as u64;
        let pb = ProgressBar::new(total);
        pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} payloads ({percent}%) {msg}")?.progress_chars("#>-"));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(drain_secs);
        loop {
            let pending = indexer.pending().await? as u64;
            pb.set_position(total.saturating_sub(pending));
            if pending == 0 { break; }
            if tokio::time::Instant::now() >= deadline {
                pb.abandon_with_message(format!("{} payloads still pending", pending));
                indexer.shutdown().await?;
                anyhow::bail!("queue did not drain within {}s", drain_secs);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        pb.finish_with_message("applied");
        indexer.shutdown().await?;
        println!("\n✅ Issue index is up to date");
        println!("💡 To search, use: cargo run --bin issue-index-search '<keyword>' [--repo <id>]");
        Ok::<(), anyhow::Error>(())
    })
}
