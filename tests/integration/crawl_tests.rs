//! Crawl sessions over a temporary directory tree
//!
//! Every test uses the file fetcher on a `TempDir` and a `MemoryCommitter`
//! shared by all nodes, so commits can be inspected after the crawl.

use gridcrawl::committer::{CommitError, Committer, MemoryCommitter};
use gridcrawl::config::{Config, CrawlerConfig, DocumentChecksumConfig};
use gridcrawl::crawler::{LedgerStatistics, StaticReferencesProvider};
use gridcrawl::doc::{Document, Metadata};
use gridcrawl::event::{
    CRAWLER_RESUMED, REJECTED_DUPLICATE, REJECTED_ERROR, REJECTED_GRACE, REJECTED_TOO_DEEP,
};
use gridcrawl::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher, FileFetcher};
use gridcrawl::grid::Grid;
use gridcrawl::store::MemoryEngine;
use gridcrawl::{Crawler, DocState, TaskState};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn reference(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Crawler config with a content checksum and fast grid polling
fn create_test_config(start_references: Vec<String>) -> Config {
    let mut config = Config::with_crawler(CrawlerConfig::new("test-crawler", start_references));
    config.crawler.num_threads = 2;
    config.checksum.document = Some(DocumentChecksumConfig::default());
    config.grid.poll_interval_ms = 10;
    config
}

fn create_grid(config: &Config) -> Arc<Grid> {
    Arc::new(Grid::from_config(&config.grid, Arc::new(MemoryEngine::new())).unwrap())
}

fn build_crawler(config: &Config, grid: &Arc<Grid>, node: &str, committer: &MemoryCommitter) -> Crawler {
    Crawler::builder(config.clone(), grid.clone())
        .node(node)
        .committer(Arc::new(committer.clone()))
        .build()
        .unwrap()
}

/// Directory with `count` distinct text files
fn create_docs(count: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    for i in 0..count {
        fs::write(dir.path().join(format!("doc-{:02}.txt", i)), format!("document {}", i)).unwrap();
    }
    dir
}

/// Records the names of the events a crawler fires
fn record_events(crawler: &Crawler) -> Arc<Mutex<Vec<String>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    crawler
        .events()
        .add_listener(move |e| recorded.lock().unwrap().push(e.name.clone()));
    events
}

fn count(events: &Arc<Mutex<Vec<String>>>, name: &str) -> usize {
    events.lock().unwrap().iter().filter(|e| e.as_str() == name).count()
}

/// File fetcher taking its time, so crawls can be observed mid-way
struct SlowFetcher {
    inner: FileFetcher,
    delay: Duration,
}

impl SlowFetcher {
    fn new(delay_ms: u64) -> Self {
        Self {
            inner: FileFetcher::new(),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Fetcher for SlowFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        std::thread::sleep(self.delay);
        self.inner.fetch(request)
    }
}

/// File fetcher that errors out while `broken` is set
struct BreakableFetcher {
    inner: FileFetcher,
    broken: Arc<AtomicBool>,
}

impl Fetcher for BreakableFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(FetchError::Other(format!("connection reset: {}", request.reference)));
        }
        self.inner.fetch(request)
    }
}

/// Committer refusing to close
struct FailingCloseCommitter(MemoryCommitter);

impl Committer for FailingCloseCommitter {
    fn upsert(&self, document: &Document) -> Result<(), CommitError> {
        self.0.upsert(document)
    }

    fn delete(&self, reference: &str, metadata: &Metadata) -> Result<(), CommitError> {
        self.0.delete(reference, metadata)
    }

    fn clean(&self) -> Result<(), CommitError> {
        self.0.clean()
    }

    fn close(&self) -> Result<(), CommitError> {
        Err(CommitError::Rejected("disk full".to_string()))
    }
}

#[tokio::test]
async fn test_full_crawl_single_node() {
    let docs = create_docs(3);
    let config = create_test_config(vec![reference(docs.path())]);
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();
    let crawler = build_crawler(&config, &grid, "node-1", &committer);

    let outcome = crawler.crawl().await.unwrap();

    assert!(outcome.is_completed(), "crawl ended {}", outcome.state);
    // the directory listing plus its three files
    assert_eq!(committer.upserted().len(), 4);
    let stats = crawler.statistics();
    assert_eq!(stats.processed, 4);
    assert_eq!(stats.by_state.get(&DocState::New), Some(&4));
    assert_eq!(crawler.ledger_statistics().unwrap().queued, 0);
}

#[tokio::test]
async fn test_incremental_crawl_detects_changes() {
    let docs = create_docs(3);
    let config = create_test_config(vec![reference(docs.path())]);
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();
    let crawler = build_crawler(&config, &grid, "node-1", &committer);

    crawler.crawl().await.unwrap();
    committer.reset();

    // nothing changed: nothing committed
    let outcome = crawler.crawl().await.unwrap();
    assert!(outcome.is_completed());
    assert!(committer.upserted().is_empty());
    assert_eq!(crawler.statistics().by_state.get(&DocState::Unmodified), Some(&4));

    // one file modified, one removed
    let modified = docs.path().join("doc-00.txt");
    let removed = docs.path().join("doc-01.txt");
    fs::write(&modified, "document 0, second edition").unwrap();
    fs::remove_file(&removed).unwrap();

    let outcome = crawler.crawl().await.unwrap();
    assert!(outcome.is_completed());
    let upserted: HashSet<String> = committer.upserted().into_iter().collect();
    assert!(upserted.contains(&reference(&modified)));
    assert!(upserted.contains(&reference(docs.path())));
    assert!(!upserted.contains(&reference(&docs.path().join("doc-02.txt"))));
    // the removed file is an orphan; processing it again finds it gone
    assert_eq!(committer.deleted(), vec![reference(&removed)]);
}

#[tokio::test]
async fn test_nodes_share_the_queue() {
    let docs = create_docs(20);
    let config = create_test_config(vec![reference(docs.path())]);
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();

    let build = |node: &str| {
        Crawler::builder(config.clone(), grid.clone())
            .node(node)
            .committer(Arc::new(committer.clone()))
            .fetcher(Arc::new(SlowFetcher::new(20)))
            .build()
            .unwrap()
    };
    let first = build("node-1");
    let second = build("node-2");

    let outcome = first.crawl().await.unwrap();
    assert!(outcome.is_completed(), "crawl ended {}", outcome.state);

    let upserted = committer.upserted();
    let unique: HashSet<&String> = upserted.iter().collect();
    assert_eq!(upserted.len(), 21);
    assert_eq!(unique.len(), 21);

    let first_count = first.statistics().processed;
    let second_count = second.statistics().processed;
    assert_eq!(first_count + second_count, 21);
    assert!(second_count > 0, "node-2 never took a document");
}

#[tokio::test]
async fn test_stopped_crawl_resumes() {
    let docs = create_docs(20);
    let mut config = create_test_config(vec![reference(docs.path())]);
    config.crawler.num_threads = 1;
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();
    let crawler = Crawler::builder(config.clone(), grid.clone())
        .node("node-1")
        .committer(Arc::new(committer.clone()))
        .fetcher(Arc::new(SlowFetcher::new(30)))
        .build()
        .unwrap();
    let events = record_events(&crawler);

    let (crawled, stopped) = tokio::join!(crawler.crawl(), async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        crawler.stop().await
    });
    crawled.unwrap();
    assert!(stopped.unwrap().is_completed());

    let partial = committer.upserted().len();
    assert!(partial < 21, "crawl was not interrupted");
    assert!(crawler.ledger_statistics().unwrap().queued > 0);

    let outcome = crawler.crawl().await.unwrap();
    assert!(outcome.is_completed(), "crawl ended {}", outcome.state);
    assert_eq!(count(&events, CRAWLER_RESUMED), 1);

    let upserted = committer.upserted();
    let unique: HashSet<&String> = upserted.iter().collect();
    assert_eq!(unique.len(), 21);
    assert_eq!(upserted.len(), 21, "a document was committed twice");
}

#[tokio::test]
async fn test_spoiled_reference_gets_one_grace_crawl() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.txt");
    fs::write(&path, "small").unwrap();

    let config = create_test_config(vec![reference(&path)]);
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();
    // oversized files come back as BAD_STATUS, graced once by default
    let crawler = Crawler::builder(config.clone(), grid.clone())
        .node("node-1")
        .committer(Arc::new(committer.clone()))
        .fetcher(Arc::new(FileFetcher::new().with_max_file_size(16)))
        .build()
        .unwrap();
    let events = record_events(&crawler);

    crawler.crawl().await.unwrap();
    assert_eq!(committer.upserted(), vec![reference(&path)]);

    fs::write(&path, "far too large for the configured limit").unwrap();
    crawler.crawl().await.unwrap();
    assert_eq!(count(&events, REJECTED_GRACE), 1);
    assert!(committer.deleted().is_empty());

    crawler.crawl().await.unwrap();
    assert_eq!(committer.deleted(), vec![reference(&path)]);
}

#[tokio::test]
async fn test_stopped_crawl_resumes_on_every_node() {
    let docs = create_docs(30);
    let mut config = create_test_config(vec![reference(docs.path())]);
    config.crawler.num_threads = 1;
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();

    let build = |node: &str| {
        Crawler::builder(config.clone(), grid.clone())
            .node(node)
            .committer(Arc::new(committer.clone()))
            .fetcher(Arc::new(SlowFetcher::new(30)))
            .build()
            .unwrap()
    };
    let first = build("node-1");
    let second = build("node-2");

    let (crawled, stopped) = tokio::join!(first.crawl(), async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        first.stop().await
    });
    crawled.unwrap();
    assert!(stopped.unwrap().is_completed());
    assert!(committer.upserted().len() < 31, "crawl was not interrupted");

    // only the commanding node resets its statistics
    let second_before = second.statistics().processed;
    let outcome = first.crawl().await.unwrap();
    assert!(outcome.is_completed(), "crawl ended {}", outcome.state);

    assert!(first.statistics().processed > 0, "node-1 never took a document");
    assert!(
        second.statistics().processed > second_before,
        "node-2 stayed stopped"
    );

    let upserted = committer.upserted();
    let unique: HashSet<&String> = upserted.iter().collect();
    assert_eq!(unique.len(), 31);
    assert_eq!(upserted.len(), 31, "a document was committed twice");
}

#[tokio::test]
async fn test_second_node_follows_a_crawl_in_progress() {
    let docs = create_docs(20);
    let config = create_test_config(vec![reference(docs.path())]);
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();

    let build = |node: &str| {
        Crawler::builder(config.clone(), grid.clone())
            .node(node)
            .committer(Arc::new(committer.clone()))
            .fetcher(Arc::new(SlowFetcher::new(40)))
            .build()
            .unwrap()
    };
    let first = build("node-1");
    let second = build("node-2");

    let (owned, followed) = tokio::join!(first.crawl(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        second.crawl().await
    });
    let owned = owned.unwrap();
    let followed = followed.unwrap();

    assert!(owned.is_completed(), "crawl ended {}", owned.state);
    assert!(!owned.pipeline.joined);
    assert!(followed.pipeline.joined);
    assert_eq!(followed.state, owned.state);
    assert!(followed.pipeline.stage("crawl-run").is_some());

    // following did not wipe node-1's counts
    assert_eq!(first.statistics().processed + second.statistics().processed, 21);
    let upserted = committer.upserted();
    let unique: HashSet<&String> = upserted.iter().collect();
    assert_eq!(upserted.len(), 21);
    assert_eq!(unique.len(), 21);
}

#[tokio::test]
async fn test_fetch_error_graces_then_deletes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.txt");
    fs::write(&path, "quarterly numbers").unwrap();

    let config = create_test_config(vec![reference(&path)]);
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();
    let broken = Arc::new(AtomicBool::new(false));
    let crawler = Crawler::builder(config.clone(), grid.clone())
        .node("node-1")
        .committer(Arc::new(committer.clone()))
        .fetcher(Arc::new(BreakableFetcher {
            inner: FileFetcher::new(),
            broken: broken.clone(),
        }))
        .build()
        .unwrap();
    let events = record_events(&crawler);

    crawler.crawl().await.unwrap();
    assert_eq!(committer.upserted(), vec![reference(&path)]);

    // a good reference failing once is spared
    broken.store(true, Ordering::SeqCst);
    let outcome = crawler.crawl().await.unwrap();
    assert!(outcome.is_completed(), "crawl ended {}", outcome.state);
    assert_eq!(crawler.statistics().by_state.get(&DocState::Error), Some(&1));
    assert_eq!(count(&events, REJECTED_ERROR), 1);
    assert_eq!(count(&events, REJECTED_GRACE), 1);
    assert!(committer.deleted().is_empty());

    // failing again while on grace deletes it
    crawler.crawl().await.unwrap();
    assert_eq!(count(&events, REJECTED_ERROR), 2);
    assert_eq!(count(&events, REJECTED_GRACE), 1);
    assert_eq!(committer.deleted(), vec![reference(&path)]);
}

#[tokio::test]
async fn test_duplicate_content_committed_once() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), "same words").unwrap();
    fs::write(dir.path().join("b.txt"), "same words").unwrap();

    let mut config = create_test_config(vec![reference(dir.path())]);
    config.crawler.num_threads = 1;
    config.checksum.document = Some(DocumentChecksumConfig {
        deduplicate: true,
        ..DocumentChecksumConfig::default()
    });
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();
    let crawler = build_crawler(&config, &grid, "node-1", &committer);
    let events = record_events(&crawler);

    crawler.crawl().await.unwrap();

    // the directory listing and the first of the two files
    assert_eq!(committer.upserted().len(), 2);
    assert_eq!(count(&events, REJECTED_DUPLICATE), 1);
}

#[tokio::test]
async fn test_max_depth_limits_the_crawl() {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(dir.path().join("top.txt"), "top").unwrap();
    fs::write(sub.join("deep.txt"), "deep").unwrap();

    let mut config = create_test_config(vec![reference(dir.path())]);
    config.crawler.max_depth = Some(1);
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();
    let crawler = build_crawler(&config, &grid, "node-1", &committer);
    let events = record_events(&crawler);

    crawler.crawl().await.unwrap();

    let upserted: HashSet<String> = committer.upserted().into_iter().collect();
    assert_eq!(upserted.len(), 3);
    assert!(upserted.contains(&reference(&sub)));
    assert!(!upserted.contains(&reference(&sub.join("deep.txt"))));
    assert_eq!(count(&events, REJECTED_TOO_DEEP), 1);
}

#[tokio::test]
async fn test_extra_provider_adds_start_references() {
    let docs = create_docs(5);
    let files: Vec<String> = (0..5)
        .map(|i| reference(&docs.path().join(format!("doc-{:02}.txt", i))))
        .collect();

    let config = create_test_config(files[..2].to_vec());
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();
    let crawler = Crawler::builder(config.clone(), grid.clone())
        .node("node-1")
        .committer(Arc::new(committer.clone()))
        .references_provider(Arc::new(StaticReferencesProvider::new(files[2..].to_vec())))
        .build()
        .unwrap();

    crawler.crawl().await.unwrap();

    let upserted: HashSet<String> = committer.upserted().into_iter().collect();
    let expected: HashSet<String> = files.into_iter().collect();
    assert_eq!(upserted, expected);
}

#[tokio::test]
async fn test_clean_forgets_everything() {
    let docs = create_docs(2);
    let config = create_test_config(vec![reference(docs.path())]);
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();
    let crawler = build_crawler(&config, &grid, "node-1", &committer);

    crawler.crawl().await.unwrap();
    let outcome = crawler.clean().await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(committer.clean_count(), 1);
    assert_eq!(crawler.ledger_statistics().unwrap(), LedgerStatistics::default());

    // with the cache gone every document is new again
    committer.reset();
    crawler.crawl().await.unwrap();
    assert_eq!(committer.upserted().len(), 3);
    assert_eq!(crawler.statistics().by_state.get(&DocState::New), Some(&3));
}

#[tokio::test]
async fn test_failing_node_fails_the_crawl() {
    let docs = create_docs(2);
    let config = create_test_config(vec![reference(docs.path())]);
    let grid = create_grid(&config);
    let committer = MemoryCommitter::new();

    let first = build_crawler(&config, &grid, "node-1", &committer);
    let _second = Crawler::builder(config.clone(), grid.clone())
        .node("node-2")
        .committer(Arc::new(FailingCloseCommitter(committer.clone())))
        .build()
        .unwrap();

    let outcome = first.crawl().await.unwrap();

    assert_eq!(outcome.state, TaskState::Failed);
    let shutdown = outcome.pipeline.stage("crawl-shutdown").unwrap();
    assert_eq!(shutdown.state, Some(TaskState::Failed));
    assert!(shutdown.error.as_deref().unwrap_or_default().contains("disk full"));
    // documents were still committed before shutdown
    assert_eq!(committer.upserted().len(), 3);
}
