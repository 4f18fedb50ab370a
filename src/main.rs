//! gridcrawl main entry point
//!
//! Command-line interface running a crawler on one or more in-process grid
//! nodes.

use clap::{Parser, Subcommand};
use gridcrawl::config::{load_config_with_hash, Config, StoreBackend};
use gridcrawl::crawler::DocLedger;
use gridcrawl::event::{print_statistics, CrawlStatistics};
use gridcrawl::grid::Grid;
use gridcrawl::store::open_engine;
use gridcrawl::{CommandOutcome, Crawler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// gridcrawl: a resumable crawler coordinated over a grid of nodes
#[derive(Parser, Debug)]
#[command(name = "gridcrawl")]
#[command(version)]
#[command(about = "A resumable, grid-coordinated document crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl, resuming an interrupted session when enabled
    Crawl {
        /// Start a new session even if the previous one was interrupted
        #[arg(long)]
        fresh: bool,
    },
    /// Remove everything the crawler stored and committed
    Clean,
    /// Ask every node to stop
    Stop,
    /// Validate the configuration and show what would be crawled
    CheckConfig,
    /// Show the ledger of the current session and exit
    Stats,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    match cli.command {
        Command::CheckConfig => {
            handle_check_config(&config, &hash);
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats => {
            handle_stats(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Crawl { fresh } => {
            if fresh {
                tracing::info!("Starting a new session (ignoring previous state)");
                config.crawler.resume = false;
            }
            handle_crawl(config).await
        }
        Command::Clean => {
            let crawlers = start_nodes(config)?;
            let outcome = crawlers[0].clean().await?;
            Ok(exit_code(&outcome))
        }
        Command::Stop => {
            if let Some(warning) = stop_warning(config.store.backend) {
                tracing::warn!("{}", warning);
            }
            let crawlers = start_nodes(config)?;
            let outcome = crawlers[0].stop().await?;
            Ok(exit_code(&outcome))
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("gridcrawl=info,warn"),
            1 => EnvFilter::new("gridcrawl=debug,info"),
            2 => EnvFilter::new("gridcrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Joins `grid.nodes` crawlers to one grid over the configured store
fn start_nodes(config: Config) -> Result<Vec<Crawler>, Box<dyn std::error::Error>> {
    let engine = open_engine(&config.store)?;
    let grid = Arc::new(Grid::from_config(&config.grid, engine)?);

    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "gridcrawl".to_string());
    let names = node_names(&host, std::process::id(), config.grid.nodes);
    let mut crawlers = Vec::with_capacity(names.len());
    for name in &names {
        let crawler = Crawler::builder(config.clone(), grid.clone())
            .node(name.as_str())
            .build()?;
        crawlers.push(crawler);
    }
    tracing::info!(
        "Crawler '{}' running on {} node(s) of grid '{}': {}",
        config.crawler.id,
        names.len(),
        grid.name(),
        names.join(", ")
    );
    Ok(crawlers)
}

/// Node names, distinct between processes sharing one grid store
fn node_names(host: &str, pid: u32, count: u32) -> Vec<String> {
    (1..=count.max(1))
        .map(|i| format!("{}-{}-{}", host, pid, i))
        .collect()
}

/// Why `stop` cannot reach a crawl running in another process
fn stop_warning(backend: StoreBackend) -> Option<&'static str> {
    match backend {
        StoreBackend::Memory => Some(
            "The memory store is private to this process: stop only reaches \
             crawls in other processes with the sqlite backend",
        ),
        StoreBackend::Sqlite => None,
    }
}

fn exit_code(outcome: &CommandOutcome) -> ExitCode {
    if outcome.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Runs a crawl; Ctrl-C stops every node after its current documents
async fn handle_crawl(config: Config) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let crawlers = start_nodes(config)?;
    let crawler = &crawlers[0];

    let crawl = crawler.crawl();
    tokio::pin!(crawl);
    let outcome = tokio::select! {
        outcome = &mut crawl => outcome?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping all nodes");
            crawler.stop().await?;
            crawl.await?
        }
    };

    let mut stats = CrawlStatistics::default();
    for node in &crawlers {
        let node_stats = node.statistics();
        stats.queued += node_stats.queued;
        stats.processed += node_stats.processed;
        stats.upserted += node_stats.upserted;
        stats.deleted += node_stats.deleted;
        stats.rejected += node_stats.rejected;
        stats.errors += node_stats.errors;
        for (state, count) in node_stats.by_state {
            *stats.by_state.entry(state).or_insert(0) += count;
        }
    }
    println!();
    print_statistics(&stats);

    if outcome.is_completed() {
        tracing::info!("Crawl completed successfully");
    } else {
        tracing::error!("Crawl ended {}", outcome.state);
    }
    Ok(exit_code(&outcome))
}

/// Shows the ledger of the current (or last) session
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(&config.store)?;
    let ledger = DocLedger::open(engine.as_ref(), &config.crawler.id)?;
    let ledger_stats = ledger.statistics()?;

    println!("Crawler: {}", config.crawler.id);
    println!("Store: {:?} {}\n", config.store.backend, config.store.path);

    let stats = CrawlStatistics {
        queued: ledger_stats.queued,
        processed: ledger_stats.processed,
        by_state: ledger.processed_by_state()?,
        ..Default::default()
    };
    print_statistics(&stats);

    println!();
    println!("Ledger:");
    println!("  Queued: {}", ledger_stats.queued);
    println!("  In progress: {}", ledger_stats.active);
    println!("  Processed: {}", ledger_stats.processed);
    println!("  Cached from previous session: {}", ledger_stats.cached);
    Ok(())
}

fn handle_check_config(config: &Config, hash: &str) {
    println!("=== gridcrawl Configuration ===\n");

    println!("Crawler:");
    println!("  Id: {}", config.crawler.id);
    println!("  Threads: {}", config.crawler.num_threads);
    match config.crawler.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unlimited"),
    }
    match config.crawler.max_documents {
        Some(max) => println!("  Max documents: {}", max),
        None => println!("  Max documents: unlimited"),
    }
    println!("  Resume: {}", config.crawler.resume);
    println!("  Orphans: {:?}", config.crawler.orphans_strategy);

    println!("\nComponents:");
    println!("  Fetcher: {}", config.fetcher.kind);
    println!("  Committer: {}", config.committer.kind);

    println!("\nGrid:");
    println!("  Name: {}", config.grid.name);
    println!("  Nodes: {}", config.grid.nodes);
    println!("  Store: {:?} {}", config.store.backend, config.store.path);

    println!("\nStart References ({}):", config.crawler.start_references.len());
    for reference in &config.crawler.start_references {
        println!("  - {}", reference);
    }
    for file in &config.crawler.start_references_files {
        println!("  - file: {}", file);
    }

    println!("\n✓ Configuration is valid (hash: {})", hash);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_names_differ_between_processes() {
        let first = node_names("worker-a", 4100, 2);
        let second = node_names("worker-a", 4200, 2);
        assert_eq!(first, vec!["worker-a-4100-1", "worker-a-4100-2"]);
        assert!(first.iter().all(|name| !second.contains(name)));
    }

    #[test]
    fn test_stop_warns_without_shared_store() {
        assert!(stop_warning(StoreBackend::Memory).unwrap().contains("sqlite"));
        assert!(stop_warning(StoreBackend::Sqlite).is_none());
    }

    #[test]
    fn test_at_least_one_node() {
        assert_eq!(node_names("host", 7, 0), vec!["host-7-1"]);
    }
}
