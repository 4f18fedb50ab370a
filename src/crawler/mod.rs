//! Crawler module
//!
//! This module ties the pipelines to the grid:
//! - `CrawlSession`: crawler-wide services of one node
//! - The document ledger shared by every node of the grid
//! - The worker pool running the importer and committer pipelines
//! - Grid tasks and pipelines for the crawl, clean and stop commands
//! - Start reference providers

mod commands;
mod ledger;
mod references;
mod session;
mod tasks;
mod worker;

pub use commands::CommandOutcome;
pub use ledger::{DocLedger, LedgerStatistics};
pub use references::{
    queue_start_references, FileReferencesProvider, ReferencesProvider, StaticReferencesProvider,
};
pub use session::CrawlSession;
pub use tasks::{
    CLEAN_TASK, INIT_TASK, ORPHANS_TASK, RUN_TASK, SHUTDOWN_TASK, STOP_TASK,
};
pub use worker::{process_document, run_workers};

use crate::committer::Committer;
use crate::config::{validate, Config};
use crate::event::{CrawlStatistics, CrawlerMonitor, EventManager};
use crate::fetch::Fetcher;
use crate::grid::{Grid, GridPipeline};
use crate::registry::ComponentRegistry;
use std::sync::Arc;

const DEFAULT_NODE: &str = "local";

/// A crawler bound to one node of a grid
///
/// Commands may be issued from any node: single-node stages run on the
/// coordinator, all-node stages on every joined node.
pub struct Crawler {
    session: Arc<CrawlSession>,
    crawl_pipeline: GridPipeline<CrawlSession>,
    clean_pipeline: GridPipeline<CrawlSession>,
    stop_pipeline: GridPipeline<CrawlSession>,
}

impl Crawler {
    pub fn builder(config: Config, grid: Arc<Grid>) -> CrawlerBuilder {
        CrawlerBuilder::new(config, grid)
    }

    /// Runs a crawl session: init, crawl, orphans, shutdown
    ///
    /// # Returns
    ///
    /// * `Ok(CommandOutcome)` - The pipeline ran; check its state
    /// * `Err(CrawlError)` - The grid could not run the pipeline at all
    pub async fn crawl(&self) -> crate::Result<CommandOutcome> {
        commands::crawl(&self.session, &self.crawl_pipeline).await
    }

    /// Removes everything the crawler stored and committed
    pub async fn clean(&self) -> crate::Result<CommandOutcome> {
        commands::clean(&self.session, &self.clean_pipeline).await
    }

    /// Asks every node to stop after its current documents
    pub async fn stop(&self) -> crate::Result<CommandOutcome> {
        commands::stop(&self.session, &self.stop_pipeline).await
    }

    pub fn session(&self) -> &Arc<CrawlSession> {
        &self.session
    }

    pub fn id(&self) -> &str {
        self.session.id()
    }

    pub fn node(&self) -> &str {
        self.session.node()
    }

    pub fn grid(&self) -> &Arc<Grid> {
        self.session.grid()
    }

    pub fn events(&self) -> &Arc<EventManager> {
        self.session.events()
    }

    pub fn monitor(&self) -> &Arc<CrawlerMonitor> {
        self.session.monitor()
    }

    /// Counters of this node for the current session
    pub fn statistics(&self) -> CrawlStatistics {
        self.session.monitor().snapshot()
    }

    pub fn ledger_statistics(&self) -> crate::Result<LedgerStatistics> {
        Ok(self.session.ledger().statistics()?)
    }
}

pub struct CrawlerBuilder {
    config: Config,
    grid: Arc<Grid>,
    registry: ComponentRegistry,
    node: Option<String>,
    committer: Option<Arc<dyn Committer>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    providers: Vec<Arc<dyn ReferencesProvider>>,
}

impl CrawlerBuilder {
    pub fn new(config: Config, grid: Arc<Grid>) -> Self {
        Self {
            config,
            grid,
            registry: ComponentRegistry::with_defaults(),
            node: None,
            committer: None,
            fetcher: None,
            providers: Vec::new(),
        }
    }

    /// Registry used to create components from their `type` tags
    pub fn registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Node to join; crawlers on the same grid need distinct nodes
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Committer instance, overriding the `[committer]` section
    pub fn committer(mut self, committer: Arc<dyn Committer>) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Fetcher instance, overriding the `[fetcher]` section
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Extra source of start references
    pub fn references_provider(mut self, provider: Arc<dyn ReferencesProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Validates the configuration, creates the components, joins the grid
    /// and registers the crawler tasks on the node
    pub fn build(self) -> crate::Result<Crawler> {
        validate(&self.config)?;

        let node_name = self.node.unwrap_or_else(|| DEFAULT_NODE.to_string());
        let node = self.grid.join(&node_name);

        let mut session = CrawlSession::new(
            self.config,
            &node_name,
            self.grid,
            &self.registry,
            self.committer,
            self.fetcher,
        )?;
        for provider in self.providers {
            session.add_provider(provider);
        }
        let session = Arc::new(session);
        tasks::register_tasks(&session, &node);

        Ok(Crawler {
            crawl_pipeline: tasks::crawl_pipeline(&session)?,
            clean_pipeline: tasks::clean_pipeline(&session)?,
            stop_pipeline: tasks::stop_pipeline(&session)?,
            session,
        })
    }
}
