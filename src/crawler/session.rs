//! Crawl session: the crawler-wide services one node works with

use crate::checksum::{DocumentChecksumSetup, MetadataChecksumSetup};
use crate::committer::Committer;
use crate::config::Config;
use crate::crawler::ledger::DocLedger;
use crate::crawler::references::{FileReferencesProvider, ReferencesProvider, StaticReferencesProvider};
use crate::dedup::DedupService;
use crate::doc::DocContext;
use crate::event::{CrawlerEvent, CrawlerMonitor, EventManager};
use crate::fetch::Fetcher;
use crate::grid::Grid;
use crate::pipeline::{
    committer_pipeline, importer_pipeline, queue_pipeline, CommitterPipelineContext, DocumentFilters,
    ImporterPipeline, Pipeline, QueuePipelineContext,
};
use crate::registry::ComponentRegistry;
use crate::spoil::{GenericSpoiledReferenceStrategizer, GraceTracker, SpoiledReferenceStrategizer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a node needs to run its share of a crawl
///
/// Stores are opened on the grid's engine, so sessions of the same crawler on
/// different nodes share the ledger, dedup indexes and grace flags.
pub struct CrawlSession {
    config: Config,
    node: String,
    grid: Arc<Grid>,
    events: Arc<EventManager>,
    monitor: Arc<CrawlerMonitor>,
    ledger: DocLedger,
    dedup: DedupService,
    grace: GraceTracker,
    strategizer: Arc<dyn SpoiledReferenceStrategizer>,
    fetcher: Arc<dyn Fetcher>,
    committer: Arc<dyn Committer>,
    metadata_checksum: Option<MetadataChecksumSetup>,
    document_checksum: Option<DocumentChecksumSetup>,
    filters: DocumentFilters,
    providers: Vec<Arc<dyn ReferencesProvider>>,
    queue_pipeline: Pipeline<QueuePipelineContext>,
    importer_pipeline: ImporterPipeline,
    committer_pipeline: Pipeline<CommitterPipelineContext>,
    stopping: AtomicBool,
}

impl CrawlSession {
    /// Builds the session from configuration
    ///
    /// Components are created through `registry` unless a fetcher or committer
    /// instance is given. Any configuration problem fails here, before a crawl
    /// starts.
    pub fn new(
        config: Config,
        node: &str,
        grid: Arc<Grid>,
        registry: &ComponentRegistry,
        committer: Option<Arc<dyn Committer>>,
        fetcher: Option<Arc<dyn Fetcher>>,
    ) -> crate::Result<Self> {
        let engine = grid.engine().clone();
        let id = config.crawler.id.clone();

        let metadata_checksum = match &config.checksum.metadata {
            Some(c) => Some(MetadataChecksumSetup {
                checksummer: registry.create_metadata_checksummer(c)?,
                keep: c.keep,
                to_field: c.to_field.clone(),
                deduplicate: c.deduplicate,
            }),
            None => None,
        };
        let document_checksum = match &config.checksum.document {
            Some(c) => Some(DocumentChecksumSetup {
                checksummer: registry.create_document_checksummer(c)?,
                keep: c.keep,
                to_field: c.to_field.clone(),
                deduplicate: c.deduplicate,
            }),
            None => None,
        };

        let fetcher = match fetcher {
            Some(fetcher) => fetcher,
            None => registry.create_fetcher(&config.fetcher)?,
        };
        let committer = match committer {
            Some(committer) => committer,
            None => registry.create_committer(&config.committer)?,
        };

        let dedup = DedupService::open(
            engine.as_ref(),
            &id,
            metadata_checksum.as_ref().map(|s| s.deduplicate).unwrap_or(false),
            document_checksum.as_ref().map(|s| s.deduplicate).unwrap_or(false),
        )?;

        let mut providers: Vec<Arc<dyn ReferencesProvider>> = Vec::new();
        if !config.crawler.start_references.is_empty() {
            providers.push(Arc::new(StaticReferencesProvider::new(
                config.crawler.start_references.clone(),
            )));
        }
        for file in &config.crawler.start_references_files {
            providers.push(Arc::new(FileReferencesProvider::new(file)));
        }

        let events = Arc::new(EventManager::new());
        let monitor = Arc::new(CrawlerMonitor::new());
        monitor.attach(&events);

        Ok(Self {
            ledger: DocLedger::open(engine.as_ref(), &id)?,
            grace: GraceTracker::open(engine.as_ref(), &id)?,
            strategizer: Arc::new(GenericSpoiledReferenceStrategizer::from_config(
                &config.spoiled_references,
            )),
            filters: DocumentFilters::from_config(&config.filters)?,
            queue_pipeline: queue_pipeline(config.crawler.max_depth),
            importer_pipeline: importer_pipeline(),
            committer_pipeline: committer_pipeline(),
            node: node.to_string(),
            config,
            grid,
            events,
            monitor,
            dedup,
            fetcher,
            committer,
            metadata_checksum,
            document_checksum,
            providers,
            stopping: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.crawler.id
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn monitor(&self) -> &Arc<CrawlerMonitor> {
        &self.monitor
    }

    pub fn ledger(&self) -> &DocLedger {
        &self.ledger
    }

    pub fn dedup(&self) -> &DedupService {
        &self.dedup
    }

    pub fn grace(&self) -> &GraceTracker {
        &self.grace
    }

    pub fn strategizer(&self) -> &dyn SpoiledReferenceStrategizer {
        self.strategizer.as_ref()
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn committer(&self) -> &dyn Committer {
        self.committer.as_ref()
    }

    pub fn metadata_checksum(&self) -> Option<&MetadataChecksumSetup> {
        self.metadata_checksum.as_ref()
    }

    pub fn document_checksum(&self) -> Option<&DocumentChecksumSetup> {
        self.document_checksum.as_ref()
    }

    pub fn filters(&self) -> &DocumentFilters {
        &self.filters
    }

    pub fn providers(&self) -> &[Arc<dyn ReferencesProvider>] {
        &self.providers
    }

    pub(crate) fn add_provider(&mut self, provider: Arc<dyn ReferencesProvider>) {
        self.providers.push(provider);
    }

    pub fn importer_pipeline(&self) -> &ImporterPipeline {
        &self.importer_pipeline
    }

    pub fn committer_pipeline(&self) -> &Pipeline<CommitterPipelineContext> {
        &self.committer_pipeline
    }

    /// Fires an event tagged with this node
    pub fn fire(&self, event: CrawlerEvent) {
        self.events.fire(event.with_node(self.node.as_str()));
    }

    /// Runs a reference through the queue pipeline
    ///
    /// Returns true if the reference passed every queue stage.
    pub fn queue_reference(self: &Arc<Self>, doc: DocContext) -> crate::Result<bool> {
        let ctx = QueuePipelineContext::new(Arc::clone(self), doc);
        Ok(self.queue_pipeline.run(ctx)?.accepted)
    }

    /// Grid task name for this crawler
    pub fn task_name(&self, task: &str) -> String {
        format!("{}:{}", self.id(), task)
    }

    /// True once a stop was requested locally or anywhere on the grid
    pub fn is_stopping(&self) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            return true;
        }
        match self.grid.is_stop_requested() {
            Ok(requested) => requested,
            Err(e) => {
                warn!("Could not read the stop flag: {}", e);
                false
            }
        }
    }

    pub fn request_local_stop(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            info!("Crawler '{}' stopping on node '{}'", self.id(), self.node);
        }
    }

    pub(crate) fn reset_stop(&self) {
        self.stopping.store(false, Ordering::SeqCst);
    }

    /// True once this session processed `max-documents` documents
    pub fn max_documents_reached(&self) -> bool {
        let Some(max) = self.config.crawler.max_documents else {
            return false;
        };
        match self.ledger.processed_count() {
            Ok(processed) => processed >= max,
            Err(e) => {
                warn!("Could not count processed documents: {}", e);
                false
            }
        }
    }
}
