use crate::spoil::SpoiledReferenceStrategy;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Well-known field receiving the metadata checksum when it is kept
pub const DEFAULT_METADATA_CHECKSUM_FIELD: &str = "crawl.checksum-metadata";

/// Well-known field receiving the document checksum when it is kept
pub const DEFAULT_DOCUMENT_CHECKSUM_FIELD: &str = "crawl.checksum-doc";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default = "ComponentConfig::default_fetcher")]
    pub fetcher: ComponentConfig,
    #[serde(default = "ComponentConfig::default_committer")]
    pub committer: ComponentConfig,
    #[serde(default)]
    pub checksum: ChecksumConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default, rename = "spoiled-references")]
    pub spoiled_references: SpoiledReferencesConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Unique crawler identifier, also used to name its stores
    pub id: String,

    /// Worker pool size on each node
    #[serde(rename = "num-threads", default = "default_num_threads")]
    pub num_threads: u32,

    /// Maximum depth from a start reference (unlimited when absent)
    #[serde(rename = "max-depth", default)]
    pub max_depth: Option<u32>,

    /// Maximum documents processed per session (unlimited when absent)
    #[serde(rename = "max-documents", default)]
    pub max_documents: Option<u64>,

    /// Resume an interrupted session instead of starting over
    #[serde(default = "default_true")]
    pub resume: bool,

    /// What to do with references crawled last session but not this one
    #[serde(rename = "orphans-strategy", default)]
    pub orphans_strategy: OrphansStrategy,

    /// Accept UNMODIFIED documents instead of rejecting them
    #[serde(rename = "process-unmodified", default)]
    pub process_unmodified: bool,

    #[serde(rename = "start-references", default)]
    pub start_references: Vec<String>,

    /// Files listing start references, one per line
    #[serde(rename = "start-references-files", default)]
    pub start_references_files: Vec<String>,
}

/// Handling of references present in the previous session only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrphansStrategy {
    /// Queue and crawl them again
    #[default]
    Process,
    /// Send deletion requests to the committer
    Delete,
    /// Forget about them
    Ignore,
}

/// A pluggable component selected by its registry tag
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub kind: String,

    /// Any other key, handed to the component factory
    #[serde(flatten)]
    pub options: toml::Table,
}

impl ComponentConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: toml::Table::new(),
        }
    }

    fn default_fetcher() -> Self {
        Self::new("file")
    }

    fn default_committer() -> Self {
        Self::new("log")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChecksumConfig {
    pub metadata: Option<MetadataChecksumConfig>,
    pub document: Option<DocumentChecksumConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataChecksumConfig {
    #[serde(rename = "type", default = "default_metadata_checksummer")]
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub field_pattern: Option<String>,
    /// Store the checksum in the document metadata
    #[serde(default)]
    pub keep: bool,
    #[serde(default = "default_metadata_checksum_field")]
    pub to_field: String,
    #[serde(default)]
    pub deduplicate: bool,
}

impl Default for MetadataChecksumConfig {
    fn default() -> Self {
        Self {
            kind: default_metadata_checksummer(),
            fields: Vec::new(),
            field_pattern: None,
            keep: false,
            to_field: default_metadata_checksum_field(),
            deduplicate: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DocumentChecksumConfig {
    #[serde(rename = "type", default = "default_document_checksummer")]
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub field_pattern: Option<String>,
    /// Include the content in the checksum
    #[serde(default = "default_true")]
    pub content: bool,
    /// Hash selected fields and content into one value
    #[serde(default)]
    pub combine_fields_and_content: bool,
    #[serde(default)]
    pub keep: bool,
    #[serde(default = "default_document_checksum_field")]
    pub to_field: String,
    #[serde(default)]
    pub deduplicate: bool,
}

impl Default for DocumentChecksumConfig {
    fn default() -> Self {
        Self {
            kind: default_document_checksummer(),
            fields: Vec::new(),
            field_pattern: None,
            content: true,
            combine_fields_and_content: false,
            keep: false,
            to_field: default_document_checksum_field(),
            deduplicate: false,
        }
    }
}

/// Reference and metadata filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FiltersConfig {
    /// Regexes a reference must match (any); empty accepts all
    #[serde(default)]
    pub reference_includes: Vec<String>,
    /// Regexes rejecting a reference
    #[serde(default)]
    pub reference_excludes: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataFilterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataFilterConfig {
    pub field: String,
    pub pattern: String,
    #[serde(default)]
    pub on_match: OnMatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnMatch {
    #[default]
    Include,
    Exclude,
}

/// State to spoiled-reference strategy mapping
#[derive(Debug, Clone, Deserialize)]
pub struct SpoiledReferencesConfig {
    #[serde(default = "default_spoiled_fallback")]
    pub fallback: SpoiledReferenceStrategy,
    /// Keys are document states (`not-found`, `bad-status`, ...)
    #[serde(default = "default_spoiled_mappings")]
    pub mappings: HashMap<String, SpoiledReferenceStrategy>,
}

impl Default for SpoiledReferencesConfig {
    fn default() -> Self {
        Self {
            fallback: default_spoiled_fallback(),
            mappings: default_spoiled_mappings(),
        }
    }
}

/// Grid coordination settings
#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_name")]
    pub name: String,

    /// Number of in-process nodes started by the binary
    #[serde(default = "default_grid_nodes")]
    pub nodes: u32,

    /// How often a running task execution reports a heartbeat
    #[serde(rename = "heartbeat-interval-ms", default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Silence after which an execution is considered failed
    #[serde(rename = "node-timeout-ms", default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,

    /// How often the dispatcher and idle workers poll
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl GridConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            name: default_grid_name(),
            nodes: default_grid_nodes(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            node_timeout_ms: default_node_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Path to the SQLite database file
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_num_threads() -> u32 {
    2
}

fn default_metadata_checksummer() -> String {
    "generic".to_string()
}

fn default_document_checksummer() -> String {
    "md5".to_string()
}

fn default_metadata_checksum_field() -> String {
    DEFAULT_METADATA_CHECKSUM_FIELD.to_string()
}

fn default_document_checksum_field() -> String {
    DEFAULT_DOCUMENT_CHECKSUM_FIELD.to_string()
}

fn default_spoiled_fallback() -> SpoiledReferenceStrategy {
    SpoiledReferenceStrategy::Delete
}

fn default_spoiled_mappings() -> HashMap<String, SpoiledReferenceStrategy> {
    HashMap::from([
        ("not-found".to_string(), SpoiledReferenceStrategy::Delete),
        ("bad-status".to_string(), SpoiledReferenceStrategy::GraceOnce),
        ("error".to_string(), SpoiledReferenceStrategy::GraceOnce),
    ])
}

fn default_grid_name() -> String {
    "local".to_string()
}

fn default_grid_nodes() -> u32 {
    1
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_node_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_store_path() -> String {
    "./gridcrawl.db".to_string()
}

impl Config {
    /// Builds a configuration with defaults for everything but the crawler section
    pub fn with_crawler(crawler: CrawlerConfig) -> Self {
        Self {
            crawler,
            fetcher: ComponentConfig::default_fetcher(),
            committer: ComponentConfig::default_committer(),
            checksum: ChecksumConfig::default(),
            filters: FiltersConfig::default(),
            spoiled_references: SpoiledReferencesConfig::default(),
            grid: GridConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl CrawlerConfig {
    /// Crawler settings with defaults and the given start references
    pub fn new(id: impl Into<String>, start_references: Vec<String>) -> Self {
        Self {
            id: id.into(),
            num_threads: default_num_threads(),
            max_depth: None,
            max_documents: None,
            resume: true,
            orphans_strategy: OrphansStrategy::default(),
            process_unmodified: false,
            start_references,
            start_references_files: Vec::new(),
        }
    }
}
