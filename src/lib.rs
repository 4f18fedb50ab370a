//! Gridcrawl: a distributed, resumable crawling engine
//!
//! This crate implements the core of a crawler that queues references, fetches
//! and checksums their content, deduplicates them and hands accepted documents
//! to a committer. A single logical crawl can run as cooperating tasks on one or
//! more grid nodes that share a document store.

pub mod checksum;
pub mod committer;
pub mod config;
pub mod crawler;
pub mod dedup;
pub mod doc;
pub mod event;
pub mod fetch;
pub mod grid;
pub mod pipeline;
pub mod registry;
pub mod spoil;
pub mod store;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Grid error: {0}")]
    Grid(#[from] grid::GridError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Commit error: {0}")]
    Commit(#[from] committer::CommitError),

    #[error("Pipeline stage '{stage}' failed: {message}")]
    Pipeline { stage: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawler is stopping")]
    Stopped,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Unknown {kind} type: {name}")]
    UnknownType { kind: &'static str, name: String },
}

impl From<regex::Error> for ConfigError {
    fn from(err: regex::Error) -> Self {
        ConfigError::InvalidPattern(err.to_string())
    }
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CommandOutcome, Crawler, CrawlerBuilder};
pub use doc::{DocContext, DocState, Document, Metadata};
pub use grid::{Grid, GridTask, RunOn, TaskResult, TaskState};
