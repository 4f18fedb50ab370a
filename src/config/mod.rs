//! Configuration module for Gridcrawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use gridcrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Crawler will use {} threads", config.crawler.num_threads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ChecksumConfig, ComponentConfig, Config, CrawlerConfig, DocumentChecksumConfig,
    FiltersConfig, GridConfig, MetadataChecksumConfig, MetadataFilterConfig, OnMatch,
    OrphansStrategy, SpoiledReferencesConfig, StoreBackend, StoreConfig,
    DEFAULT_DOCUMENT_CHECKSUM_FIELD, DEFAULT_METADATA_CHECKSUM_FIELD,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
