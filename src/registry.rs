//! Component registry
//!
//! Fetchers, committers and checksummers are chosen by the `type` tag of their
//! configuration section. The registry maps each tag to a constructor;
//! unknown tags are configuration errors.

use crate::checksum::{
    DocumentChecksummer, FieldMatcher, GenericMetadataChecksummer, Md5DocumentChecksummer,
    MetadataChecksummer,
};
use crate::committer::{Committer, LogCommitter, MemoryCommitter};
use crate::config::{ComponentConfig, DocumentChecksumConfig, MetadataChecksumConfig};
use crate::fetch::{Fetcher, FileFetcher};
use crate::{ConfigError, ConfigResult};
use std::collections::HashMap;
use std::sync::Arc;

pub type FetcherFactory = Arc<dyn Fn(&ComponentConfig) -> ConfigResult<Arc<dyn Fetcher>> + Send + Sync>;
pub type CommitterFactory =
    Arc<dyn Fn(&ComponentConfig) -> ConfigResult<Arc<dyn Committer>> + Send + Sync>;
pub type MetadataChecksummerFactory =
    Arc<dyn Fn(&MetadataChecksumConfig) -> ConfigResult<Arc<dyn MetadataChecksummer>> + Send + Sync>;
pub type DocumentChecksummerFactory =
    Arc<dyn Fn(&DocumentChecksumConfig) -> ConfigResult<Arc<dyn DocumentChecksummer>> + Send + Sync>;

/// Tag to constructor maps for every pluggable component
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    fetchers: HashMap<String, FetcherFactory>,
    committers: HashMap<String, CommitterFactory>,
    metadata_checksummers: HashMap<String, MetadataChecksummerFactory>,
    document_checksummers: HashMap<String, DocumentChecksummerFactory>,
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in components
    ///
    /// * fetchers: `file`
    /// * committers: `log`, `memory`
    /// * metadata checksummers: `generic`
    /// * document checksummers: `md5`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_fetcher("file", |config| {
            let mut fetcher = FileFetcher::new();
            if let Some(max) = option_u64(config, "max-file-size")? {
                fetcher = fetcher.with_max_file_size(max);
            }
            Ok(Arc::new(fetcher))
        });

        registry.register_committer("log", |config| {
            let log_metadata = config
                .options
                .get("log-metadata")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Ok(Arc::new(LogCommitter::new(log_metadata)))
        });
        registry.register_committer("memory", |_| Ok(Arc::new(MemoryCommitter::new())));

        registry.register_metadata_checksummer("generic", |config| {
            let matcher = FieldMatcher::new(config.fields.clone(), config.field_pattern.as_deref())?;
            Ok(Arc::new(GenericMetadataChecksummer::new(matcher)))
        });

        registry.register_document_checksummer("md5", |config| {
            let matcher = FieldMatcher::new(config.fields.clone(), config.field_pattern.as_deref())?;
            Ok(Arc::new(Md5DocumentChecksummer::new(
                matcher,
                config.content,
                config.combine_fields_and_content,
            )))
        });

        registry
    }

    pub fn register_fetcher<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn(&ComponentConfig) -> ConfigResult<Arc<dyn Fetcher>> + Send + Sync + 'static,
    {
        self.fetchers.insert(tag.to_string(), Arc::new(factory));
    }

    pub fn register_committer<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn(&ComponentConfig) -> ConfigResult<Arc<dyn Committer>> + Send + Sync + 'static,
    {
        self.committers.insert(tag.to_string(), Arc::new(factory));
    }

    pub fn register_metadata_checksummer<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn(&MetadataChecksumConfig) -> ConfigResult<Arc<dyn MetadataChecksummer>>
            + Send
            + Sync
            + 'static,
    {
        self.metadata_checksummers
            .insert(tag.to_string(), Arc::new(factory));
    }

    pub fn register_document_checksummer<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn(&DocumentChecksumConfig) -> ConfigResult<Arc<dyn DocumentChecksummer>>
            + Send
            + Sync
            + 'static,
    {
        self.document_checksummers
            .insert(tag.to_string(), Arc::new(factory));
    }

    pub fn create_fetcher(&self, config: &ComponentConfig) -> ConfigResult<Arc<dyn Fetcher>> {
        let factory = lookup(&self.fetchers, "fetcher", &config.kind)?;
        factory(config)
    }

    pub fn create_committer(&self, config: &ComponentConfig) -> ConfigResult<Arc<dyn Committer>> {
        let factory = lookup(&self.committers, "committer", &config.kind)?;
        factory(config)
    }

    pub fn create_metadata_checksummer(
        &self,
        config: &MetadataChecksumConfig,
    ) -> ConfigResult<Arc<dyn MetadataChecksummer>> {
        let factory = lookup(&self.metadata_checksummers, "metadata checksummer", &config.kind)?;
        factory(config)
    }

    pub fn create_document_checksummer(
        &self,
        config: &DocumentChecksumConfig,
    ) -> ConfigResult<Arc<dyn DocumentChecksummer>> {
        let factory = lookup(&self.document_checksummers, "document checksummer", &config.kind)?;
        factory(config)
    }
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &'static str, name: &str) -> ConfigResult<&'a T> {
    map.get(name).ok_or_else(|| ConfigError::UnknownType {
        kind,
        name: name.to_string(),
    })
}

fn option_u64(config: &ComponentConfig, key: &str) -> ConfigResult<Option<u64>> {
    match config.options.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|v| u64::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "{} option '{}' must be a non-negative integer",
                    config.kind, key
                ))
            }),
    }
}
