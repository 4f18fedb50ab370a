use crate::config::types::{
    ChecksumConfig, Config, CrawlerConfig, FiltersConfig, GridConfig, SpoiledReferencesConfig,
    StoreBackend, StoreConfig,
};
use crate::doc::DocState;
use crate::ConfigError;
use regex::Regex;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_component_type("fetcher", &config.fetcher.kind)?;
    validate_component_type("committer", &config.committer.kind)?;
    validate_checksum_config(&config.checksum)?;
    validate_filters(&config.filters)?;
    validate_spoiled_references(&config.spoiled_references)?;
    validate_grid_config(&config.grid)?;
    validate_store_config(&config.store)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_crawler_id(&config.id)?;

    if config.num_threads < 1 || config.num_threads > 256 {
        return Err(ConfigError::Validation(format!(
            "num_threads must be between 1 and 256, got {}",
            config.num_threads
        )));
    }

    if config.max_documents == Some(0) {
        return Err(ConfigError::Validation(
            "max_documents must be >= 1 when set".to_string(),
        ));
    }

    if config.start_references.is_empty() && config.start_references_files.is_empty() {
        return Err(ConfigError::Validation(
            "crawler must define start-references or start-references-files".to_string(),
        ));
    }

    if config.start_references.iter().any(|r| r.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "start-references cannot contain blank entries".to_string(),
        ));
    }

    Ok(())
}

/// Crawler ids name stores, so they are restricted to a safe alphabet
fn validate_crawler_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::Validation("crawler id cannot be empty".to_string()));
    }

    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler id must contain only alphanumeric characters, '-' and '_', got '{}'",
            id
        )));
    }

    Ok(())
}

fn validate_component_type(kind: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{} type cannot be empty",
            kind
        )));
    }
    Ok(())
}

fn validate_checksum_config(config: &ChecksumConfig) -> Result<(), ConfigError> {
    if let Some(metadata) = &config.metadata {
        validate_component_type("metadata checksummer", &metadata.kind)?;
        validate_optional_pattern(metadata.field_pattern.as_deref())?;
        if metadata.fields.is_empty() && metadata.field_pattern.is_none() {
            return Err(ConfigError::Validation(
                "checksum.metadata needs fields or field-pattern".to_string(),
            ));
        }
        if metadata.keep && metadata.to_field.is_empty() {
            return Err(ConfigError::Validation(
                "checksum.metadata to-field cannot be empty when keep is set".to_string(),
            ));
        }
    }

    if let Some(document) = &config.document {
        validate_component_type("document checksummer", &document.kind)?;
        validate_optional_pattern(document.field_pattern.as_deref())?;
        if document.keep && document.to_field.is_empty() {
            return Err(ConfigError::Validation(
                "checksum.document to-field cannot be empty when keep is set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_optional_pattern(pattern: Option<&str>) -> Result<(), ConfigError> {
    if let Some(pattern) = pattern {
        Regex::new(pattern)?;
    }
    Ok(())
}

fn validate_filters(config: &FiltersConfig) -> Result<(), ConfigError> {
    for pattern in config
        .reference_includes
        .iter()
        .chain(config.reference_excludes.iter())
    {
        Regex::new(pattern)?;
    }

    for filter in &config.metadata {
        if filter.field.is_empty() {
            return Err(ConfigError::Validation(
                "metadata filter field cannot be empty".to_string(),
            ));
        }
        Regex::new(&filter.pattern)?;
    }

    Ok(())
}

/// Mapping keys must name bad states; good states are never spoiled
fn validate_spoiled_references(config: &SpoiledReferencesConfig) -> Result<(), ConfigError> {
    for key in config.mappings.keys() {
        let state = DocState::from_db_string(key).ok_or_else(|| {
            ConfigError::Validation(format!("Unknown document state in spoiled-references: '{}'", key))
        })?;

        if !state.is_bad_state() {
            return Err(ConfigError::Validation(format!(
                "spoiled-references cannot map good state '{}'",
                key
            )));
        }
    }
    Ok(())
}

fn validate_grid_config(config: &GridConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation("grid name cannot be empty".to_string()));
    }

    if config.nodes < 1 || config.nodes > 64 {
        return Err(ConfigError::Validation(format!(
            "grid nodes must be between 1 and 64, got {}",
            config.nodes
        )));
    }

    if config.heartbeat_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "heartbeat_interval_ms must be >= 10ms, got {}ms",
            config.heartbeat_interval_ms
        )));
    }

    if config.node_timeout_ms <= config.heartbeat_interval_ms {
        return Err(ConfigError::Validation(format!(
            "node_timeout_ms ({}ms) must exceed heartbeat_interval_ms ({}ms)",
            config.node_timeout_ms, config.heartbeat_interval_ms
        )));
    }

    if config.poll_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be >= 1ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.backend == StoreBackend::Sqlite && config.path.is_empty() {
        return Err(ConfigError::Validation(
            "store path cannot be empty for the sqlite backend".to_string(),
        ));
    }
    Ok(())
}
