use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use gridcrawl::config::load_config;
///
/// let config = load_config(Path::new("crawler.toml")).unwrap();
/// println!("Crawler id: {}", config.crawler.id);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at crawl start so operators can tell which configuration a
/// resumed session was started with.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OnMatch, OrphansStrategy, StoreBackend};
    use crate::spoil::SpoiledReferenceStrategy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
id = "docs-crawler"
num-threads = 4
max-depth = 3
orphans-strategy = "delete"
start-references = ["/data/docs"]

[committer]
type = "memory"

[checksum.metadata]
fields = ["Last-Modified"]
keep = true

[checksum.document]
deduplicate = true

[[filters.metadata]]
field = "Content-Type"
pattern = "^text/"
on-match = "exclude"

[spoiled-references]
fallback = "ignore"

[grid]
nodes = 3
heartbeat-interval-ms = 50
node-timeout-ms = 500

[store]
backend = "sqlite"
path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.id, "docs-crawler");
        assert_eq!(config.crawler.num_threads, 4);
        assert_eq!(config.crawler.max_depth, Some(3));
        assert_eq!(config.crawler.orphans_strategy, OrphansStrategy::Delete);
        assert!(config.crawler.resume);
        assert_eq!(config.fetcher.kind, "file");
        assert_eq!(config.committer.kind, "memory");

        let metadata = config.checksum.metadata.unwrap();
        assert_eq!(metadata.kind, "generic");
        assert_eq!(metadata.to_field, "crawl.checksum-metadata");
        assert!(metadata.keep);

        let document = config.checksum.document.unwrap();
        assert_eq!(document.kind, "md5");
        assert!(document.content);
        assert!(document.deduplicate);

        assert_eq!(config.filters.metadata[0].on_match, OnMatch::Exclude);
        assert_eq!(
            config.spoiled_references.fallback,
            SpoiledReferenceStrategy::Ignore
        );
        // mappings keep their defaults when only the fallback is set
        assert_eq!(
            config.spoiled_references.mappings.get("bad-status"),
            Some(&SpoiledReferenceStrategy::GraceOnce)
        );
        assert_eq!(config.grid.nodes, 3);
        assert_eq!(config.grid.poll_interval_ms, 100);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
[crawler]
id = "minimal"
start-references = ["/tmp"]
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.num_threads, 2);
        assert_eq!(config.crawler.max_depth, None);
        assert!(config.checksum.metadata.is_none());
        assert!(config.checksum.document.is_none());
        assert_eq!(config.committer.kind, "log");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.grid.heartbeat_interval_ms, 1000);
        assert_eq!(config.grid.node_timeout_ms, 10_000);
    }

    #[test]
    fn test_component_options_are_kept() {
        let config = parse_config(
            r#"
[crawler]
id = "opts"
start-references = ["/tmp"]

[fetcher]
type = "file"
max-children = 10
"#,
        )
        .unwrap();

        assert_eq!(
            config.fetcher.options.get("max-children").and_then(|v| v.as_integer()),
            Some(10)
        );
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/crawler.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
id = "bad"
num-threads = 0
start-references = ["/tmp"]
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
