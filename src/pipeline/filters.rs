//! Regex filters on references and metadata fields

use crate::config::{FiltersConfig, OnMatch};
use crate::doc::Metadata;
use crate::ConfigResult;
use regex::Regex;

struct MetadataFilter {
    field: String,
    pattern: Regex,
    on_match: OnMatch,
}

impl MetadataFilter {
    fn matches(&self, metadata: &Metadata) -> bool {
        metadata
            .get_all(&self.field)
            .iter()
            .any(|value| self.pattern.is_match(value))
    }
}

/// Compiled reference and metadata filters
///
/// Excludes win over includes. With at least one include filter, a candidate
/// must match one of them.
#[derive(Default)]
pub struct DocumentFilters {
    reference_includes: Vec<Regex>,
    reference_excludes: Vec<Regex>,
    metadata: Vec<MetadataFilter>,
}

impl DocumentFilters {
    pub fn from_config(config: &FiltersConfig) -> ConfigResult<Self> {
        let compile = |patterns: &[String]| -> ConfigResult<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| Regex::new(p).map_err(Into::into))
                .collect()
        };

        let metadata = config
            .metadata
            .iter()
            .map(|f| {
                Ok(MetadataFilter {
                    field: f.field.clone(),
                    pattern: Regex::new(&f.pattern)?,
                    on_match: f.on_match,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self {
            reference_includes: compile(&config.reference_includes)?,
            reference_excludes: compile(&config.reference_excludes)?,
            metadata,
        })
    }

    pub fn has_metadata_filters(&self) -> bool {
        !self.metadata.is_empty()
    }

    pub fn accepts_reference(&self, reference: &str) -> bool {
        if self.reference_excludes.iter().any(|r| r.is_match(reference)) {
            return false;
        }
        self.reference_includes.is_empty() || self.reference_includes.iter().any(|r| r.is_match(reference))
    }

    pub fn accepts_metadata(&self, metadata: &Metadata) -> bool {
        let mut has_includes = false;
        let mut included = false;
        for filter in &self.metadata {
            let matched = filter.matches(metadata);
            match filter.on_match {
                OnMatch::Exclude if matched => return false,
                OnMatch::Exclude => {}
                OnMatch::Include => {
                    has_includes = true;
                    included |= matched;
                }
            }
        }
        !has_includes || included
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetadataFilterConfig;

    #[test]
    fn test_reference_filters() {
        let filters = DocumentFilters::from_config(&FiltersConfig {
            reference_includes: vec![r"\.html$".to_string(), r"/$".to_string()],
            reference_excludes: vec!["private".to_string()],
            metadata: Vec::new(),
        })
        .unwrap();

        assert!(filters.accepts_reference("/docs/index.html"));
        assert!(filters.accepts_reference("/docs/"));
        assert!(!filters.accepts_reference("/docs/logo.png"));
        assert!(!filters.accepts_reference("/private/index.html"));
        assert!(DocumentFilters::default().accepts_reference("anything"));
    }

    #[test]
    fn test_metadata_filters() {
        let filters = DocumentFilters::from_config(&FiltersConfig {
            metadata: vec![
                MetadataFilterConfig {
                    field: "Content-Type".to_string(),
                    pattern: "^text/".to_string(),
                    on_match: OnMatch::Include,
                },
                MetadataFilterConfig {
                    field: "draft".to_string(),
                    pattern: "true".to_string(),
                    on_match: OnMatch::Exclude,
                },
            ],
            ..FiltersConfig::default()
        })
        .unwrap();

        let text: Metadata = [("Content-Type", "text/plain")].into_iter().collect();
        let image: Metadata = [("Content-Type", "image/png")].into_iter().collect();
        let draft: Metadata = [("Content-Type", "text/html"), ("draft", "true")]
            .into_iter()
            .collect();

        assert!(filters.accepts_metadata(&text));
        assert!(!filters.accepts_metadata(&image));
        assert!(!filters.accepts_metadata(&draft));
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let result = DocumentFilters::from_config(&FiltersConfig {
            reference_excludes: vec!["(".to_string()],
            ..FiltersConfig::default()
        });
        assert!(result.is_err());
    }
}
