//! Spoiled-reference handling
//!
//! A spoiled reference succeeded in a previous session but now ends in a bad
//! state. The strategizer maps that bad state to what should happen to the
//! reference downstream; `GraceTracker` keeps the one-chance flag used by
//! `GraceOnce` across sessions.

mod grace;

pub use grace::{GraceTracker, SpoiledAction};

use crate::config::SpoiledReferencesConfig;
use crate::doc::DocState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// What to do with a spoiled reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpoiledReferenceStrategy {
    /// Send a deletion to the committer and forget the reference
    Delete,
    /// Delete only if the reference is still spoiled on the next crawl
    GraceOnce,
    /// Leave committer and cache untouched
    Ignore,
}

impl fmt::Display for SpoiledReferenceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Delete => "DELETE",
            Self::GraceOnce => "GRACE_ONCE",
            Self::Ignore => "IGNORE",
        };
        write!(f, "{}", s)
    }
}

/// Decides the strategy for a spoiled reference
pub trait SpoiledReferenceStrategizer: Send + Sync {
    fn resolve_spoiled_reference(&self, reference: &str, state: DocState) -> SpoiledReferenceStrategy;
}

/// Per-state mapping with a fallback for unmapped states
#[derive(Debug, Clone)]
pub struct GenericSpoiledReferenceStrategizer {
    mappings: HashMap<DocState, SpoiledReferenceStrategy>,
    fallback: SpoiledReferenceStrategy,
}

impl GenericSpoiledReferenceStrategizer {
    pub fn new(fallback: SpoiledReferenceStrategy) -> Self {
        Self {
            mappings: HashMap::new(),
            fallback,
        }
    }

    pub fn with_mapping(mut self, state: DocState, strategy: SpoiledReferenceStrategy) -> Self {
        self.mappings.insert(state, strategy);
        self
    }

    /// Builds the strategizer from configuration
    ///
    /// Keys that do not name a document state are skipped; validation
    /// rejects them before a crawler is ever built.
    pub fn from_config(config: &SpoiledReferencesConfig) -> Self {
        let mappings = config
            .mappings
            .iter()
            .filter_map(|(key, strategy)| DocState::from_db_string(key).map(|s| (s, *strategy)))
            .collect();
        Self {
            mappings,
            fallback: config.fallback,
        }
    }
}

impl Default for GenericSpoiledReferenceStrategizer {
    fn default() -> Self {
        Self::from_config(&SpoiledReferencesConfig::default())
    }
}

impl SpoiledReferenceStrategizer for GenericSpoiledReferenceStrategizer {
    fn resolve_spoiled_reference(&self, reference: &str, state: DocState) -> SpoiledReferenceStrategy {
        let strategy = self.mappings.get(&state).copied().unwrap_or(self.fallback);
        tracing::debug!("Spoiled reference {} ({}): {}", reference, state, strategy);
        strategy
    }
}
