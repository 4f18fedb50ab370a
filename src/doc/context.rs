//! Per-reference crawl lifecycle record

use crate::doc::DocState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle record of one reference
///
/// Created when a reference is first queued, mutated by the pipeline stages and
/// persisted in the document ledger so the next session can detect changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocContext {
    /// Unique identity of the crawlable unit
    pub reference: String,

    /// Distance from a start reference
    pub depth: u32,

    state: Option<DocState>,

    /// Checksum of the document content (and/or selected fields)
    pub content_checksum: Option<String>,

    /// Checksum of selected metadata fields
    pub metadata_checksum: Option<String>,

    /// Reference before normalization, only set when normalization changed it
    pub original_reference: Option<String>,

    /// Reference of the document this one was discovered from
    pub parent_reference: Option<String>,

    /// When the reference was last finalized
    pub processed_at: Option<DateTime<Utc>>,
}

impl DocContext {
    pub fn new(reference: impl Into<String>, depth: u32) -> Self {
        Self {
            reference: reference.into(),
            depth,
            state: None,
            content_checksum: None,
            metadata_checksum: None,
            original_reference: None,
            parent_reference: None,
            processed_at: None,
        }
    }

    /// Creates the context of a reference discovered from this one
    pub fn child(&self, reference: impl Into<String>) -> Self {
        let mut child = Self::new(reference, self.depth + 1);
        child.parent_reference = Some(self.reference.clone());
        child
    }

    /// Replaces the reference with its normalized form, remembering the original
    pub fn normalize_reference(&mut self, normalized: impl Into<String>) {
        let normalized = normalized.into();
        if normalized != self.reference {
            let original = std::mem::replace(&mut self.reference, normalized);
            self.original_reference.get_or_insert(original);
        }
    }

    pub fn state(&self) -> Option<DocState> {
        self.state
    }

    /// Sets the state, refusing to turn a bad state back into a good one
    ///
    /// Returns false when the transition was refused.
    pub fn set_state(&mut self, state: DocState) -> bool {
        if let Some(current) = self.state {
            if current.is_bad_state() && state.is_good_state() {
                tracing::debug!(
                    "Refusing state change {} -> {} for {}",
                    current,
                    state,
                    self.reference
                );
                return false;
            }
        }
        self.state = Some(state);
        true
    }

    /// Returns true if a state is set and it is a bad one
    pub fn is_rejected(&self) -> bool {
        self.state.map(|s| s.is_bad_state()).unwrap_or(false)
    }
}
