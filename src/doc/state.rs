/// Document state definitions for tracking a reference's crawl outcome
///
/// This module defines every state a document can end up in after a pipeline pass.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the outcome of processing a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocState {
    // ===== Good States =====
    /// Reference was never seen before (or has no checksum to compare)
    New,

    /// Reference was seen before and its checksum changed
    Modified,

    /// Reference was seen before and its checksum is identical
    Unmodified,

    // ===== Bad States =====
    /// Rejected by a filter or as a duplicate
    Rejected,

    /// Deeper than the configured maximum depth
    TooDeep,

    /// Fetcher returned an unexpected status
    BadStatus,

    /// Deleted from the committer
    Deleted,

    /// Fetcher could not find the reference
    NotFound,

    /// Processing failed with an error
    Error,
}

impl DocState {
    /// Returns true for NEW, MODIFIED and UNMODIFIED
    ///
    /// Every other state is "bad" and is subject to the spoiled reference strategy
    /// when the reference previously succeeded.
    pub fn is_good_state(&self) -> bool {
        matches!(self, Self::New | Self::Modified | Self::Unmodified)
    }

    /// Returns true if this is not a good state
    pub fn is_bad_state(&self) -> bool {
        !self.is_good_state()
    }

    /// Returns true if the document should be sent to the committer
    pub fn is_new_or_modified(&self) -> bool {
        matches!(self, Self::New | Self::Modified)
    }

    /// Converts the state to its store string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Unmodified => "unmodified",
            Self::Rejected => "rejected",
            Self::TooDeep => "too_deep",
            Self::BadStatus => "bad_status",
            Self::Deleted => "deleted",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }

    /// Parses a state from its store string representation
    ///
    /// Configuration files spell states in kebab-case (`not-found`), so hyphens
    /// are accepted in place of underscores.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "new" => Some(Self::New),
            "modified" => Some(Self::Modified),
            "unmodified" => Some(Self::Unmodified),
            "rejected" => Some(Self::Rejected),
            "too_deep" => Some(Self::TooDeep),
            "bad_status" => Some(Self::BadStatus),
            "deleted" => Some(Self::Deleted),
            "not_found" => Some(Self::NotFound),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns all possible document states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::New,
            Self::Modified,
            Self::Unmodified,
            Self::Rejected,
            Self::TooDeep,
            Self::BadStatus,
            Self::Deleted,
            Self::NotFound,
            Self::Error,
        ]
    }
}

impl fmt::Display for DocState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
