//! Fetcher contract
//!
//! Fetching is an external collaborator: the crawler only needs content,
//! metadata, a status and optionally child references out of it.

mod file;

pub use file::FileFetcher;

use crate::doc::{DocContext, Metadata};
use thiserror::Error;

/// Errors that can occur while fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("{0}")]
    Other(String),
}

/// What the fetcher is asked to retrieve
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub reference: String,
    pub depth: u32,
}

impl FetchRequest {
    pub fn for_doc(doc: &DocContext) -> Self {
        Self {
            reference: doc.reference.clone(),
            depth: doc.depth,
        }
    }
}

/// Outcome class of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    NotFound,
    BadStatus,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: FetchStatus,
    pub content: Vec<u8>,
    pub metadata: Metadata,
    /// References discovered while fetching, queued at depth + 1
    pub children: Vec<String>,
    /// Reason for a non-OK status
    pub message: Option<String>,
}

impl FetchResponse {
    pub fn ok(content: Vec<u8>, metadata: Metadata) -> Self {
        Self {
            status: FetchStatus::Ok,
            content,
            metadata,
            children: Vec::new(),
            message: None,
        }
    }

    pub fn not_found() -> Self {
        Self::with_status(FetchStatus::NotFound, "not found")
    }

    pub fn bad_status(message: impl Into<String>) -> Self {
        Self::with_status(FetchStatus::BadStatus, message)
    }

    fn with_status(status: FetchStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            content: Vec::new(),
            metadata: Metadata::new(),
            children: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = children;
        self
    }
}

/// Retrieves the content behind a reference
///
/// Called from worker threads; implementations may block.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}
