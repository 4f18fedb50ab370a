//! Committer contract
//!
//! The committer is the downstream sink of a crawl: accepted documents are
//! upserted, spoiled and orphaned references are deleted.

mod log;
mod memory;

pub use self::log::LogCommitter;
pub use memory::{CommitOperation, MemoryCommitter};

use crate::doc::{Document, Metadata};
use thiserror::Error;

/// Errors that can occur while committing
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Commit rejected: {0}")]
    Rejected(String),

    #[error("Committer lock poisoned: {0}")]
    Poisoned(String),
}

/// Sink for accepted and deleted documents
pub trait Committer: Send + Sync {
    fn upsert(&self, document: &Document) -> Result<(), CommitError>;

    fn delete(&self, reference: &str, metadata: &Metadata) -> Result<(), CommitError>;

    /// Removes everything this committer ever received
    fn clean(&self) -> Result<(), CommitError>;

    /// Flushes pending work at the end of a session
    fn close(&self) -> Result<(), CommitError> {
        Ok(())
    }
}
