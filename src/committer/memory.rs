use crate::committer::{CommitError, Committer};
use crate::doc::{Document, Metadata};
use std::sync::{Arc, Mutex, MutexGuard};

/// One call received by a `MemoryCommitter`
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOperation {
    Upsert {
        reference: String,
        content: Vec<u8>,
        metadata: Metadata,
    },
    Delete {
        reference: String,
    },
    Clean,
}

/// Committer keeping every operation in memory
///
/// Clones share the same log, so a handle kept aside sees what the crawler
/// committed.
#[derive(Debug, Clone, Default)]
pub struct MemoryCommitter {
    operations: Arc<Mutex<Vec<CommitOperation>>>,
}

impl MemoryCommitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> Result<MutexGuard<'_, Vec<CommitOperation>>, CommitError> {
        self.operations
            .lock()
            .map_err(|e| CommitError::Poisoned(e.to_string()))
    }

    pub fn operations(&self) -> Vec<CommitOperation> {
        match self.operations.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// References upserted, in commit order
    pub fn upserted(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                CommitOperation::Upsert { reference, .. } => Some(reference),
                _ => None,
            })
            .collect()
    }

    /// References deleted, in commit order
    pub fn deleted(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                CommitOperation::Delete { reference } => Some(reference),
                _ => None,
            })
            .collect()
    }

    pub fn clean_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, CommitOperation::Clean))
            .count()
    }

    /// Forgets recorded operations
    pub fn reset(&self) {
        match self.operations.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Committer for MemoryCommitter {
    fn upsert(&self, document: &Document) -> Result<(), CommitError> {
        self.log()?.push(CommitOperation::Upsert {
            reference: document.reference().to_string(),
            content: document.content.clone(),
            metadata: document.metadata.clone(),
        });
        Ok(())
    }

    fn delete(&self, reference: &str, _metadata: &Metadata) -> Result<(), CommitError> {
        self.log()?.push(CommitOperation::Delete {
            reference: reference.to_string(),
        });
        Ok(())
    }

    fn clean(&self) -> Result<(), CommitError> {
        self.log()?.push(CommitOperation::Clean);
        Ok(())
    }
}
