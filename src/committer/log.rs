use crate::committer::{CommitError, Committer};
use crate::doc::{Document, Metadata};
use tracing::info;

/// Committer that only logs what it receives
#[derive(Debug, Clone, Default)]
pub struct LogCommitter {
    /// Also log every metadata field of upserted documents
    log_metadata: bool,
}

impl LogCommitter {
    pub fn new(log_metadata: bool) -> Self {
        Self { log_metadata }
    }
}

impl Committer for LogCommitter {
    fn upsert(&self, document: &Document) -> Result<(), CommitError> {
        info!(
            "UPSERT {} ({} bytes, {} fields)",
            document.reference(),
            document.content.len(),
            document.metadata.len()
        );
        if self.log_metadata {
            for (field, values) in document.metadata.iter() {
                info!("  {} = {}", field, values.join(", "));
            }
        }
        Ok(())
    }

    fn delete(&self, reference: &str, _metadata: &Metadata) -> Result<(), CommitError> {
        info!("DELETE {}", reference);
        Ok(())
    }

    fn clean(&self) -> Result<(), CommitError> {
        info!("CLEAN");
        Ok(())
    }
}
