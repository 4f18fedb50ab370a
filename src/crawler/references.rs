//! Start reference providers

use crate::crawler::CrawlSession;
use crate::doc::DocContext;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Source of start references
pub trait ReferencesProvider: Send + Sync {
    /// References in the order they should be queued
    fn provide_references(&self) -> crate::Result<Box<dyn Iterator<Item = String> + Send + '_>>;
}

/// References listed in the configuration
pub struct StaticReferencesProvider {
    references: Vec<String>,
}

impl StaticReferencesProvider {
    pub fn new(references: Vec<String>) -> Self {
        Self { references }
    }
}

impl ReferencesProvider for StaticReferencesProvider {
    fn provide_references(&self) -> crate::Result<Box<dyn Iterator<Item = String> + Send + '_>> {
        Ok(Box::new(self.references.iter().cloned()))
    }
}

/// References read from a file, one per line
///
/// Blank lines and lines starting with `#` are skipped.
pub struct FileReferencesProvider {
    path: PathBuf,
}

impl FileReferencesProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ReferencesProvider for FileReferencesProvider {
    fn provide_references(&self) -> crate::Result<Box<dyn Iterator<Item = String> + Send + '_>> {
        let contents = std::fs::read_to_string(&self.path)?;
        let references: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        debug!("{} references in {}", references.len(), self.path.display());
        Ok(Box::new(references.into_iter()))
    }
}

/// Queues the start references of every provider at depth 0
///
/// Providers are read concurrently, one thread each; references of one
/// provider are queued in order. Returns how many references were offered to
/// the queue pipeline.
pub fn queue_start_references(session: &Arc<CrawlSession>) -> crate::Result<u64> {
    let providers = session.providers();

    let results: Vec<crate::Result<u64>> = std::thread::scope(|scope| {
        let handles: Vec<_> = providers
            .iter()
            .map(|provider| {
                scope.spawn(move || -> crate::Result<u64> {
                    let mut offered = 0;
                    for reference in provider.provide_references()? {
                        session.queue_reference(DocContext::new(reference, 0))?;
                        offered += 1;
                    }
                    Ok(offered)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(crate::CrawlError::Pipeline {
                        stage: "start-references".to_string(),
                        message: "references provider panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    let mut total = 0;
    for result in results {
        total += result?;
    }
    info!("Offered {} start references to the queue", total);
    Ok(total)
}
