//! In-session deduplication
//!
//! Tracks which reference first produced a given checksum. The check and the
//! insert are one `save_if_absent` call on the shared store, so two documents
//! with the same checksum processed at the same time cannot both be tracked.

use crate::doc::DocContext;
use crate::store::{DataStore, DataStoreEngine, StoreResult};
use std::sync::Arc;

/// Checksum to first-seen reference indexes for one crawler
pub struct DedupService {
    metadata: Option<Arc<dyn DataStore>>,
    document: Option<Arc<dyn DataStore>>,
}

impl DedupService {
    /// Opens the indexes that are enabled for this crawler
    pub fn open(
        engine: &dyn DataStoreEngine,
        crawler_id: &str,
        metadata_dedup: bool,
        document_dedup: bool,
    ) -> StoreResult<Self> {
        let metadata = if metadata_dedup {
            Some(engine.open_store(&format!("{}-dedup-metadata", crawler_id))?)
        } else {
            None
        };
        let document = if document_dedup {
            Some(engine.open_store(&format!("{}-dedup-document", crawler_id))?)
        } else {
            None
        };
        Ok(Self { metadata, document })
    }

    /// Service with both indexes disabled
    pub fn disabled() -> Self {
        Self {
            metadata: None,
            document: None,
        }
    }

    pub fn is_metadata_enabled(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn is_document_enabled(&self) -> bool {
        self.document.is_some()
    }

    /// Returns the reference that first produced this metadata checksum
    ///
    /// `None` means the document is unique so far (and is now tracked), has no
    /// metadata checksum, or metadata dedup is disabled.
    pub fn find_or_track_metadata(&self, doc: &DocContext) -> StoreResult<Option<String>> {
        match (&self.metadata, doc.metadata_checksum.as_deref()) {
            (Some(store), Some(checksum)) => find_or_track(store.as_ref(), checksum, &doc.reference),
            _ => Ok(None),
        }
    }

    /// Returns the reference that first produced this content checksum
    pub fn find_or_track_document(&self, doc: &DocContext) -> StoreResult<Option<String>> {
        match (&self.document, doc.content_checksum.as_deref()) {
            (Some(store), Some(checksum)) => find_or_track(store.as_ref(), checksum, &doc.reference),
            _ => Ok(None),
        }
    }

    /// Forgets every tracked checksum
    pub fn clear(&self) -> StoreResult<()> {
        for store in self.metadata.iter().chain(self.document.iter()) {
            store.clear()?;
        }
        Ok(())
    }
}

fn find_or_track(store: &dyn DataStore, checksum: &str, reference: &str) -> StoreResult<Option<String>> {
    match store.save_if_absent(checksum, reference)? {
        // the same reference seen again (e.g. after resume) is not a duplicate
        Some(first) if first == reference => Ok(None),
        Some(first) => Ok(Some(first)),
        None => Ok(None),
    }
}
