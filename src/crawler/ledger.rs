//! Document ledger
//!
//! Four stores per crawler track every reference of a session:
//! - `queued`: waiting for a worker on any node
//! - `active`: taken by a worker, not finalized yet
//! - `processed`: finalized this session
//! - `cached`: the `processed` records of the previous session
//!
//! All nodes of a grid share the same stores, so dequeuing is a single atomic
//! `pop_first` on the shared queue.

use crate::doc::{DocContext, DocState};
use crate::store::{DataStoreEngine, StoreResult, TypedStore};
use std::collections::HashMap;
use tracing::{debug, info};

/// Entry counts of the ledger stores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStatistics {
    pub queued: u64,
    pub active: u64,
    pub processed: u64,
    pub cached: u64,
}

pub struct DocLedger {
    queued: TypedStore<DocContext>,
    active: TypedStore<DocContext>,
    processed: TypedStore<DocContext>,
    cached: TypedStore<DocContext>,
}

impl DocLedger {
    pub fn open(engine: &dyn DataStoreEngine, crawler_id: &str) -> StoreResult<Self> {
        let open = |suffix: &str| -> StoreResult<TypedStore<DocContext>> {
            Ok(TypedStore::new(
                engine.open_store(&format!("{}-{}", crawler_id, suffix))?,
            ))
        };
        Ok(Self {
            queued: open("queued")?,
            active: open("active")?,
            processed: open("processed")?,
            cached: open("cached")?,
        })
    }

    /// Prepares the stores for a new session
    ///
    /// With `resume` on and references still queued or active, the previous
    /// session carries on: active references go back to the queue. Otherwise
    /// the previous session's processed records become the cache.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - An interrupted session is resumed
    /// * `Ok(false)` - A new session starts
    pub fn prepare_session(&self, resume: bool) -> StoreResult<bool> {
        let interrupted = !self.queued.is_empty()? || !self.active.is_empty()?;

        if resume && interrupted {
            let active = self.active.values()?;
            for doc in &active {
                self.queued.save(&doc.reference, doc)?;
            }
            self.active.clear()?;
            info!(
                "Resuming session: {} queued ({} were in progress), {} processed",
                self.queued.count()?,
                active.len(),
                self.processed.count()?
            );
            return Ok(true);
        }

        self.cached.clear()?;
        for doc in self.processed.values()? {
            self.cached.save(&doc.reference, &doc)?;
        }
        self.processed.clear()?;
        self.queued.clear()?;
        self.active.clear()?;
        info!("New session: {} references cached from the previous one", self.cached.count()?);
        Ok(false)
    }

    /// Queues a reference unless this session already knows it
    ///
    /// Returns true if the reference was added.
    pub fn queue(&self, doc: &DocContext) -> StoreResult<bool> {
        if self.processed.exists(&doc.reference)? || self.active.exists(&doc.reference)? {
            return Ok(false);
        }
        Ok(self.queued.save_if_absent(&doc.reference, doc)?.is_none())
    }

    /// Takes the oldest queued reference and marks it active
    pub fn next_queued(&self) -> StoreResult<Option<DocContext>> {
        while let Some((reference, doc)) = self.queued.pop_first()? {
            if self.processed.exists(&reference)? {
                debug!("Skipping already processed reference: {}", reference);
                continue;
            }
            self.active.save(&reference, &doc)?;
            return Ok(Some(doc));
        }
        Ok(None)
    }

    pub fn mark_processed(&self, doc: &DocContext) -> StoreResult<()> {
        self.processed.save(&doc.reference, doc)?;
        self.active.delete(&doc.reference)?;
        Ok(())
    }

    /// Record of a reference from the previous session
    pub fn cached(&self, reference: &str) -> StoreResult<Option<DocContext>> {
        self.cached.find(reference)
    }

    pub fn remove_cached(&self, reference: &str) -> StoreResult<bool> {
        self.cached.delete(reference)
    }

    pub fn processed(&self, reference: &str) -> StoreResult<Option<DocContext>> {
        self.processed.find(reference)
    }

    /// Cached references this session has not seen
    ///
    /// References deleted in an earlier session are left out.
    pub fn orphans(&self) -> StoreResult<Vec<DocContext>> {
        let mut orphans = Vec::new();
        for doc in self.cached.values()? {
            if doc.state() == Some(DocState::Deleted) {
                continue;
            }
            if self.processed.exists(&doc.reference)?
                || self.queued.exists(&doc.reference)?
                || self.active.exists(&doc.reference)?
            {
                continue;
            }
            orphans.push(doc);
        }
        Ok(orphans)
    }

    pub fn queued_count(&self) -> StoreResult<u64> {
        self.queued.count()
    }

    pub fn active_count(&self) -> StoreResult<u64> {
        self.active.count()
    }

    pub fn processed_count(&self) -> StoreResult<u64> {
        self.processed.count()
    }

    /// Nothing queued and nothing in progress on any node
    pub fn is_drained(&self) -> StoreResult<bool> {
        Ok(self.queued.is_empty()? && self.active.is_empty()?)
    }

    pub fn statistics(&self) -> StoreResult<LedgerStatistics> {
        Ok(LedgerStatistics {
            queued: self.queued.count()?,
            active: self.active.count()?,
            processed: self.processed.count()?,
            cached: self.cached.count()?,
        })
    }

    /// Processed references of this session per final state
    pub fn processed_by_state(&self) -> StoreResult<HashMap<DocState, u64>> {
        let mut counts = HashMap::new();
        for doc in self.processed.values()? {
            if let Some(state) = doc.state() {
                *counts.entry(state).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Forgets every reference, current and previous sessions alike
    pub fn clean(&self) -> StoreResult<()> {
        for store in [&self.queued, &self.active, &self.processed, &self.cached] {
            store.clear()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEngine;

    fn ledger() -> DocLedger {
        DocLedger::open(&MemoryEngine::new(), "test").unwrap()
    }

    fn processed(reference: &str, state: DocState) -> DocContext {
        let mut doc = DocContext::new(reference, 0);
        doc.set_state(state);
        doc
    }

    #[test]
    fn test_queue_is_idempotent() {
        let ledger = ledger();
        let doc = DocContext::new("a", 0);

        assert!(ledger.queue(&doc).unwrap());
        assert!(!ledger.queue(&doc).unwrap());
        assert_eq!(ledger.queued_count().unwrap(), 1);

        let taken = ledger.next_queued().unwrap().unwrap();
        assert!(!ledger.queue(&doc).unwrap());
        ledger.mark_processed(&taken).unwrap();
        assert!(!ledger.queue(&doc).unwrap());
        assert!(ledger.is_drained().unwrap());
    }

    #[test]
    fn test_dequeue_in_insertion_order() {
        let ledger = ledger();
        for reference in ["c", "a", "b"] {
            ledger.queue(&DocContext::new(reference, 0)).unwrap();
        }
        let order: Vec<String> = std::iter::from_fn(|| ledger.next_queued().unwrap())
            .map(|d| d.reference)
            .collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(ledger.active_count().unwrap(), 3);
    }

    #[test]
    fn test_new_session_moves_processed_to_cache() {
        let ledger = ledger();
        ledger.mark_processed(&processed("a", DocState::New)).unwrap();

        assert!(!ledger.prepare_session(true).unwrap());
        assert_eq!(ledger.processed_count().unwrap(), 0);
        assert_eq!(ledger.cached("a").unwrap().unwrap().state(), Some(DocState::New));
    }

    #[test]
    fn test_interrupted_session_resumes() {
        let ledger = ledger();
        ledger.queue(&DocContext::new("a", 0)).unwrap();
        ledger.queue(&DocContext::new("b", 0)).unwrap();
        ledger.next_queued().unwrap();

        assert!(ledger.prepare_session(true).unwrap());
        assert_eq!(ledger.queued_count().unwrap(), 2);
        assert_eq!(ledger.active_count().unwrap(), 0);
    }

    #[test]
    fn test_resume_disabled_starts_over() {
        let ledger = ledger();
        ledger.queue(&DocContext::new("a", 0)).unwrap();

        assert!(!ledger.prepare_session(false).unwrap());
        assert_eq!(ledger.queued_count().unwrap(), 0);
    }

    #[test]
    fn test_orphans() {
        let ledger = ledger();
        ledger.mark_processed(&processed("kept", DocState::New)).unwrap();
        ledger.mark_processed(&processed("gone", DocState::Modified)).unwrap();
        ledger.mark_processed(&processed("deleted", DocState::Deleted)).unwrap();
        ledger.prepare_session(true).unwrap();

        ledger.mark_processed(&processed("kept", DocState::Unmodified)).unwrap();
        assert_eq!(
            ledger.processed_by_state().unwrap().get(&DocState::Unmodified),
            Some(&1)
        );
        let orphans: Vec<String> = ledger.orphans().unwrap().into_iter().map(|d| d.reference).collect();
        assert_eq!(orphans, vec!["gone"]);
    }

    #[test]
    fn test_clean() {
        let ledger = ledger();
        ledger.mark_processed(&processed("a", DocState::New)).unwrap();
        ledger.prepare_session(false).unwrap();
        ledger.queue(&DocContext::new("b", 0)).unwrap();

        ledger.clean().unwrap();
        assert_eq!(ledger.statistics().unwrap(), LedgerStatistics::default());
    }
}
