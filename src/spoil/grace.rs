use crate::spoil::SpoiledReferenceStrategy;
use crate::store::{DataStore, DataStoreEngine, StoreResult};
use chrono::Utc;
use std::sync::Arc;

/// Outcome of applying a strategy to one spoiled reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoiledAction {
    Delete,
    /// Spared this time; the grace flag is now set
    Grace,
    Ignore,
}

/// Persists the grace flags of `GraceOnce` references between sessions
pub struct GraceTracker {
    store: Arc<dyn DataStore>,
}

impl GraceTracker {
    pub fn open(engine: &dyn DataStoreEngine, crawler_id: &str) -> StoreResult<Self> {
        Ok(Self {
            store: engine.open_store(&format!("{}-grace", crawler_id))?,
        })
    }

    /// Applies `strategy` to a spoiled reference, updating its grace flag
    pub fn decide(&self, reference: &str, strategy: SpoiledReferenceStrategy) -> StoreResult<SpoiledAction> {
        match strategy {
            SpoiledReferenceStrategy::Ignore => Ok(SpoiledAction::Ignore),
            SpoiledReferenceStrategy::Delete => {
                self.store.delete(reference)?;
                Ok(SpoiledAction::Delete)
            }
            SpoiledReferenceStrategy::GraceOnce => {
                if self.store.delete(reference)? {
                    Ok(SpoiledAction::Delete)
                } else {
                    self.store.save(reference, &Utc::now().to_rfc3339())?;
                    Ok(SpoiledAction::Grace)
                }
            }
        }
    }

    pub fn is_graced(&self, reference: &str) -> StoreResult<bool> {
        self.store.exists(reference)
    }

    /// Drops the flag of a reference that recovered
    pub fn clear(&self, reference: &str) -> StoreResult<bool> {
        self.store.delete(reference)
    }

    pub fn clear_all(&self) -> StoreResult<()> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEngine;

    #[test]
    fn test_grace_once_then_delete() {
        let engine = MemoryEngine::new();
        let tracker = GraceTracker::open(&engine, "c").unwrap();

        assert_eq!(
            tracker.decide("/a", SpoiledReferenceStrategy::GraceOnce).unwrap(),
            SpoiledAction::Grace
        );
        assert!(tracker.is_graced("/a").unwrap());

        assert_eq!(
            tracker.decide("/a", SpoiledReferenceStrategy::GraceOnce).unwrap(),
            SpoiledAction::Delete
        );
        assert!(!tracker.is_graced("/a").unwrap());
    }

    #[test]
    fn test_recovery_resets_grace() {
        let engine = MemoryEngine::new();
        let tracker = GraceTracker::open(&engine, "c").unwrap();

        tracker.decide("/a", SpoiledReferenceStrategy::GraceOnce).unwrap();
        assert!(tracker.clear("/a").unwrap());
        assert_eq!(
            tracker.decide("/a", SpoiledReferenceStrategy::GraceOnce).unwrap(),
            SpoiledAction::Grace
        );
    }

    #[test]
    fn test_ignore_leaves_flag_alone() {
        let engine = MemoryEngine::new();
        let tracker = GraceTracker::open(&engine, "c").unwrap();

        tracker.decide("/a", SpoiledReferenceStrategy::GraceOnce).unwrap();
        assert_eq!(
            tracker.decide("/a", SpoiledReferenceStrategy::Ignore).unwrap(),
            SpoiledAction::Ignore
        );
        assert!(tracker.is_graced("/a").unwrap());
    }

    #[test]
    fn test_flags_survive_a_new_tracker() {
        let engine = MemoryEngine::new();
        GraceTracker::open(&engine, "c")
            .unwrap()
            .decide("/a", SpoiledReferenceStrategy::GraceOnce)
            .unwrap();

        let next_session = GraceTracker::open(&engine, "c").unwrap();
        assert!(next_session.is_graced("/a").unwrap());
        next_session.clear_all().unwrap();
        assert!(!next_session.is_graced("/a").unwrap());
    }
}
