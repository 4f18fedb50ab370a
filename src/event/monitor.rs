//! Crawl counters fed by the event bus

use crate::doc::DocState;
use crate::event::{
    CrawlerEvent, EventManager, DOCUMENT_COMMITTED_DELETE, DOCUMENT_COMMITTED_UPSERT,
    DOCUMENT_PROCESSED, DOCUMENT_QUEUED, REJECTED_ERROR,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStatistics {
    /// References accepted by the queue pipeline
    pub queued: u64,

    /// References that went through the whole document lifecycle
    pub processed: u64,

    pub upserted: u64,

    pub deleted: u64,

    /// Every `REJECTED_*` event, grace notices included
    pub rejected: u64,

    pub errors: u64,

    /// Final state of processed references
    pub by_state: HashMap<DocState, u64>,
}

/// Counts crawler events for the current session
#[derive(Debug, Default)]
pub struct CrawlerMonitor {
    queued: AtomicU64,
    processed: AtomicU64,
    upserted: AtomicU64,
    deleted: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
    by_state: Mutex<HashMap<DocState, u64>>,
}

impl CrawlerMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the monitor as a listener of `events`
    pub fn attach(self: &Arc<Self>, events: &EventManager) {
        let monitor = Arc::clone(self);
        events.add_listener(move |event| monitor.record(event));
    }

    pub fn record(&self, event: &CrawlerEvent) {
        match event.name.as_str() {
            DOCUMENT_QUEUED => {
                self.queued.fetch_add(1, Ordering::Relaxed);
            }
            DOCUMENT_COMMITTED_UPSERT => {
                self.upserted.fetch_add(1, Ordering::Relaxed);
            }
            DOCUMENT_COMMITTED_DELETE => {
                self.deleted.fetch_add(1, Ordering::Relaxed);
            }
            DOCUMENT_PROCESSED => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                if let Some(state) = event.state {
                    let mut by_state = match self.by_state.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    *by_state.entry(state).or_insert(0) += 1;
                }
            }
            _ if event.is_rejection() => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                if event.is(REJECTED_ERROR) {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            _ => {}
        }
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CrawlStatistics {
        let by_state = match self.by_state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        CrawlStatistics {
            queued: self.queued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            upserted: self.upserted.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            by_state,
        }
    }

    /// Zeroes every counter at session start
    pub fn reset(&self) {
        for counter in [
            &self.queued,
            &self.processed,
            &self.upserted,
            &self.deleted,
            &self.rejected,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        match self.by_state.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Queued: {}", stats.queued);
    println!("  Processed: {}", stats.processed);
    println!("  Committed (upsert): {}", stats.upserted);
    println!("  Committed (delete): {}", stats.deleted);
    println!("  Rejections: {}", stats.rejected);
    println!("  Errors: {}", stats.errors);
    println!();

    if !stats.by_state.is_empty() {
        println!("Documents by State:");
        let mut state_counts: Vec<_> = stats.by_state.iter().collect();
        state_counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.to_db_string().cmp(b.0.to_db_string())));

        for (state, count) in state_counts {
            let percentage = if stats.processed > 0 {
                (*count as f64 / stats.processed as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", state, count, percentage);
        }
        println!();
    }

    let good: u64 = stats
        .by_state
        .iter()
        .filter(|(state, _)| state.is_good_state())
        .map(|(_, count)| count)
        .sum();
    let success_rate = if stats.processed > 0 {
        (good as f64 / stats.processed as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} documents in a good state)",
        success_rate, good, stats.processed
    );
}
