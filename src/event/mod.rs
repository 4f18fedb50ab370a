//! Crawler events
//!
//! This module handles:
//! - The well-known event names fired by pipelines, workers and commands
//! - The process-wide `EventManager` bus
//! - The `CrawlerMonitor` counters and statistics output

mod bus;
mod events;
pub mod monitor;

pub use bus::{EventListener, EventManager};
pub use events::*;
pub use monitor::{print_statistics, CrawlStatistics, CrawlerMonitor};
