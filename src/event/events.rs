//! Crawler event names and payload

use crate::doc::{DocContext, DocState};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const CRAWLER_RUN_BEGIN: &str = "CRAWLER_RUN_BEGIN";
pub const CRAWLER_RUN_END: &str = "CRAWLER_RUN_END";
pub const CRAWLER_CRAWL_BEGIN: &str = "CRAWLER_CRAWL_BEGIN";
pub const CRAWLER_CRAWL_END: &str = "CRAWLER_CRAWL_END";
pub const CRAWLER_CLEAN_BEGIN: &str = "CRAWLER_CLEAN_BEGIN";
pub const CRAWLER_CLEAN_END: &str = "CRAWLER_CLEAN_END";
pub const CRAWLER_STOP_BEGIN: &str = "CRAWLER_STOP_BEGIN";
pub const CRAWLER_STOP_END: &str = "CRAWLER_STOP_END";
pub const CRAWLER_RESUMED: &str = "CRAWLER_RESUMED";

pub const DOCUMENT_QUEUED: &str = "DOCUMENT_QUEUED";
pub const DOCUMENT_FETCHED: &str = "DOCUMENT_FETCHED";
pub const DOCUMENT_IMPORTED: &str = "DOCUMENT_IMPORTED";
pub const DOCUMENT_PROCESSED: &str = "DOCUMENT_PROCESSED";
pub const DOCUMENT_COMMITTED_UPSERT: &str = "DOCUMENT_COMMITTED_UPSERT";
pub const DOCUMENT_COMMITTED_DELETE: &str = "DOCUMENT_COMMITTED_DELETE";

pub const REJECTED_TOO_DEEP: &str = "REJECTED_TOO_DEEP";
pub const REJECTED_FILTER: &str = "REJECTED_FILTER";
pub const REJECTED_UNMODIFIED: &str = "REJECTED_UNMODIFIED";
pub const REJECTED_DUPLICATE: &str = "REJECTED_DUPLICATE";
pub const REJECTED_NOTFOUND: &str = "REJECTED_NOTFOUND";
pub const REJECTED_BAD_STATUS: &str = "REJECTED_BAD_STATUS";
pub const REJECTED_ERROR: &str = "REJECTED_ERROR";
pub const REJECTED_GRACE: &str = "REJECTED_GRACE";
pub const REJECTED_ORPHAN: &str = "REJECTED_ORPHAN";

/// Something that happened during a crawl
#[derive(Debug, Clone, Serialize)]
pub struct CrawlerEvent {
    pub name: String,
    pub reference: Option<String>,
    pub state: Option<DocState>,
    pub message: Option<String>,
    /// Grid node the event was fired on
    pub node: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CrawlerEvent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reference: None,
            state: None,
            message: None,
            node: None,
            timestamp: Utc::now(),
        }
    }

    /// Event about one document, carrying its reference and current state
    pub fn for_doc(name: &str, doc: &DocContext) -> Self {
        let mut event = Self::new(name);
        event.reference = Some(doc.reference.clone());
        event.state = doc.state();
        event
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// True for every `REJECTED_*` event
    pub fn is_rejection(&self) -> bool {
        self.name.starts_with("REJECTED_")
    }
}
