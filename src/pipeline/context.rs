//! Contexts passed through the three crawler pipelines
//!
//! Each context is short-lived: built for one reference, consumed by one
//! pipeline run and handed back in the outcome. The session gives stages
//! access to the crawler-wide services.

use crate::crawler::CrawlSession;
use crate::doc::{DocContext, Document};
use std::sync::Arc;

pub struct QueuePipelineContext {
    pub session: Arc<CrawlSession>,
    pub doc: DocContext,
}

impl QueuePipelineContext {
    pub fn new(session: Arc<CrawlSession>, doc: DocContext) -> Self {
        Self { session, doc }
    }
}

/// How the import of one document ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImporterStatus {
    Success,
    Rejected,
    Error,
}

/// Result of the importer pipeline for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImporterResponse {
    pub reference: String,
    pub status: ImporterStatus,
    pub message: Option<String>,
}

impl ImporterResponse {
    pub fn success(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            status: ImporterStatus::Success,
            message: None,
        }
    }

    pub fn rejected(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            status: ImporterStatus::Rejected,
            message: Some(message.into()),
        }
    }

    pub fn error(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            status: ImporterStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ImporterStatus::Success
    }
}

pub struct ImporterPipelineContext {
    pub session: Arc<CrawlSession>,
    pub document: Document,
    /// Record of the same reference from the previous session
    pub cached: Option<DocContext>,
    /// References discovered by the fetcher
    pub children: Vec<String>,
    /// Set by the stage that accepts or rejects the document
    pub response: Option<ImporterResponse>,
}

impl ImporterPipelineContext {
    pub fn new(session: Arc<CrawlSession>, doc: DocContext, cached: Option<DocContext>) -> Self {
        Self {
            session,
            document: Document::new(doc),
            cached,
            children: Vec::new(),
            response: None,
        }
    }

    /// Records a rejection as the importer response
    pub fn reject(&mut self, message: impl Into<String>) {
        let response = ImporterResponse::rejected(self.document.reference(), message);
        self.response = Some(response);
    }
}

pub struct CommitterPipelineContext {
    pub session: Arc<CrawlSession>,
    pub document: Document,
    pub cached: Option<DocContext>,
}

impl CommitterPipelineContext {
    pub fn new(session: Arc<CrawlSession>, document: Document, cached: Option<DocContext>) -> Self {
        Self {
            session,
            document,
            cached,
        }
    }
}

impl From<ImporterPipelineContext> for CommitterPipelineContext {
    fn from(ctx: ImporterPipelineContext) -> Self {
        Self::new(ctx.session, ctx.document, ctx.cached)
    }
}
