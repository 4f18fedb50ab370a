//! Queue pipeline: decides whether a reference enters the queue

use crate::doc::DocState;
use crate::event::{CrawlerEvent, DOCUMENT_QUEUED, REJECTED_FILTER, REJECTED_TOO_DEEP};
use crate::pipeline::{Pipeline, QueuePipelineContext, Stage};
use tracing::debug;

/// Rejects references deeper than the configured maximum
pub struct DepthValidationStage {
    max_depth: Option<u32>,
}

impl DepthValidationStage {
    pub fn new(max_depth: Option<u32>) -> Self {
        Self { max_depth }
    }
}

impl Stage<QueuePipelineContext> for DepthValidationStage {
    fn name(&self) -> &str {
        "depth-validation"
    }

    fn execute(&self, ctx: &mut QueuePipelineContext) -> crate::Result<bool> {
        match self.max_depth {
            Some(max) if ctx.doc.depth > max => {
                debug!(
                    "Too deep: {} (depth {} > {})",
                    ctx.doc.reference, ctx.doc.depth, max
                );
                ctx.doc.set_state(DocState::TooDeep);
                ctx.session.fire(
                    CrawlerEvent::for_doc(REJECTED_TOO_DEEP, &ctx.doc)
                        .with_message(format!("max depth is {}", max)),
                );
                Ok(false)
            }
            _ => Ok(true),
        }
    }
}

/// Applies the reference include/exclude filters
pub struct ReferenceFiltersStage;

impl Stage<QueuePipelineContext> for ReferenceFiltersStage {
    fn name(&self) -> &str {
        "reference-filters"
    }

    fn execute(&self, ctx: &mut QueuePipelineContext) -> crate::Result<bool> {
        if ctx.session.filters().accepts_reference(&ctx.doc.reference) {
            return Ok(true);
        }
        ctx.doc.set_state(DocState::Rejected);
        ctx.session.fire(
            CrawlerEvent::for_doc(REJECTED_FILTER, &ctx.doc).with_message("reference filtered out"),
        );
        Ok(false)
    }
}

/// Adds the reference to the shared queue
///
/// Queuing a reference already queued, in progress or processed this session
/// is a no-op.
pub struct QueueReferenceStage;

impl Stage<QueuePipelineContext> for QueueReferenceStage {
    fn name(&self) -> &str {
        "queue-reference"
    }

    fn execute(&self, ctx: &mut QueuePipelineContext) -> crate::Result<bool> {
        if ctx.session.ledger().queue(&ctx.doc)? {
            ctx.session.fire(CrawlerEvent::for_doc(DOCUMENT_QUEUED, &ctx.doc));
        } else {
            debug!("Already known, not queued again: {}", ctx.doc.reference);
        }
        Ok(true)
    }
}

pub fn queue_pipeline(max_depth: Option<u32>) -> Pipeline<QueuePipelineContext> {
    Pipeline::builder("queue")
        .stage(DepthValidationStage::new(max_depth))
        .stage(ReferenceFiltersStage)
        .stage(QueueReferenceStage)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::DocContext;
    use crate::pipeline::tests::test_session;

    #[test]
    fn test_depth_limit_is_inclusive() {
        let session = test_session(|_| {});
        let stage = DepthValidationStage::new(Some(10));

        let mut at_limit = QueuePipelineContext::new(session.clone(), DocContext::new("a", 10));
        assert!(stage.execute(&mut at_limit).unwrap());
        assert_eq!(at_limit.doc.state(), None);

        let mut too_deep = QueuePipelineContext::new(session, DocContext::new("b", 11));
        assert!(!stage.execute(&mut too_deep).unwrap());
        assert_eq!(too_deep.doc.state(), Some(DocState::TooDeep));
    }

    #[test]
    fn test_queuing_twice_keeps_one_entry() {
        let session = test_session(|_| {});
        let pipeline = queue_pipeline(None);

        for _ in 0..2 {
            let ctx = QueuePipelineContext::new(session.clone(), DocContext::new("/docs/a.txt", 0));
            assert!(pipeline.run(ctx).unwrap().accepted);
        }

        assert_eq!(session.ledger().queued_count().unwrap(), 1);
        assert_eq!(session.monitor().snapshot().queued, 1);
    }

    #[test]
    fn test_filtered_reference_is_not_queued() {
        let session = test_session(|config| {
            config.filters.reference_excludes = vec![r"\.png$".to_string()];
        });
        let ctx = QueuePipelineContext::new(session.clone(), DocContext::new("logo.png", 0));
        let outcome = queue_pipeline(None).run(ctx).unwrap();

        assert!(!outcome.accepted);
        assert_eq!(outcome.stopped_at.as_deref(), Some("reference-filters"));
        assert_eq!(outcome.context.doc.state(), Some(DocState::Rejected));
        assert_eq!(session.ledger().queued_count().unwrap(), 0);
    }
}
