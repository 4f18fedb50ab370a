//! Committer pipeline: final checks before a document reaches the committer

use crate::checksum::{resolve_checksum, ChecksumKind};
use crate::doc::DocState;
use crate::event::{CrawlerEvent, DOCUMENT_COMMITTED_UPSERT, REJECTED_DUPLICATE};
use crate::pipeline::{CommitterPipelineContext, Pipeline, Stage};
use tracing::debug;

/// Resolves NEW / MODIFIED / UNMODIFIED from the document checksum
///
/// Runs even without a document checksummer, so every committed document
/// ends with a good state.
pub struct DocumentChecksumStage;

impl Stage<CommitterPipelineContext> for DocumentChecksumStage {
    fn name(&self) -> &str {
        "document-checksum"
    }

    fn execute(&self, ctx: &mut CommitterPipelineContext) -> crate::Result<bool> {
        let checksum = match ctx.session.document_checksum() {
            Some(setup) => {
                let checksum = setup.checksummer.create_document_checksum(&ctx.document);
                if setup.keep {
                    if let Some(checksum) = &checksum {
                        ctx.document.metadata.set(setup.to_field.as_str(), checksum.as_str());
                    }
                }
                checksum
            }
            None => None,
        };

        Ok(resolve_checksum(
            &mut ctx.document.context,
            ctx.cached.as_ref(),
            checksum,
            ChecksumKind::Document,
            ctx.session.config().crawler.process_unmodified,
            ctx.session.events(),
        ))
    }
}

/// Rejects a document whose content checksum was already seen this session
pub struct DocumentDedupStage;

impl Stage<CommitterPipelineContext> for DocumentDedupStage {
    fn name(&self) -> &str {
        "document-dedup"
    }

    fn execute(&self, ctx: &mut CommitterPipelineContext) -> crate::Result<bool> {
        let Some(original) = ctx
            .session
            .dedup()
            .find_or_track_document(&ctx.document.context)?
        else {
            return Ok(true);
        };

        debug!("{} duplicates {}", ctx.document.reference(), original);
        ctx.document.context.set_state(DocState::Rejected);
        ctx.session.fire(
            CrawlerEvent::for_doc(REJECTED_DUPLICATE, &ctx.document.context)
                .with_message(format!("duplicate of {}", original)),
        );
        Ok(false)
    }
}

/// Adds the crawl fields committers rely on
pub struct PreCommitStage;

impl Stage<CommitterPipelineContext> for PreCommitStage {
    fn name(&self) -> &str {
        "pre-commit"
    }

    fn execute(&self, ctx: &mut CommitterPipelineContext) -> crate::Result<bool> {
        let doc = &ctx.document.context;
        let mut fields = vec![
            ("crawl.reference", doc.reference.clone()),
            ("crawl.depth", doc.depth.to_string()),
            ("crawl.crawler", ctx.session.config().crawler.id.clone()),
            ("crawl.node", ctx.session.node().to_string()),
        ];
        if let Some(state) = doc.state() {
            fields.push(("crawl.state", state.to_string()));
        }
        if let Some(parent) = &doc.parent_reference {
            fields.push(("crawl.parent-reference", parent.clone()));
        }
        if let Some(original) = &doc.original_reference {
            fields.push(("crawl.original-reference", original.clone()));
        }

        for (field, value) in fields {
            ctx.document.metadata.set(field, value);
        }
        Ok(true)
    }
}

/// Hands the document to the committer
pub struct CommitModuleStage;

impl Stage<CommitterPipelineContext> for CommitModuleStage {
    fn name(&self) -> &str {
        "commit"
    }

    fn execute(&self, ctx: &mut CommitterPipelineContext) -> crate::Result<bool> {
        if ctx.document.context.is_rejected() {
            return Ok(false);
        }
        ctx.session.committer().upsert(&ctx.document)?;
        ctx.session.fire(CrawlerEvent::for_doc(
            DOCUMENT_COMMITTED_UPSERT,
            &ctx.document.context,
        ));
        Ok(true)
    }
}

pub fn committer_pipeline() -> Pipeline<CommitterPipelineContext> {
    Pipeline::builder("committer")
        .stage(DocumentChecksumStage)
        .stage(DocumentDedupStage)
        .stage(PreCommitStage)
        .stage(CommitModuleStage)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committer::MemoryCommitter;
    use crate::config::DocumentChecksumConfig;
    use crate::crawler::CrawlSession;
    use crate::doc::{DocContext, Document};
    use crate::event::REJECTED_UNMODIFIED;
    use std::sync::{Arc, Mutex};

    struct Fixture {
        session: Arc<CrawlSession>,
        committer: MemoryCommitter,
        events: Arc<Mutex<Vec<String>>>,
    }

    fn fixture(process_unmodified: bool) -> Fixture {
        let committer = MemoryCommitter::new();
        let shared = committer.clone();
        let session = crate::pipeline::tests::test_session_with(
            |config| {
                config.crawler.process_unmodified = process_unmodified;
                config.checksum.document = Some(DocumentChecksumConfig {
                    keep: true,
                    deduplicate: true,
                    ..DocumentChecksumConfig::default()
                });
            },
            Some(Arc::new(shared)),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = events.clone();
        session
            .events()
            .add_listener(move |e| recorded.lock().unwrap().push(e.name.clone()));
        Fixture {
            session,
            committer,
            events,
        }
    }

    fn document(reference: &str, content: &str) -> Document {
        let mut document = Document::new(DocContext::new(reference, 1));
        document.content = content.as_bytes().to_vec();
        document
    }

    #[test]
    fn test_new_document_is_committed_with_crawl_fields() {
        let f = fixture(false);
        let ctx = CommitterPipelineContext::new(f.session.clone(), document("a", "hello"), None);
        let outcome = committer_pipeline().run(ctx).unwrap();

        assert!(outcome.accepted);
        let metadata = &outcome.context.document.metadata;
        assert_eq!(metadata.get("crawl.state"), Some("new"));
        assert_eq!(metadata.get("crawl.depth"), Some("1"));
        assert_eq!(
            metadata.get("crawl.checksum-doc"),
            Some("5d41402abc4b2a76b9719d911017c592")
        );
        assert_eq!(f.committer.upserted(), vec!["a"]);
    }

    #[test]
    fn test_unmodified_document_is_not_committed() {
        let f = fixture(false);
        let mut cached = DocContext::new("a", 1);
        cached.content_checksum = Some("5d41402abc4b2a76b9719d911017c592".to_string());

        let ctx = CommitterPipelineContext::new(f.session.clone(), document("a", "hello"), Some(cached));
        let outcome = committer_pipeline().run(ctx).unwrap();

        assert!(!outcome.accepted);
        assert_eq!(outcome.context.document.context.state(), Some(DocState::Unmodified));
        assert!(f.committer.upserted().is_empty());
        assert!(f.events.lock().unwrap().contains(&REJECTED_UNMODIFIED.to_string()));
    }

    #[test]
    fn test_unmodified_document_committed_when_processing_unmodified() {
        let f = fixture(true);
        let mut cached = DocContext::new("a", 1);
        cached.content_checksum = Some("5d41402abc4b2a76b9719d911017c592".to_string());

        let ctx = CommitterPipelineContext::new(f.session.clone(), document("a", "hello"), Some(cached));
        assert!(committer_pipeline().run(ctx).unwrap().accepted);
        assert_eq!(f.committer.upserted(), vec!["a"]);
    }

    #[test]
    fn test_duplicate_content_is_rejected() {
        let f = fixture(false);
        let pipeline = committer_pipeline();

        let first = CommitterPipelineContext::new(f.session.clone(), document("a", "same"), None);
        assert!(pipeline.run(first).unwrap().accepted);

        let second = CommitterPipelineContext::new(f.session.clone(), document("b", "same"), None);
        let outcome = pipeline.run(second).unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.context.document.context.state(), Some(DocState::Rejected));
        assert_eq!(f.committer.upserted(), vec!["a"]);
        assert!(f.events.lock().unwrap().contains(&REJECTED_DUPLICATE.to_string()));
    }
}
