//! Importer pipeline: fetch a queued reference and decide whether it goes on
//! to the committer

use crate::checksum::{resolve_checksum, ChecksumKind};
use crate::doc::DocState;
use crate::event::{
    CrawlerEvent, DOCUMENT_FETCHED, DOCUMENT_IMPORTED, REJECTED_BAD_STATUS, REJECTED_DUPLICATE,
    REJECTED_FILTER, REJECTED_NOTFOUND,
};
use crate::fetch::{FetchRequest, FetchStatus};
use crate::pipeline::{ImporterPipelineContext, ImporterResponse, Pipeline, Stage};
use tracing::debug;

pub struct FetchStage;

impl Stage<ImporterPipelineContext> for FetchStage {
    fn name(&self) -> &str {
        "fetch"
    }

    fn execute(&self, ctx: &mut ImporterPipelineContext) -> crate::Result<bool> {
        let request = FetchRequest::for_doc(&ctx.document.context);
        let response = ctx.session.fetcher().fetch(&request)?;

        let (state, event) = match response.status {
            FetchStatus::Ok => {
                ctx.document.content = response.content;
                ctx.document.metadata.extend(response.metadata);
                ctx.children = response.children;
                ctx.session
                    .fire(CrawlerEvent::for_doc(DOCUMENT_FETCHED, &ctx.document.context));
                return Ok(true);
            }
            FetchStatus::NotFound => (DocState::NotFound, REJECTED_NOTFOUND),
            FetchStatus::BadStatus => (DocState::BadStatus, REJECTED_BAD_STATUS),
        };

        let message = response.message.unwrap_or_else(|| state.to_string());
        ctx.document.context.set_state(state);
        ctx.session.fire(
            CrawlerEvent::for_doc(event, &ctx.document.context).with_message(message.clone()),
        );
        ctx.reject(message);
        Ok(false)
    }
}

/// Queues the references the fetcher discovered, one level deeper
pub struct QueueChildrenStage;

impl Stage<ImporterPipelineContext> for QueueChildrenStage {
    fn name(&self) -> &str {
        "queue-children"
    }

    fn execute(&self, ctx: &mut ImporterPipelineContext) -> crate::Result<bool> {
        let children = std::mem::take(&mut ctx.children);
        if !children.is_empty() {
            debug!(
                "Queuing {} children of {}",
                children.len(),
                ctx.document.reference()
            );
        }
        for child in &children {
            let doc = ctx.document.context.child(child.as_str());
            ctx.session.queue_reference(doc)?;
        }
        ctx.children = children;
        Ok(true)
    }
}

pub struct MetadataChecksumStage;

impl Stage<ImporterPipelineContext> for MetadataChecksumStage {
    fn name(&self) -> &str {
        "metadata-checksum"
    }

    fn execute(&self, ctx: &mut ImporterPipelineContext) -> crate::Result<bool> {
        let Some(setup) = ctx.session.metadata_checksum() else {
            return Ok(true);
        };

        let checksum = setup
            .checksummer
            .create_metadata_checksum(&ctx.document.metadata);
        if setup.keep {
            if let Some(checksum) = &checksum {
                ctx.document.metadata.set(setup.to_field.as_str(), checksum.as_str());
            }
        }

        let accepted = resolve_checksum(
            &mut ctx.document.context,
            ctx.cached.as_ref(),
            checksum,
            ChecksumKind::Metadata,
            ctx.session.config().crawler.process_unmodified,
            ctx.session.events(),
        );
        if !accepted {
            ctx.reject("metadata unmodified");
        }
        Ok(accepted)
    }
}

pub struct MetadataDedupStage;

impl Stage<ImporterPipelineContext> for MetadataDedupStage {
    fn name(&self) -> &str {
        "metadata-dedup"
    }

    fn execute(&self, ctx: &mut ImporterPipelineContext) -> crate::Result<bool> {
        let Some(original) = ctx
            .session
            .dedup()
            .find_or_track_metadata(&ctx.document.context)?
        else {
            return Ok(true);
        };

        let message = format!("duplicate metadata of {}", original);
        ctx.document.context.set_state(DocState::Rejected);
        ctx.session.fire(
            CrawlerEvent::for_doc(REJECTED_DUPLICATE, &ctx.document.context)
                .with_message(message.clone()),
        );
        ctx.reject(message);
        Ok(false)
    }
}

pub struct MetadataFiltersStage;

impl Stage<ImporterPipelineContext> for MetadataFiltersStage {
    fn name(&self) -> &str {
        "metadata-filters"
    }

    fn execute(&self, ctx: &mut ImporterPipelineContext) -> crate::Result<bool> {
        if ctx.session.filters().accepts_metadata(&ctx.document.metadata) {
            return Ok(true);
        }
        ctx.document.context.set_state(DocState::Rejected);
        ctx.session.fire(
            CrawlerEvent::for_doc(REJECTED_FILTER, &ctx.document.context)
                .with_message("metadata filtered out"),
        );
        ctx.reject("metadata filtered out");
        Ok(false)
    }
}

/// Marks the document as imported
pub struct ImportStage;

impl Stage<ImporterPipelineContext> for ImportStage {
    fn name(&self) -> &str {
        "import"
    }

    fn execute(&self, ctx: &mut ImporterPipelineContext) -> crate::Result<bool> {
        ctx.response = Some(ImporterResponse::success(ctx.document.reference()));
        ctx.session
            .fire(CrawlerEvent::for_doc(DOCUMENT_IMPORTED, &ctx.document.context));
        Ok(true)
    }
}

/// The importer pipeline, returning a response extracted from the final context
pub struct ImporterPipeline {
    pipeline: Pipeline<ImporterPipelineContext>,
}

impl ImporterPipeline {
    pub fn new(pipeline: Pipeline<ImporterPipelineContext>) -> Self {
        Self { pipeline }
    }

    /// Runs the stages and returns the response along with the final context
    ///
    /// A chain stopped without a response set is reported as a rejection
    /// naming the stage that stopped it.
    pub fn run(
        &self,
        ctx: ImporterPipelineContext,
    ) -> crate::Result<(ImporterResponse, ImporterPipelineContext)> {
        let outcome = self.pipeline.run(ctx)?;
        let mut ctx = outcome.context;

        let response = match ctx.response.clone() {
            Some(response) => response,
            None => {
                let stage = outcome.stopped_at.unwrap_or_else(|| "end".to_string());
                ImporterResponse::rejected(
                    ctx.document.reference(),
                    format!("rejected at stage '{}'", stage),
                )
            }
        };
        ctx.response = Some(response.clone());
        Ok((response, ctx))
    }
}

pub fn importer_pipeline() -> ImporterPipeline {
    ImporterPipeline::new(
        Pipeline::builder("importer")
            .stage(FetchStage)
            .stage(QueueChildrenStage)
            .stage(MetadataChecksumStage)
            .stage(MetadataDedupStage)
            .stage(MetadataFiltersStage)
            .stage(ImportStage)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetadataChecksumConfig;
    use crate::doc::DocContext;
    use crate::pipeline::tests::test_session;
    use crate::pipeline::ImporterStatus;
    use std::fs;
    use tempfile::TempDir;

    fn reference(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn test_import_queues_children_of_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        let session = test_session(|_| {});

        let root = DocContext::new(dir.path().to_string_lossy(), 0);
        let ctx = ImporterPipelineContext::new(session.clone(), root, None);
        let (response, ctx) = importer_pipeline().run(ctx).unwrap();

        assert!(response.is_success());
        assert_eq!(ctx.children.len(), 2);
        assert_eq!(session.ledger().queued_count().unwrap(), 2);
    }

    #[test]
    fn test_missing_file_is_rejected_not_found() {
        let dir = TempDir::new().unwrap();
        let session = test_session(|_| {});

        let doc = DocContext::new(reference(&dir, "missing.txt"), 0);
        let ctx = ImporterPipelineContext::new(session, doc, None);
        let (response, ctx) = importer_pipeline().run(ctx).unwrap();

        assert_eq!(response.status, ImporterStatus::Rejected);
        assert_eq!(ctx.document.context.state(), Some(DocState::NotFound));
    }

    #[test]
    fn test_unchanged_metadata_is_rejected_unmodified() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let session = test_session(|config| {
            config.checksum.metadata = Some(MetadataChecksumConfig {
                fields: vec!["file.size".to_string()],
                keep: true,
                ..MetadataChecksumConfig::default()
            });
        });
        let pipeline = importer_pipeline();

        let first = ImporterPipelineContext::new(
            session.clone(),
            DocContext::new(reference(&dir, "a.txt"), 0),
            None,
        );
        let (response, first) = pipeline.run(first).unwrap();
        assert!(response.is_success());
        assert_eq!(first.document.context.state(), Some(DocState::New));
        assert_eq!(
            first.document.metadata.get("crawl.checksum-metadata"),
            Some("file.size=1;")
        );

        let cached = first.document.context.clone();
        let second = ImporterPipelineContext::new(
            session,
            DocContext::new(reference(&dir, "a.txt"), 0),
            Some(cached),
        );
        let (response, second) = pipeline.run(second).unwrap();
        assert_eq!(response.status, ImporterStatus::Rejected);
        assert_eq!(second.document.context.state(), Some(DocState::Unmodified));
    }
}
