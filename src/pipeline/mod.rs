//! Pipeline engine
//!
//! A pipeline is an ordered chain of predicate stages over a context. Stages
//! run strictly in order; a stage returning `false` stops the chain for that
//! invocation. An optional adapter replaces the context before the first
//! stage runs, and any stage may replace it by assigning through its `&mut`.
//!
//! The crawler instantiates it three times:
//! - `queue`: depth validation, reference filters, enqueue
//! - `importer`: fetch, children, metadata checksum/dedup/filters, import
//! - `committer`: document checksum/dedup, pre-commit metadata, commit

mod committer;
mod context;
mod filters;
mod importer;
mod queue;

pub use committer::{
    committer_pipeline, CommitModuleStage, DocumentChecksumStage, DocumentDedupStage,
    PreCommitStage,
};
pub use context::{
    CommitterPipelineContext, ImporterPipelineContext, ImporterResponse, ImporterStatus,
    QueuePipelineContext,
};
pub use filters::DocumentFilters;
pub use importer::{
    importer_pipeline, FetchStage, ImportStage, ImporterPipeline, MetadataChecksumStage,
    MetadataDedupStage, MetadataFiltersStage, QueueChildrenStage,
};
pub use queue::{queue_pipeline, DepthValidationStage, QueueReferenceStage, ReferenceFiltersStage};

use crate::CrawlError;
use tracing::trace;

/// One predicate step of a pipeline
pub trait Stage<C>: Send + Sync {
    fn name(&self) -> &str;

    /// Returns false to stop the remaining stages for this context
    fn execute(&self, ctx: &mut C) -> crate::Result<bool>;
}

/// A stage built from a closure
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> FnStage<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<C, F> Stage<C> for FnStage<F>
where
    F: Fn(&mut C) -> crate::Result<bool> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut C) -> crate::Result<bool> {
        (self.f)(ctx)
    }
}

type Adapter<C> = Box<dyn Fn(C) -> C + Send + Sync>;

/// What a pipeline run leaves behind
#[derive(Debug)]
pub struct PipelineOutcome<C> {
    /// The latest context, after any replacement
    pub context: C,
    /// True when every stage accepted
    pub accepted: bool,
    /// Name of the stage that stopped the chain
    pub stopped_at: Option<String>,
}

/// Ordered predicate chain over a context type
pub struct Pipeline<C> {
    name: String,
    adapter: Option<Adapter<C>>,
    stages: Vec<Box<dyn Stage<C>>>,
}

impl<C> Pipeline<C> {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<C> {
        PipelineBuilder {
            pipeline: Pipeline {
                name: name.into(),
                adapter: None,
                stages: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs the chain over `ctx`
    ///
    /// Stage errors are not caught here; they reach the caller tagged with the
    /// failing stage name.
    pub fn run(&self, ctx: C) -> crate::Result<PipelineOutcome<C>> {
        let mut ctx = match &self.adapter {
            Some(adapter) => adapter(ctx),
            None => ctx,
        };

        for stage in &self.stages {
            let accepted = stage.execute(&mut ctx).map_err(|e| match e {
                CrawlError::Pipeline { .. } => e,
                other => CrawlError::Pipeline {
                    stage: format!("{}/{}", self.name, stage.name()),
                    message: other.to_string(),
                },
            })?;
            if !accepted {
                trace!("Pipeline '{}' stopped at stage '{}'", self.name, stage.name());
                return Ok(PipelineOutcome {
                    context: ctx,
                    accepted: false,
                    stopped_at: Some(stage.name().to_string()),
                });
            }
        }

        Ok(PipelineOutcome {
            context: ctx,
            accepted: true,
            stopped_at: None,
        })
    }
}

pub struct PipelineBuilder<C> {
    pipeline: Pipeline<C>,
}

impl<C> PipelineBuilder<C> {
    pub fn stage<S>(mut self, stage: S) -> Self
    where
        S: Stage<C> + 'static,
    {
        self.pipeline.stages.push(Box::new(stage));
        self
    }

    pub fn stage_fn<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut C) -> crate::Result<bool> + Send + Sync + 'static,
        C: 'static,
    {
        self.stage(FnStage::new(name, f))
    }

    /// Sets the function replacing the context before the first stage
    pub fn adapter<F>(mut self, adapter: F) -> Self
    where
        F: Fn(C) -> C + Send + Sync + 'static,
    {
        self.pipeline.adapter = Some(Box::new(adapter));
        self
    }

    pub fn build(self) -> Pipeline<C> {
        self.pipeline
    }
}
