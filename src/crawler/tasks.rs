//! Grid tasks of a crawler and the pipelines chaining them
//!
//! Handlers are registered on the node a session runs on, under names
//! prefixed with the crawler id. They hold the session weakly so a dropped
//! crawler does not outlive its handlers.

use crate::config::OrphansStrategy;
use crate::crawler::references::queue_start_references;
use crate::crawler::worker::{delete_reference, run_workers};
use crate::crawler::CrawlSession;
use crate::doc::DocContext;
use crate::event::{CrawlerEvent, CRAWLER_RESUMED, CRAWLER_RUN_BEGIN, CRAWLER_RUN_END, REJECTED_ORPHAN};
use crate::grid::{GridNode, GridPipeline, GridPipelineStage, GridResult, GridTask, RunOn, TaskContext};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

pub const INIT_TASK: &str = "crawl-init";
pub const RUN_TASK: &str = "crawl-run";
pub const ORPHANS_TASK: &str = "crawl-orphans";
pub const SHUTDOWN_TASK: &str = "crawl-shutdown";
pub const CLEAN_TASK: &str = "crawl-clean";
pub const STOP_TASK: &str = "crawl-stop";

/// Registers a handler that upgrades the session before running `f`
fn register<F, Fut>(session: &Arc<CrawlSession>, node: &GridNode, task: &str, f: F)
where
    F: Fn(Arc<CrawlSession>, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    let weak: Weak<CrawlSession> = Arc::downgrade(session);
    let f = Arc::new(f);
    node.registry().register(&session.task_name(task), move |ctx: TaskContext| {
        let weak = weak.clone();
        let f = f.clone();
        async move {
            let session = weak
                .upgrade()
                .ok_or_else(|| anyhow::anyhow!("crawler session is gone"))?;
            f(session, ctx).await
        }
    });
}

/// Registers every crawler task on `node`
pub fn register_tasks(session: &Arc<CrawlSession>, node: &GridNode) {
    register(session, node, INIT_TASK, |session, _ctx| async move {
        let resumed = session
            .ledger()
            .prepare_session(session.config().crawler.resume)?;
        if resumed {
            session.fire(CrawlerEvent::new(CRAWLER_RESUMED));
            return Ok::<Option<Value>, anyhow::Error>(Some(json!({ "resumed": true })));
        }

        session.dedup().clear()?;
        let queued = tokio::task::spawn_blocking(move || queue_start_references(&session)).await??;
        Ok(Some(json!({ "resumed": false, "start-references": queued })))
    });

    register(session, node, RUN_TASK, |session, ctx| async move {
        // A stop left over from an earlier run must not end this one
        session.reset_stop();
        session.fire(CrawlerEvent::new(CRAWLER_RUN_BEGIN));
        let processed = run_workers(session, ctx.cancel).await?;
        Ok::<Option<Value>, anyhow::Error>(Some(json!({ "processed": processed })))
    });

    register(session, node, ORPHANS_TASK, |session, ctx| async move {
        let orphans = session.ledger().orphans()?;
        if orphans.is_empty() {
            return Ok::<Option<Value>, anyhow::Error>(Some(json!({ "orphans": 0 })));
        }

        let strategy = session.config().crawler.orphans_strategy;
        info!("{} orphan references, strategy {:?}", orphans.len(), strategy);
        match strategy {
            OrphansStrategy::Process => {
                for orphan in &orphans {
                    let mut doc = DocContext::new(orphan.reference.as_str(), orphan.depth);
                    doc.parent_reference = orphan.parent_reference.clone();
                    session.queue_reference(doc)?;
                }
                run_workers(session.clone(), ctx.cancel).await?;
            }
            OrphansStrategy::Delete => {
                for mut doc in orphans.iter().cloned() {
                    session.fire(
                        CrawlerEvent::for_doc(REJECTED_ORPHAN, &doc).with_message("deleted"),
                    );
                    delete_reference(&session, &mut doc)?;
                    session.ledger().mark_processed(&doc)?;
                }
            }
            OrphansStrategy::Ignore => {
                for orphan in &orphans {
                    session.fire(
                        CrawlerEvent::for_doc(REJECTED_ORPHAN, orphan).with_message("ignored"),
                    );
                }
            }
        }
        Ok(Some(json!({ "orphans": orphans.len() })))
    });

    register(session, node, SHUTDOWN_TASK, |session, _ctx| async move {
        if session.ledger().is_drained()? {
            session.dedup().clear()?;
        }
        let closed = session.committer().close();
        if let Err(e) = &closed {
            warn!("Committer did not close cleanly: {}", e);
        }
        session.fire(CrawlerEvent::new(CRAWLER_RUN_END));
        closed?;
        Ok::<Option<Value>, anyhow::Error>(None)
    });

    register(session, node, CLEAN_TASK, |session, _ctx| async move {
        info!("Cleaning crawler '{}'", session.id());
        session.committer().clean()?;
        session.ledger().clean()?;
        session.dedup().clear()?;
        session.grace().clear_all()?;
        Ok::<Option<Value>, anyhow::Error>(None)
    });

    register(session, node, STOP_TASK, |session, _ctx| async move {
        session.request_local_stop();
        Ok::<Option<Value>, anyhow::Error>(None)
    });
}

fn task(session: &CrawlSession, name: &str, run_on: RunOn) -> GridTask {
    GridTask::named(session.task_name(name), run_on)
}

/// init, run, orphans, then shutdown even if an earlier stage failed
pub fn crawl_pipeline(session: &CrawlSession) -> GridResult<GridPipeline<CrawlSession>> {
    GridPipeline::new(
        session.task_name("crawl"),
        vec![
            GridPipelineStage::new(INIT_TASK, task(session, INIT_TASK, RunOn::One)),
            GridPipelineStage::new(RUN_TASK, task(session, RUN_TASK, RunOn::All)),
            GridPipelineStage::new(ORPHANS_TASK, task(session, ORPHANS_TASK, RunOn::One))
                .with_precondition(|s: &CrawlSession| !s.is_stopping() && !s.max_documents_reached()),
            GridPipelineStage::new(SHUTDOWN_TASK, task(session, SHUTDOWN_TASK, RunOn::All)).always(),
        ],
    )
}

pub fn clean_pipeline(session: &CrawlSession) -> GridResult<GridPipeline<CrawlSession>> {
    GridPipeline::new(
        session.task_name("clean"),
        vec![GridPipelineStage::new(CLEAN_TASK, task(session, CLEAN_TASK, RunOn::One))],
    )
}

pub fn stop_pipeline(session: &CrawlSession) -> GridResult<GridPipeline<CrawlSession>> {
    GridPipeline::new(
        session.task_name("stop"),
        vec![GridPipelineStage::new(STOP_TASK, task(session, STOP_TASK, RunOn::All)).always()],
    )
}
