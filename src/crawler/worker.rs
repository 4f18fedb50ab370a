//! Worker pool processing queued references on one node
//!
//! Each worker is a blocking thread looping on the shared queue. Stop
//! requests, task cancellation and the max-documents limit are checked
//! between documents, so a document in progress always finishes.

use crate::crawler::CrawlSession;
use crate::doc::{DocContext, DocState, Metadata};
use crate::event::{
    CrawlerEvent, DOCUMENT_COMMITTED_DELETE, DOCUMENT_PROCESSED, REJECTED_ERROR, REJECTED_GRACE,
};
use crate::grid::CancellationToken;
use crate::pipeline::{CommitterPipelineContext, ImporterPipelineContext};
use crate::spoil::SpoiledAction;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Runs `num-threads` workers until the queue drains or the crawl stops
///
/// Returns the number of documents this node processed.
pub async fn run_workers(session: Arc<CrawlSession>, cancel: CancellationToken) -> crate::Result<u64> {
    let threads = session.config().crawler.num_threads.max(1) as usize;
    let in_flight = Arc::new(AtomicUsize::new(0));
    info!(
        "Node '{}' starting {} workers for crawler '{}'",
        session.node(),
        threads,
        session.id()
    );

    let mut workers = JoinSet::new();
    for worker in 0..threads {
        let session = session.clone();
        let cancel = cancel.clone();
        let in_flight = in_flight.clone();
        workers.spawn_blocking(move || worker_loop(worker, &session, &cancel, &in_flight));
    }

    let mut processed = 0;
    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(count)) => processed += count,
            Ok(Err(e)) => {
                error!("Worker failed: {}", e);
                first_error.get_or_insert(e);
            }
            Err(e) => {
                error!("Worker panicked: {}", e);
                first_error.get_or_insert(crate::CrawlError::Pipeline {
                    stage: "worker".to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    info!("Node '{}' processed {} documents", session.node(), processed);
    match first_error {
        Some(e) => Err(e),
        None => Ok(processed),
    }
}

fn worker_loop(
    worker: usize,
    session: &Arc<CrawlSession>,
    cancel: &CancellationToken,
    in_flight: &AtomicUsize,
) -> crate::Result<u64> {
    let poll = session.grid().settings().poll_interval;
    let mut processed = 0;

    loop {
        if cancel.is_cancelled() || session.is_stopping() {
            debug!("Worker {} stopping", worker);
            break;
        }
        if session.max_documents_reached() {
            info!("Maximum documents reached, worker {} stops", worker);
            break;
        }

        in_flight.fetch_add(1, Ordering::SeqCst);
        let next = session.ledger().next_queued();
        let doc = match next {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if is_idle(session, in_flight, poll)? {
                    break;
                }
                continue;
            }
            Err(e) => {
                in_flight.fetch_sub(1, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        process_document(session, doc);
        in_flight.fetch_sub(1, Ordering::SeqCst);
        processed += 1;
    }

    Ok(processed)
}

/// Waits one poll interval and reports whether there is nothing left to do
///
/// Work remains while references are queued, or while any worker here or on
/// another node holds a reference that may still queue children.
fn is_idle(
    session: &CrawlSession,
    in_flight: &AtomicUsize,
    poll: std::time::Duration,
) -> crate::Result<bool> {
    let drained = || -> crate::Result<bool> {
        Ok(in_flight.load(Ordering::SeqCst) == 0 && session.ledger().is_drained()?)
    };
    if !drained()? {
        std::thread::sleep(poll);
        return Ok(false);
    }
    std::thread::sleep(poll);
    drained()
}

/// Imports, commits and finalizes one reference
///
/// Errors are recorded on the reference, never raised.
pub fn process_document(session: &Arc<CrawlSession>, doc: DocContext) {
    let reference = doc.reference.clone();
    let cached = match session.ledger().cached(&reference) {
        Ok(cached) => cached,
        Err(e) => {
            warn!("Could not read cached record of {}: {}", reference, e);
            None
        }
    };

    let ctx = match import_and_commit(session, doc.clone(), cached.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Could not process {}: {}", reference, e);
            let mut ctx = doc;
            ctx.set_state(DocState::Error);
            session.fire(CrawlerEvent::for_doc(REJECTED_ERROR, &ctx).with_message(e.to_string()));
            ctx
        }
    };

    if let Err(e) = finalize(session, ctx, cached.as_ref()) {
        error!("Could not finalize {}: {}", reference, e);
    }
}

fn import_and_commit(
    session: &Arc<CrawlSession>,
    doc: DocContext,
    cached: Option<DocContext>,
) -> crate::Result<DocContext> {
    let ctx = ImporterPipelineContext::new(session.clone(), doc, cached);
    let (response, ctx) = session.importer_pipeline().run(ctx)?;
    if !response.is_success() {
        debug!(
            "Not imported: {} ({})",
            response.reference,
            response.message.as_deref().unwrap_or("rejected")
        );
        return Ok(ctx.document.context);
    }

    let outcome = session
        .committer_pipeline()
        .run(CommitterPipelineContext::from(ctx))?;
    Ok(outcome.context.document.context)
}

/// Applies the spoiled-reference strategy and records the final state
pub(crate) fn finalize(
    session: &CrawlSession,
    mut ctx: DocContext,
    cached: Option<&DocContext>,
) -> crate::Result<()> {
    let state = match ctx.state() {
        Some(state) => state,
        None => {
            ctx.set_state(DocState::Rejected);
            DocState::Rejected
        }
    };

    if state.is_good_state() {
        session.grace().clear(&ctx.reference)?;
    } else if let Some(cached) = cached {
        if is_spoiled(session, cached)? {
            handle_spoiled(session, &mut ctx, state)?;
        }
    }

    // checksums not computed this time stay comparable next session
    if let Some(cached) = cached {
        if ctx.state() != Some(DocState::Deleted) {
            if ctx.content_checksum.is_none() {
                ctx.content_checksum = cached.content_checksum.clone();
            }
            if ctx.metadata_checksum.is_none() {
                ctx.metadata_checksum = cached.metadata_checksum.clone();
            }
        }
    }

    ctx.processed_at = Some(Utc::now());
    session.ledger().mark_processed(&ctx)?;
    session.fire(CrawlerEvent::for_doc(DOCUMENT_PROCESSED, &ctx));
    Ok(())
}

/// A reference is spoiled if it was good last session, or is on grace
fn is_spoiled(session: &CrawlSession, cached: &DocContext) -> crate::Result<bool> {
    let was_good = cached.state().map(|s| s.is_good_state()).unwrap_or(false);
    Ok(was_good || session.grace().is_graced(&cached.reference)?)
}

fn handle_spoiled(session: &CrawlSession, ctx: &mut DocContext, state: DocState) -> crate::Result<()> {
    let strategy = session
        .strategizer()
        .resolve_spoiled_reference(&ctx.reference, state);
    let action = session.grace().decide(&ctx.reference, strategy)?;

    match action {
        SpoiledAction::Delete => {
            info!("Deleting spoiled reference {} ({})", ctx.reference, state);
            delete_reference(session, ctx)?;
        }
        SpoiledAction::Grace => {
            warn!(
                "Spoiled reference {} ({}) gets one more chance",
                ctx.reference, state
            );
            session.fire(
                CrawlerEvent::for_doc(REJECTED_GRACE, ctx)
                    .with_message(format!("{} spared once", state)),
            );
        }
        SpoiledAction::Ignore => {
            debug!("Ignoring spoiled reference {} ({})", ctx.reference, state);
        }
    }
    Ok(())
}

/// Sends a deletion to the committer and forgets the cached record
pub(crate) fn delete_reference(session: &CrawlSession, ctx: &mut DocContext) -> crate::Result<()> {
    let mut metadata = Metadata::new();
    metadata.set("crawl.reference", ctx.reference.as_str());
    if let Some(state) = ctx.state() {
        metadata.set("crawl.state", state.to_string());
    }

    session.committer().delete(&ctx.reference, &metadata)?;
    session.ledger().remove_cached(&ctx.reference)?;
    ctx.set_state(DocState::Deleted);
    session.fire(CrawlerEvent::for_doc(DOCUMENT_COMMITTED_DELETE, ctx));
    Ok(())
}
