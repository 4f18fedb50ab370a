//! Crawl, clean and stop commands
//!
//! Each command drives one grid pipeline run between a begin and an end
//! event. The end event fires whatever the pipeline outcome; the outcome is
//! reported, not raised.

use crate::crawler::CrawlSession;
use crate::event::{
    CrawlerEvent, CRAWLER_CLEAN_BEGIN, CRAWLER_CLEAN_END, CRAWLER_CRAWL_BEGIN, CRAWLER_CRAWL_END,
    CRAWLER_STOP_BEGIN, CRAWLER_STOP_END,
};
use crate::grid::{GridPipeline, PipelineResult, TaskState};
use tracing::{debug, info, warn};

/// Result of one command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub command: String,
    /// COMPLETED unless a pipeline stage did not complete
    pub state: TaskState,
    pub pipeline: PipelineResult,
}

impl CommandOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == TaskState::Completed
    }
}

pub(crate) async fn run_command(
    command: &str,
    session: &CrawlSession,
    pipeline: &GridPipeline<CrawlSession>,
    events: (&str, &str),
) -> crate::Result<CommandOutcome> {
    let (begin, end) = events;
    session.fire(CrawlerEvent::new(begin));

    let result = pipeline.run(session.grid(), session.node(), session).await;
    session.fire(CrawlerEvent::new(end));

    let pipeline = result?;
    if pipeline.is_completed() {
        info!("Command '{}' completed on crawler '{}'", command, session.id());
    } else {
        warn!(
            "Command '{}' ended {} on crawler '{}'",
            command,
            pipeline.state,
            session.id()
        );
    }
    Ok(CommandOutcome {
        command: command.to_string(),
        state: pipeline.state,
        pipeline,
    })
}

pub(crate) async fn crawl(
    session: &CrawlSession,
    pipeline: &GridPipeline<CrawlSession>,
) -> crate::Result<CommandOutcome> {
    // A node following another node's crawl leaves the shared state alone
    if pipeline.is_owned_elsewhere(session.grid(), session.node())? {
        debug!("Node '{}' joins a crawl in progress", session.node());
    } else {
        session.grid().clear_stop_request()?;
        session.reset_stop();
        session.monitor().reset();
    }
    run_command("crawl", session, pipeline, (CRAWLER_CRAWL_BEGIN, CRAWLER_CRAWL_END)).await
}

pub(crate) async fn clean(
    session: &CrawlSession,
    pipeline: &GridPipeline<CrawlSession>,
) -> crate::Result<CommandOutcome> {
    run_command("clean", session, pipeline, (CRAWLER_CLEAN_BEGIN, CRAWLER_CLEAN_END)).await
}

/// Raises the grid-wide stop flag, then tells every node to stop
pub(crate) async fn stop(
    session: &CrawlSession,
    pipeline: &GridPipeline<CrawlSession>,
) -> crate::Result<CommandOutcome> {
    session.grid().request_stop()?;
    run_command("stop", session, pipeline, (CRAWLER_STOP_BEGIN, CRAWLER_STOP_END)).await
}
