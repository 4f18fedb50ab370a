//! Pipelines whose stages are grid tasks
//!
//! Stages run strictly in order cluster-wide. The owner of a run records its
//! progress in the grid store; a node calling `run` while another node owns a
//! live run follows it to the end, joining its ALL stages, instead of
//! starting over.

use crate::grid::{Grid, GridError, GridResult, GridTask, RunOn, TaskResult, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

type Precondition<C> = Box<dyn Fn(&C) -> bool + Send + Sync>;

/// One stage of a grid pipeline, wrapping exactly one task
pub struct GridPipelineStage<C> {
    name: String,
    task: GridTask,
    always: bool,
    precondition: Option<Precondition<C>>,
}

impl<C> GridPipelineStage<C> {
    pub fn new(name: impl Into<String>, task: GridTask) -> Self {
        Self {
            name: name.into(),
            task,
            always: false,
            precondition: None,
        }
    }

    /// Runs even after an earlier stage failed or a stop was requested
    pub fn always(mut self) -> Self {
        self.always = true;
        self
    }

    pub fn with_precondition<F>(mut self, precondition: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.precondition = Some(Box::new(precondition));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task(&self) -> &GridTask {
        &self.task
    }

    pub fn is_always(&self) -> bool {
        self.always
    }
}

/// Progress of a pipeline run, as persisted in the grid store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub pipeline: String,
    /// Node driving the run
    pub owner: String,
    pub state: TaskState,
    pub current_stage: usize,
    pub stage: String,
    pub updated_at: DateTime<Utc>,
}

/// What happened to one stage; `state` is `None` when it was skipped
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub stage: String,
    pub state: Option<TaskState>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub pipeline: String,
    /// COMPLETED, or the state of the first stage that did not complete
    pub state: TaskState,
    pub stages: Vec<StageOutcome>,
    /// True when this node joined a run owned by another node
    pub joined: bool,
}

impl PipelineResult {
    pub fn is_completed(&self) -> bool {
        self.state == TaskState::Completed
    }

    /// Outcome of a stage by name
    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

/// An ordered list of uniquely named grid stages
pub struct GridPipeline<C> {
    name: String,
    stages: Vec<GridPipelineStage<C>>,
}

impl<C> GridPipeline<C> {
    pub fn new(name: impl Into<String>, stages: Vec<GridPipelineStage<C>>) -> GridResult<Self> {
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name.clone()) {
                return Err(GridError::DuplicateStage(stage.name.clone()));
            }
        }
        Ok(Self {
            name: name.into(),
            stages,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[GridPipelineStage<C>] {
        &self.stages
    }

    /// Runs the pipeline from `node`
    ///
    /// A stage that does not complete halts the pipeline; it is logged as a
    /// warning and reported in the result, not raised as an error. Stages
    /// flagged `always` still run after a halt or a stop request.
    ///
    /// # Returns
    ///
    /// * `Ok(PipelineResult)` - The run (or joined run) finished
    /// * `Err(GridError)` - A task could not be dispatched at all
    pub async fn run(&self, grid: &Grid, node: &str, ctx: &C) -> GridResult<PipelineResult> {
        if let Some(result) = self.try_join(grid, node).await? {
            return Ok(result);
        }

        info!("Pipeline '{}' starting on node '{}'", self.name, node);
        let mut record = PipelineRecord {
            pipeline: self.name.clone(),
            owner: node.to_string(),
            state: TaskState::Running,
            current_stage: 0,
            stage: String::new(),
            updated_at: Utc::now(),
        };
        grid.save_pipeline_record(&record)?;

        let mut state = TaskState::Completed;
        let mut halted = false;
        let mut outcomes = Vec::with_capacity(self.stages.len());

        for (index, stage) in self.stages.iter().enumerate() {
            if !halted && grid.is_stop_requested()? {
                info!("Stop requested, pipeline '{}' only runs its closing stages", self.name);
                halted = true;
            }

            let precondition_holds = stage.precondition.as_ref().map(|p| p(ctx)).unwrap_or(true);
            let skip = if halted {
                !stage.always
            } else {
                !precondition_holds
            };
            if skip {
                debug!("Skipping stage '{}' of pipeline '{}'", stage.name, self.name);
                outcomes.push(StageOutcome {
                    stage: stage.name.clone(),
                    state: None,
                    error: None,
                });
                continue;
            }

            record.current_stage = index;
            record.stage = stage.name.clone();
            record.updated_at = Utc::now();
            grid.save_pipeline_record(&record)?;

            let result = match self.execute_stage(grid, &mut record, stage).await {
                Ok(result) => result,
                Err(e) => {
                    record.state = TaskState::Failed;
                    record.updated_at = Utc::now();
                    grid.save_pipeline_record(&record)?;
                    return Err(e);
                }
            };

            if !result.is_completed() {
                warn!(
                    "Stage '{}' of pipeline '{}' ended {}{}",
                    stage.name,
                    self.name,
                    result.state,
                    result
                        .error
                        .as_deref()
                        .map(|e| format!(": {}", e))
                        .unwrap_or_default()
                );
                if !halted {
                    state = result.state;
                    halted = true;
                }
            }

            outcomes.push(StageOutcome {
                stage: stage.name.clone(),
                state: Some(result.state),
                error: result.error,
            });
        }

        record.state = state;
        record.updated_at = Utc::now();
        grid.save_pipeline_record(&record)?;
        info!("Pipeline '{}' finished: {}", self.name, state);

        Ok(PipelineResult {
            pipeline: self.name.clone(),
            state,
            stages: outcomes,
            joined: false,
        })
    }

    /// True when another node owns a live run of this pipeline
    ///
    /// Calling [`GridPipeline::run`] from `node` then follows that run
    /// instead of starting a new one.
    pub fn is_owned_elsewhere(&self, grid: &Grid, node: &str) -> GridResult<bool> {
        Ok(match grid.pipeline_record(&self.name)? {
            Some(record) if record.state == TaskState::Running && record.owner != node => {
                !self.is_abandoned(grid, &record)
            }
            _ => false,
        })
    }

    /// Runs a stage task, refreshing the record while it is in flight
    async fn execute_stage(
        &self,
        grid: &Grid,
        record: &mut PipelineRecord,
        stage: &GridPipelineStage<C>,
    ) -> GridResult<TaskResult> {
        let execution = grid.execute_task(&stage.task);
        tokio::pin!(execution);

        let mut ticker = tokio::time::interval(grid.settings().heartbeat_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                result = &mut execution => return result,
                _ = ticker.tick() => {
                    record.updated_at = Utc::now();
                    if let Err(e) = grid.save_pipeline_record(record) {
                        warn!("Could not refresh pipeline '{}': {}", self.name, e);
                    }
                }
            }
        }
    }

    fn is_abandoned(&self, grid: &Grid, record: &PipelineRecord) -> bool {
        if self.stages.iter().any(|s| grid.is_task_running(&s.task.name)) {
            return false;
        }
        let age = Utc::now()
            .signed_duration_since(record.updated_at)
            .to_std()
            .unwrap_or_default();
        age > grid.settings().node_timeout
    }

    /// Follows a live run owned by another node until it ends
    ///
    /// ALL stages starting while following are joined; ONE stages are
    /// waited out. Stages completed before the join, `always` ones
    /// included, are not run again on the joining node. The result carries
    /// the owner's final state.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - No live run, or its owner went silent; run it here
    /// * `Ok(Some(result))` - The owner's run ended
    async fn try_join(&self, grid: &Grid, node: &str) -> GridResult<Option<PipelineResult>> {
        if !self.is_owned_elsewhere(grid, node)? {
            return Ok(None);
        }
        info!("Node '{}' follows pipeline '{}'", node, self.name);

        let mut outcomes: Vec<StageOutcome> = Vec::new();
        loop {
            let record = match grid.pipeline_record(&self.name)? {
                Some(record) => record,
                None => return Ok(None),
            };
            if record.state != TaskState::Running {
                info!(
                    "Pipeline '{}' owned by '{}' finished: {}",
                    self.name, record.owner, record.state
                );
                return Ok(Some(PipelineResult {
                    pipeline: self.name.clone(),
                    state: record.state,
                    stages: outcomes,
                    joined: true,
                }));
            }

            let in_flight = self.stages.iter().find(|s| {
                grid.is_task_running(&s.task.name) && !outcomes.iter().any(|o| o.stage == s.name)
            });
            if let Some(stage) = in_flight {
                outcomes.push(self.join_stage(grid, node, stage).await?);
                continue;
            }

            if self.is_abandoned(grid, &record) {
                warn!(
                    "Pipeline '{}' owned by '{}' looks abandoned, node '{}' takes over",
                    self.name, record.owner, node
                );
                return Ok(None);
            }
            tokio::time::sleep(grid.settings().poll_interval).await;
        }
    }

    async fn join_stage(
        &self,
        grid: &Grid,
        node: &str,
        stage: &GridPipelineStage<C>,
    ) -> GridResult<StageOutcome> {
        if stage.task.run_on == RunOn::All && grid.join_running_task(&stage.task.name, node)? {
            info!(
                "Node '{}' joins pipeline '{}' at stage '{}'",
                node, self.name, stage.name
            );
        } else {
            debug!(
                "Node '{}' waits for stage '{}' of pipeline '{}'",
                node, stage.name, self.name
            );
        }

        let (state, error) = match grid.wait_for_task(&stage.task.name).await? {
            Some(record) => (record.state, record.error),
            None => (TaskState::Completed, None),
        };
        Ok(StageOutcome {
            stage: stage.name.clone(),
            state: Some(state),
            error,
        })
    }
}
