//! Cloneable front end to the pipeline actor

use std::sync::Arc;

use can_frame::{BusConfig, CanDriver, Frame, FrameTemplate};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::actor::{run_pipeline_actor, PipelineCommand, PipelineStatus};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::{FrameFeed, PipelineEvent};
use crate::filter::{Filter, FilterPolicy};
use crate::pipeline::{IngestOutcome, Pipeline};
use crate::scheduler::{JobConfig, JobId, PeriodicJob};
use crate::stats::{GroupedStat, StatsAggregator};

/// Handle for operator commands, event subscriptions and statistics reads
///
/// Commands are queued to the actor in call order. Statistics snapshots are
/// read straight from the shared table without going through the actor.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    cmd_tx: mpsc::Sender<PipelineCommand>,
    event_tx: broadcast::Sender<PipelineEvent>,
    stats: StatsAggregator,
}

impl PipelineHandle {
    /// Spawn the actor on the current tokio runtime
    pub fn spawn(driver: Arc<dyn CanDriver>, config: PipelineConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));

        let pipeline = Pipeline::new(config);
        let stats = pipeline.stats().clone();
        tokio::spawn(run_pipeline_actor(driver, pipeline, cmd_rx, event_tx.clone()));

        Self {
            cmd_tx,
            event_tx,
            stats,
        }
    }

    /// New event subscriber; it sees events emitted from now on
    pub fn subscribe(&self) -> FrameFeed {
        FrameFeed::new(self.event_tx.subscribe())
    }

    /// Per-identifier statistics ordered by id
    pub fn stats_snapshot(&self) -> Vec<GroupedStat> {
        self.stats.snapshot()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> PipelineCommand,
    ) -> Result<T, PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| PipelineError::ActorClosed)?;
        rx.await.map_err(|_| PipelineError::ActorClosed)
    }

    /// Run an externally captured frame through the pipeline
    pub async fn ingest(&self, frame: Frame) -> Result<IngestOutcome, PipelineError> {
        self.request(|response| PipelineCommand::Ingest { frame, response })
            .await
    }

    /// Transmit a frame on the active session
    pub async fn send_frame(&self, template: FrameTemplate) -> Result<IngestOutcome, PipelineError> {
        self.request(|response| PipelineCommand::SendFrame { template, response })
            .await?
    }

    /// Append a filter
    pub async fn add_filter(&self, filter: Filter) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::AddFilter { filter, response })
            .await?
    }

    /// Remove a filter by name
    pub async fn remove_filter(&self, name: impl Into<String>) -> Result<Filter, PipelineError> {
        let name = name.into();
        self.request(|response| PipelineCommand::RemoveFilter { name, response })
            .await?
    }

    /// Enable or disable a filter
    pub async fn set_filter_enabled(
        &self,
        name: impl Into<String>,
        enabled: bool,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        self.request(|response| PipelineCommand::SetFilterEnabled {
            name,
            enabled,
            response,
        })
        .await?
    }

    /// Enable every filter
    pub async fn enable_all_filters(&self) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::EnableAllFilters { response })
            .await
    }

    /// Disable every filter
    pub async fn disable_all_filters(&self) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::DisableAllFilters { response })
            .await
    }

    /// Set the outcome for frames no filter matches
    pub async fn set_default_policy(&self, policy: FilterPolicy) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::SetDefaultPolicy { policy, response })
            .await
    }

    /// Replace the diagnostic identifier set
    pub async fn set_diagnostic_ids(&self, ids: Vec<u32>) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::SetDiagnosticIds { ids, response })
            .await
    }

    /// Register a stopped periodic job
    pub async fn add_job(&self, config: JobConfig) -> Result<JobId, PipelineError> {
        self.request(|response| PipelineCommand::AddJob { config, response })
            .await?
    }

    /// Remove a stopped periodic job
    pub async fn remove_job(&self, job: JobId) -> Result<PeriodicJob, PipelineError> {
        self.request(|response| PipelineCommand::RemoveJob { job, response })
            .await?
    }

    /// Start a periodic job
    pub async fn start_job(&self, job: JobId) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::StartJob { job, response })
            .await?
    }

    /// Stop a periodic job
    pub async fn stop_job(&self, job: JobId) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::StopJob { job, response })
            .await?
    }

    /// Start every stopped job
    pub async fn start_all(&self) -> Result<Vec<JobId>, PipelineError> {
        self.request(|response| PipelineCommand::StartAll { response })
            .await?
    }

    /// Stop every running job
    ///
    /// Once this returns no further emission from the stopped jobs happens.
    pub async fn stop_all(&self) -> Result<Vec<JobId>, PipelineError> {
        self.request(|response| PipelineCommand::StopAll { response })
            .await
    }

    /// Zero job counters and restore configured counts
    pub async fn reset_job_counters(&self) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::ResetJobCounters { response })
            .await
    }

    /// Snapshot of every periodic job
    pub async fn jobs(&self) -> Result<Vec<PeriodicJob>, PipelineError> {
        self.request(|response| PipelineCommand::ListJobs { response })
            .await
    }

    /// Set or clear (blank text) the comment for an identifier
    pub async fn set_comment(&self, id: u32, text: impl Into<String>) -> Result<(), PipelineError> {
        let text = text.into();
        self.request(|response| PipelineCommand::SetComment { id, text, response })
            .await
    }

    /// Empty the transmit history
    pub async fn clear_history(&self) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::ClearHistory { response })
            .await
    }

    /// Clear statistics and traffic totals
    pub async fn reset_stats(&self) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::ResetStats { response })
            .await
    }

    /// Copy of the transmit history in send order
    pub async fn history_snapshot(&self) -> Result<Vec<Frame>, PipelineError> {
        self.request(|response| PipelineCommand::HistorySnapshot { response })
            .await
    }

    /// Open a driver channel and start receiving
    pub async fn connect(&self, channel: u8, config: BusConfig) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::Connect {
            channel,
            config,
            response,
        })
        .await?
    }

    /// Stop all jobs and close the channel
    pub async fn disconnect(&self) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::Disconnect { response })
            .await?
    }

    /// Current status
    pub async fn status(&self) -> Result<PipelineStatus, PipelineError> {
        self.request(|response| PipelineCommand::Status { response })
            .await
    }

    /// Close the session and stop the actor
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        self.request(|response| PipelineCommand::Shutdown { response })
            .await
    }
}
