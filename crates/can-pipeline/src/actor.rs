//! Pipeline actor
//!
//! Every producer and every operator action reaches the pipeline as a
//! message to this actor, which owns the [`Pipeline`], the scheduler and the
//! driver session. Processing one message at a time gives a single global
//! ingest order and means no frame ever sees a half-applied filter change.
//!
//! # Architecture
//!
//! The actor selects over three inputs:
//! - operator commands ([`PipelineCommand`]), each answered on a oneshot
//! - periodic job ticks from the scheduler's timer tasks
//! - frames and faults from the session's receive thread
//!
//! Output goes to a broadcast channel of [`PipelineEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use can_pipeline::actor::{run_pipeline_actor, PipelineCommand};
//! use can_pipeline::{Pipeline, PipelineConfig};
//! use tokio::sync::{broadcast, mpsc};
//!
//! let (cmd_tx, cmd_rx) = mpsc::channel(256);
//! let (event_tx, _) = broadcast::channel(1024);
//!
//! tokio::spawn(run_pipeline_actor(driver, Pipeline::new(PipelineConfig::default()), cmd_rx, event_tx));
//! ```

use std::sync::Arc;
use std::time::Duration;

use can_frame::{BusConfig, CanDriver, Direction, Frame, FrameTemplate};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::clock::MonotonicClock;
use crate::error::PipelineError;
use crate::events::{DisconnectReason, PipelineEvent};
use crate::filter::{Filter, FilterPolicy};
use crate::pipeline::{IngestOutcome, Pipeline, TrafficCounters};
use crate::scheduler::{JobConfig, JobId, JobTick, PeriodicJob, PeriodicScheduler};
use crate::session::{driver_call, ReceiverMessage, Session};

/// Reply channel for commands that can be rejected
pub type Reply<T> = oneshot::Sender<Result<T, PipelineError>>;

/// Point-in-time view of the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    /// Connected channel, if any
    pub channel: Option<u8>,
    /// Bus configuration of the active session
    pub bus: Option<BusConfig>,
    /// Traffic totals
    pub counters: TrafficCounters,
    /// Filter list in evaluation order
    pub filters: Vec<Filter>,
    /// Outcome when no filter matches
    pub default_policy: FilterPolicy,
    /// Periodic jobs
    pub jobs: Vec<PeriodicJob>,
    /// Frames in the transmit history
    pub history_len: usize,
    /// Identifiers in the statistics table
    pub stats_len: usize,
}

/// Commands sent to the pipeline actor
#[derive(Debug)]
pub enum PipelineCommand {
    /// Run a frame from an external producer through the pipeline
    Ingest {
        /// Frame as captured
        frame: Frame,
        /// Classification result
        response: oneshot::Sender<IngestOutcome>,
    },

    /// Transmit a frame on the active session and ingest it as TX
    SendFrame {
        /// Frame to send
        template: FrameTemplate,
        /// Classification result of the sent frame
        response: Reply<IngestOutcome>,
    },

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------
    /// Append a filter
    AddFilter {
        /// Filter to append
        filter: Filter,
        /// Result
        response: Reply<()>,
    },

    /// Remove a filter by name
    RemoveFilter {
        /// Filter name
        name: String,
        /// The removed filter
        response: Reply<Filter>,
    },

    /// Enable or disable one filter
    SetFilterEnabled {
        /// Filter name
        name: String,
        /// New state
        enabled: bool,
        /// Result
        response: Reply<()>,
    },

    /// Enable every filter
    EnableAllFilters {
        /// Done
        response: oneshot::Sender<()>,
    },

    /// Disable every filter
    DisableAllFilters {
        /// Done
        response: oneshot::Sender<()>,
    },

    /// Change the outcome for frames no filter matches
    SetDefaultPolicy {
        /// New default
        policy: FilterPolicy,
        /// Done
        response: oneshot::Sender<()>,
    },

    /// Replace the diagnostic identifier set
    SetDiagnosticIds {
        /// New set
        ids: Vec<u32>,
        /// Done
        response: oneshot::Sender<()>,
    },

    // -------------------------------------------------------------------------
    // Periodic jobs
    // -------------------------------------------------------------------------
    /// Register a stopped job
    AddJob {
        /// Job definition
        config: JobConfig,
        /// Assigned id
        response: Reply<JobId>,
    },

    /// Remove a stopped job
    RemoveJob {
        /// Job id
        job: JobId,
        /// The removed job
        response: Reply<PeriodicJob>,
    },

    /// Start one job (needs a session)
    StartJob {
        /// Job id
        job: JobId,
        /// Result
        response: Reply<()>,
    },

    /// Stop one job
    StopJob {
        /// Job id
        job: JobId,
        /// Result
        response: Reply<()>,
    },

    /// Start every stopped job (needs a session)
    StartAll {
        /// Jobs started
        response: Reply<Vec<JobId>>,
    },

    /// Stop every running job
    StopAll {
        /// Jobs stopped
        response: oneshot::Sender<Vec<JobId>>,
    },

    /// Zero sent counters and restore configured counts
    ResetJobCounters {
        /// Done
        response: oneshot::Sender<()>,
    },

    /// Snapshot of all jobs
    ListJobs {
        /// Jobs ordered by id
        response: oneshot::Sender<Vec<PeriodicJob>>,
    },

    // -------------------------------------------------------------------------
    // Stores
    // -------------------------------------------------------------------------
    /// Set or clear (blank text) the comment for an identifier
    SetComment {
        /// Raw identifier
        id: u32,
        /// Comment text
        text: String,
        /// Done
        response: oneshot::Sender<()>,
    },

    /// Empty the transmit history
    ClearHistory {
        /// Done
        response: oneshot::Sender<()>,
    },

    /// Clear statistics and traffic totals
    ResetStats {
        /// Done
        response: oneshot::Sender<()>,
    },

    /// Copy of the transmit history in send order
    HistorySnapshot {
        /// Frames
        response: oneshot::Sender<Vec<Frame>>,
    },

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------
    /// Open and configure a channel, then start receiving
    Connect {
        /// Channel number (1..=4)
        channel: u8,
        /// Bus timing
        config: BusConfig,
        /// Result
        response: Reply<()>,
    },

    /// Stop all jobs and close the channel
    Disconnect {
        /// Result
        response: Reply<()>,
    },

    /// Current status
    Status {
        /// Status snapshot
        response: oneshot::Sender<PipelineStatus>,
    },

    /// Close the session and stop the actor
    Shutdown {
        /// Done
        response: oneshot::Sender<()>,
    },
}

/// Actor-owned state
struct ActorState {
    driver: Arc<dyn CanDriver>,
    pipeline: Pipeline,
    scheduler: PeriodicScheduler,
    clock: MonotonicClock,
    session: Option<Session>,
    next_session: u64,
    receiver_tx: mpsc::Sender<ReceiverMessage>,
    event_tx: broadcast::Sender<PipelineEvent>,
}

impl ActorState {
    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn publish(&mut self, frame: Frame) -> IngestOutcome {
        let outcome = self.pipeline.ingest(&frame);
        if outcome.admitted {
            let comment = self.pipeline.comment_for(frame.id()).map(str::to_owned);
            self.emit(PipelineEvent::FrameAdmitted {
                frame,
                category: outcome.category,
                comment,
            });
        }
        outcome
    }

    fn send_frame(&mut self, template: &FrameTemplate) -> Result<IngestOutcome, PipelineError> {
        let handle = self
            .session
            .as_ref()
            .map(Session::handle)
            .ok_or(PipelineError::NotConnected)?;

        let frame = template.to_frame(Direction::Tx, self.clock.now());
        if let Err(e) = driver_call(|| self.driver.send(handle, &frame)) {
            self.pipeline.record_send_failure();
            self.end_session(DisconnectReason::DriverFault(e.clone()));
            return Err(e.into());
        }

        Ok(self.publish(frame))
    }

    fn on_tick(&mut self, tick: JobTick) {
        let Some(emission) = self.scheduler.on_tick(tick) else {
            return;
        };

        debug!("Periodic job {} firing {}", emission.job, emission.template.id());
        if let Err(e) = self.send_frame(&emission.template) {
            warn!("Periodic job {} could not send: {}", emission.job, e);
            return;
        }
        let finished = self
            .scheduler
            .commit_emission(emission.job)
            .is_some_and(|committed| committed.finished);
        if finished {
            self.emit(PipelineEvent::JobCompleted { job: emission.job });
        }
    }

    fn on_receiver(&mut self, message: ReceiverMessage) {
        let current = self.session.as_ref().map(Session::id);
        match message {
            ReceiverMessage::Frame { session, frame } if current == Some(session) => {
                let frame = frame.with_timestamp(self.clock.now());
                self.publish(frame);
            }
            ReceiverMessage::Fault { session, error } if current == Some(session) => {
                self.end_session(DisconnectReason::DriverFault(error));
            }
            _ => debug!("Dropping receive message from a closed session"),
        }
    }

    fn connect(&mut self, channel: u8, config: BusConfig) -> Result<(), PipelineError> {
        if let Some(session) = &self.session {
            return Err(PipelineError::AlreadyConnected(session.channel()));
        }

        let id = self.next_session;
        self.next_session += 1;
        let timeout = Duration::from_millis(self.pipeline.config().receive_timeout_ms.max(1) as u64);
        let session = driver_call(|| {
            Session::open(
                self.driver.clone(),
                id,
                channel,
                config,
                timeout,
                self.receiver_tx.clone(),
            )
        })?;

        self.session = Some(session);
        self.emit(PipelineEvent::SessionConnected { channel, config });
        Ok(())
    }

    /// Stop all jobs and close the session; stores are kept
    fn end_session(&mut self, reason: DisconnectReason) {
        let Some(session) = self.session.take() else {
            return;
        };

        for job in self.scheduler.stop_all() {
            self.emit(PipelineEvent::JobStopped { job });
        }

        let channel = session.channel();
        driver_call(|| session.close(self.driver.as_ref()));

        if let DisconnectReason::DriverFault(e) = &reason {
            error!("Driver fault on channel {}, session closed: {}", channel, e);
            self.emit(PipelineEvent::Error(format!("channel {}: {}", channel, e)));
        }
        self.emit(PipelineEvent::SessionDisconnected { channel, reason });
    }

    fn require_session(&self) -> Result<(), PipelineError> {
        if self.session.is_some() {
            Ok(())
        } else {
            Err(PipelineError::NotConnected)
        }
    }

    fn status(&self) -> PipelineStatus {
        PipelineStatus {
            channel: self.session.as_ref().map(Session::channel),
            bus: self.session.as_ref().map(Session::config),
            counters: self.pipeline.counters(),
            filters: self.pipeline.filters().filters().to_vec(),
            default_policy: self.pipeline.filters().default_policy(),
            jobs: self.scheduler.jobs(),
            history_len: self.pipeline.history().len(),
            stats_len: self.pipeline.stats().len(),
        }
    }

    /// Handle one command; returns false when the actor should stop
    fn handle(&mut self, cmd: PipelineCommand) -> bool {
        match cmd {
            PipelineCommand::Ingest { frame, response } => {
                let outcome = self.publish(frame);
                let _ = response.send(outcome);
            }

            PipelineCommand::SendFrame { template, response } => {
                let result = self.send_frame(&template);
                reply(response, result, "send frame");
            }

            PipelineCommand::AddFilter { filter, response } => {
                let name = filter.name().to_string();
                let result = self
                    .pipeline
                    .filters_mut()
                    .add(filter)
                    .map_err(PipelineError::from);
                if result.is_ok() {
                    self.emit(PipelineEvent::FilterAdded { name });
                }
                reply(response, result, "add filter");
            }

            PipelineCommand::RemoveFilter { name, response } => {
                let result = self
                    .pipeline
                    .filters_mut()
                    .remove(&name)
                    .map_err(PipelineError::from);
                if result.is_ok() {
                    self.emit(PipelineEvent::FilterRemoved { name });
                }
                reply(response, result, "remove filter");
            }

            PipelineCommand::SetFilterEnabled {
                name,
                enabled,
                response,
            } => {
                let result = self
                    .pipeline
                    .filters_mut()
                    .set_enabled(&name, enabled)
                    .map_err(PipelineError::from);
                if result.is_ok() {
                    info!("Filter '{}' {}", name, if enabled { "enabled" } else { "disabled" });
                    self.emit(PipelineEvent::FilterToggled { name, enabled });
                }
                reply(response, result, "toggle filter");
            }

            PipelineCommand::EnableAllFilters { response } => {
                self.pipeline.filters_mut().enable_all();
                info!("All filters enabled");
                self.emit(PipelineEvent::AllFiltersToggled { enabled: true });
                let _ = response.send(());
            }

            PipelineCommand::DisableAllFilters { response } => {
                self.pipeline.filters_mut().disable_all();
                info!("All filters disabled");
                self.emit(PipelineEvent::AllFiltersToggled { enabled: false });
                let _ = response.send(());
            }

            PipelineCommand::SetDefaultPolicy { policy, response } => {
                self.pipeline.filters_mut().set_default_policy(policy);
                info!("Default filter policy set to {:?}", policy);
                let _ = response.send(());
            }

            PipelineCommand::SetDiagnosticIds { ids, response } => {
                info!("Diagnostic id set replaced ({} ids)", ids.len());
                self.pipeline.classifier_mut().set_diagnostic_ids(ids);
                let _ = response.send(());
            }

            PipelineCommand::AddJob { config, response } => {
                let result = self.scheduler.add(config).map_err(PipelineError::from);
                if let Ok(job) = result {
                    self.emit(PipelineEvent::JobAdded { job });
                }
                reply(response, result, "add job");
            }

            PipelineCommand::RemoveJob { job, response } => {
                let result = self.scheduler.remove(job).map_err(PipelineError::from);
                if result.is_ok() {
                    self.emit(PipelineEvent::JobRemoved { job });
                }
                reply(response, result, "remove job");
            }

            PipelineCommand::StartJob { job, response } => {
                let result = self
                    .require_session()
                    .and_then(|()| self.scheduler.start(job).map_err(PipelineError::from));
                if result.is_ok() {
                    self.emit(PipelineEvent::JobStarted { job });
                }
                reply(response, result, "start job");
            }

            PipelineCommand::StopJob { job, response } => {
                let result = self.scheduler.stop(job).map_err(PipelineError::from);
                if result.is_ok() {
                    self.emit(PipelineEvent::JobStopped { job });
                }
                reply(response, result, "stop job");
            }

            PipelineCommand::StartAll { response } => {
                let result = self.require_session().map(|()| self.scheduler.start_all());
                if let Ok(started) = &result {
                    for job in started {
                        self.emit(PipelineEvent::JobStarted { job: *job });
                    }
                }
                reply(response, result, "start all jobs");
            }

            PipelineCommand::StopAll { response } => {
                let stopped = self.scheduler.stop_all();
                for job in &stopped {
                    self.emit(PipelineEvent::JobStopped { job: *job });
                }
                let _ = response.send(stopped);
            }

            PipelineCommand::ResetJobCounters { response } => {
                self.scheduler.reset_counters();
                info!("Periodic job counters reset");
                let _ = response.send(());
            }

            PipelineCommand::ListJobs { response } => {
                let _ = response.send(self.scheduler.jobs());
            }

            PipelineCommand::SetComment { id, text, response } => {
                self.pipeline.set_comment(id, text);
                let _ = response.send(());
            }

            PipelineCommand::ClearHistory { response } => {
                self.pipeline.clear_history();
                info!("Transmit history cleared");
                self.emit(PipelineEvent::HistoryCleared);
                let _ = response.send(());
            }

            PipelineCommand::ResetStats { response } => {
                self.pipeline.reset_stats();
                info!("Statistics reset");
                self.emit(PipelineEvent::StatsReset);
                let _ = response.send(());
            }

            PipelineCommand::HistorySnapshot { response } => {
                let _ = response.send(self.pipeline.history().all().to_vec());
            }

            PipelineCommand::Connect {
                channel,
                config,
                response,
            } => {
                let result = self.connect(channel, config);
                reply(response, result, "connect");
            }

            PipelineCommand::Disconnect { response } => {
                let result = self
                    .require_session()
                    .map(|()| self.end_session(DisconnectReason::Requested));
                reply(response, result, "disconnect");
            }

            PipelineCommand::Status { response } => {
                let _ = response.send(self.status());
            }

            PipelineCommand::Shutdown { response } => {
                self.end_session(DisconnectReason::Requested);
                self.scheduler.stop_all();
                let _ = response.send(());
                return false;
            }
        }
        true
    }
}

/// Answer a command, logging rejections
fn reply<T>(response: Reply<T>, result: Result<T, PipelineError>, action: &str) {
    if let Err(e) = &result {
        warn!("Rejected {}: {}", action, e);
    }
    let _ = response.send(result);
}

/// Run the pipeline actor until shutdown or until every command sender is gone
pub async fn run_pipeline_actor(
    driver: Arc<dyn CanDriver>,
    pipeline: Pipeline,
    mut cmd_rx: mpsc::Receiver<PipelineCommand>,
    event_tx: broadcast::Sender<PipelineEvent>,
) {
    let (tick_tx, mut tick_rx) = mpsc::channel(64);
    let (receiver_tx, mut receiver_rx) = mpsc::channel(pipeline.config().event_buffer.max(1));

    let mut state = ActorState {
        driver,
        pipeline,
        scheduler: PeriodicScheduler::new(tick_tx),
        clock: MonotonicClock::new(),
        session: None,
        next_session: 1,
        receiver_tx,
        event_tx,
    };
    info!("Pipeline actor started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                if !state.handle(cmd) {
                    break;
                }
            }

            Some(tick) = tick_rx.recv() => state.on_tick(tick),

            Some(message) = receiver_rx.recv() => state.on_receiver(message),
        }
    }

    state.end_session(DisconnectReason::Requested);
    info!("Pipeline actor stopped");
}
