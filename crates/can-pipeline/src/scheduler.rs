//! Periodic transmission scheduler
//!
//! Every running job owns a timer task that only produces [`JobTick`]s. The
//! owner of the scheduler feeds ticks back through [`PeriodicScheduler::on_tick`],
//! which decides whether the tick still counts. Each start and stop bumps the
//! job's epoch, so a tick that was already queued when the job stopped is
//! discarded instead of emitting.
//!
//! A valid tick changes nothing by itself. Counters move only when the owner
//! reports the frame as sent with [`PeriodicScheduler::commit_emission`], so a
//! send the driver refuses never uses up one of the job's emissions.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use can_frame::FrameTemplate;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{JobConfigError, SchedulerStateError};

/// Identifier of a periodic job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Definition of a periodic job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Frame sent on every tick
    pub template: FrameTemplate,
    /// Time between emissions in milliseconds
    pub interval_ms: u32,
    /// Number of emissions, `None` for unlimited
    #[serde(default)]
    pub count: Option<u32>,
}

impl JobConfig {
    /// Create a validated job definition
    pub fn new(
        template: FrameTemplate,
        interval_ms: u32,
        count: Option<u32>,
    ) -> Result<Self, JobConfigError> {
        let config = Self {
            template,
            interval_ms,
            count,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check interval and count
    pub fn validate(&self) -> Result<(), JobConfigError> {
        if self.interval_ms == 0 {
            return Err(JobConfigError::ZeroInterval);
        }
        if self.count == Some(0) {
            return Err(JobConfigError::ZeroCount);
        }
        Ok(())
    }
}

/// Whether a job is emitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Not emitting
    Stopped,
    /// Timer armed
    Running,
}

/// Snapshot of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodicJob {
    /// Job identifier
    pub id: JobId,
    /// Frame sent on every tick
    pub template: FrameTemplate,
    /// Time between emissions in milliseconds
    pub interval_ms: u32,
    /// Configured number of emissions (`None` = unlimited)
    pub count: Option<u32>,
    /// Emissions left before the job stops itself
    pub remaining: Option<u32>,
    /// Emissions since creation or the last counter reset
    pub sent_count: u64,
    /// Current state
    pub state: JobState,
}

impl PeriodicJob {
    fn from_config(id: JobId, config: JobConfig) -> Self {
        Self {
            id,
            template: config.template,
            interval_ms: config.interval_ms,
            count: config.count,
            remaining: config.count,
            sent_count: 0,
            state: JobState::Stopped,
        }
    }

    /// Whether a finite job has used up its emissions
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Whether the timer is armed
    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }
}

/// Timer tick for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTick {
    /// Job the tick belongs to
    pub job: JobId,
    epoch: u64,
}

/// A tick that should be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    /// Emitting job
    pub job: JobId,
    /// Frame to send
    pub template: FrameTemplate,
}

/// Job progress after a sent emission was accounted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Committed {
    /// Emitting job
    pub job: JobId,
    /// Emissions left after this one
    pub remaining: Option<u32>,
    /// True when this emission used up the job and it stopped itself
    pub finished: bool,
}

struct JobEntry {
    job: PeriodicJob,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Set of independently timed periodic jobs
///
/// Starting a job spawns its timer on the current tokio runtime.
pub struct PeriodicScheduler {
    jobs: BTreeMap<JobId, JobEntry>,
    next_id: u32,
    tick_tx: mpsc::Sender<JobTick>,
}

impl PeriodicScheduler {
    /// Create a scheduler that delivers ticks to `tick_tx`
    pub fn new(tick_tx: mpsc::Sender<JobTick>) -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: 1,
            tick_tx,
        }
    }

    /// Register a job in the stopped state
    pub fn add(&mut self, config: JobConfig) -> Result<JobId, JobConfigError> {
        config.validate()?;
        let id = JobId(self.next_id);
        self.next_id += 1;

        info!(
            "Added periodic job {}: {} every {} ms",
            id,
            config.template.id(),
            config.interval_ms
        );
        self.jobs.insert(
            id,
            JobEntry {
                job: PeriodicJob::from_config(id, config),
                epoch: 0,
                timer: None,
            },
        );
        Ok(id)
    }

    /// Remove a stopped job
    pub fn remove(&mut self, id: JobId) -> Result<PeriodicJob, SchedulerStateError> {
        let entry = self
            .jobs
            .get(&id)
            .ok_or(SchedulerStateError::UnknownJob(id))?;
        if entry.job.is_running() {
            return Err(SchedulerStateError::StillRunning(id));
        }
        let entry = self
            .jobs
            .remove(&id)
            .ok_or(SchedulerStateError::UnknownJob(id))?;
        info!("Removed periodic job {}", id);
        Ok(entry.job)
    }

    /// Arm a stopped job; the first emission comes one interval from now
    ///
    /// A job that used up its count starts over with its configured count.
    pub fn start(&mut self, id: JobId) -> Result<(), SchedulerStateError> {
        let entry = self
            .jobs
            .get_mut(&id)
            .ok_or(SchedulerStateError::UnknownJob(id))?;
        if entry.job.is_running() {
            return Err(SchedulerStateError::AlreadyRunning(id));
        }
        if entry.job.is_exhausted() {
            entry.job.remaining = entry.job.count;
        }

        entry.epoch += 1;
        entry.job.state = JobState::Running;
        let period = Duration::from_millis(entry.job.interval_ms as u64);
        entry.timer = Some(tokio::spawn(run_job_timer(
            JobTick {
                job: id,
                epoch: entry.epoch,
            },
            period,
            self.tick_tx.clone(),
        )));

        info!("Started periodic job {}", id);
        Ok(())
    }

    /// Disarm a running job; `remaining` is kept
    pub fn stop(&mut self, id: JobId) -> Result<(), SchedulerStateError> {
        let entry = self
            .jobs
            .get_mut(&id)
            .ok_or(SchedulerStateError::UnknownJob(id))?;
        if !entry.job.is_running() {
            return Err(SchedulerStateError::NotRunning(id));
        }
        Self::halt(entry);
        info!("Stopped periodic job {}", id);
        Ok(())
    }

    /// Start every stopped job, returning the ones started
    pub fn start_all(&mut self) -> Vec<JobId> {
        let stopped: Vec<JobId> = self
            .jobs
            .values()
            .filter(|e| !e.job.is_running())
            .map(|e| e.job.id)
            .collect();
        stopped
            .into_iter()
            .filter(|id| self.start(*id).is_ok())
            .collect()
    }

    /// Stop every running job, returning the ones stopped
    pub fn stop_all(&mut self) -> Vec<JobId> {
        let mut stopped = Vec::new();
        for entry in self.jobs.values_mut().filter(|e| e.job.is_running()) {
            Self::halt(entry);
            stopped.push(entry.job.id);
        }
        if !stopped.is_empty() {
            info!("Stopped {} periodic job(s)", stopped.len());
        }
        stopped
    }

    /// Zero every job's sent counter and restore its configured count
    pub fn reset_counters(&mut self) {
        for entry in self.jobs.values_mut() {
            entry.job.sent_count = 0;
            entry.job.remaining = entry.job.count;
        }
    }

    /// Check a timer tick
    ///
    /// Returns `None` for ticks of removed or stopped jobs and for ticks
    /// armed before the job's latest start or stop. Nothing is counted until
    /// [`commit_emission`](Self::commit_emission).
    pub fn on_tick(&self, tick: JobTick) -> Option<Emission> {
        let entry = self.jobs.get(&tick.job)?;
        if !entry.job.is_running() || entry.epoch != tick.epoch {
            debug!("Discarding stale tick for job {}", tick.job);
            return None;
        }

        Some(Emission {
            job: tick.job,
            template: entry.job.template.clone(),
        })
    }

    /// Count one sent frame for a running job
    ///
    /// A finite job that reaches zero remaining stops itself. Returns `None`
    /// when the job is gone or no longer running.
    pub fn commit_emission(&mut self, id: JobId) -> Option<Committed> {
        let entry = self.jobs.get_mut(&id)?;
        if !entry.job.is_running() {
            return None;
        }

        entry.job.sent_count += 1;
        if let Some(remaining) = entry.job.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }

        let finished = entry.job.is_exhausted();
        if finished {
            Self::halt(entry);
            info!("Periodic job {} completed its count", id);
        }

        Some(Committed {
            job: id,
            remaining: entry.job.remaining,
            finished,
        })
    }

    /// Snapshot of one job
    pub fn get(&self, id: JobId) -> Option<PeriodicJob> {
        self.jobs.get(&id).map(|e| e.job.clone())
    }

    /// Snapshot of every job ordered by id
    pub fn jobs(&self) -> Vec<PeriodicJob> {
        self.jobs.values().map(|e| e.job.clone()).collect()
    }

    /// Number of running jobs
    pub fn running_count(&self) -> usize {
        self.jobs.values().filter(|e| e.job.is_running()).count()
    }

    /// Number of jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no jobs are registered
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn halt(entry: &mut JobEntry) {
        entry.cancel_timer();
        entry.epoch += 1;
        entry.job.state = JobState::Stopped;
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        for entry in self.jobs.values_mut() {
            entry.cancel_timer();
        }
    }
}

impl fmt::Debug for PeriodicScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicScheduler")
            .field("jobs", &self.jobs.len())
            .field("running", &self.running_count())
            .finish()
    }
}

/// Timer task for one running job
async fn run_job_timer(tick: JobTick, period: Duration, tick_tx: mpsc::Sender<JobTick>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    // Delay keeps consecutive ticks at least one period apart after a stall
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if tick_tx.send(tick).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_frame::{CanId, FrameFlags};

    fn template(id: u32) -> FrameTemplate {
        FrameTemplate::new(CanId::standard(id).unwrap(), vec![0x11, 0x22], FrameFlags::CLASSIC)
            .unwrap()
    }

    fn scheduler() -> (PeriodicScheduler, mpsc::Receiver<JobTick>) {
        let (tx, rx) = mpsc::channel(16);
        (PeriodicScheduler::new(tx), rx)
    }

    #[test]
    fn test_job_config_validation() {
        assert_eq!(
            JobConfig::new(template(0x100), 0, None),
            Err(JobConfigError::ZeroInterval)
        );
        assert_eq!(
            JobConfig::new(template(0x100), 100, Some(0)),
            Err(JobConfigError::ZeroCount)
        );
        assert!(JobConfig::new(template(0x100), 100, Some(3)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_registers_stopped_job() {
        let (mut sched, _rx) = scheduler();
        let id = sched
            .add(JobConfig::new(template(0x100), 100, Some(2)).unwrap())
            .unwrap();

        let job = sched.get(id).unwrap();
        assert_eq!(job.state, JobState::Stopped);
        assert_eq!(job.remaining, Some(2));
        assert_eq!(sched.running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finite_job_stops_itself() {
        let (mut sched, mut rx) = scheduler();
        let id = sched
            .add(JobConfig::new(template(0x100), 2000, Some(3)).unwrap())
            .unwrap();
        sched.start(id).unwrap();

        let started = Instant::now();
        let mut emitted = Vec::new();
        while let Some(tick) = rx.recv().await {
            if let Some(emission) = sched.on_tick(tick) {
                let committed = sched.commit_emission(emission.job).unwrap();
                emitted.push((Instant::now() - started, committed.remaining));
                if committed.finished {
                    break;
                }
            }
        }

        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[0].0, Duration::from_millis(2000));
        assert_eq!(emitted[2].0, Duration::from_millis(6000));
        assert_eq!(emitted[2].1, Some(0));

        let job = sched.get(id).unwrap();
        assert_eq!(job.state, JobState::Stopped);
        assert_eq!(job.sent_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_queued_before_stop_is_discarded() {
        let (mut sched, mut rx) = scheduler();
        let id = sched
            .add(JobConfig::new(template(0x100), 10, None).unwrap())
            .unwrap();
        sched.start(id).unwrap();

        let tick = rx.recv().await.unwrap();
        sched.stop(id).unwrap();
        assert_eq!(sched.on_tick(tick), None);

        // Restarting arms a new epoch; the old tick still does not count
        sched.start(id).unwrap();
        assert_eq!(sched.on_tick(tick), None);
        let fresh = rx.recv().await.unwrap();
        assert!(sched.on_tick(fresh).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncommitted_tick_counts_nothing() {
        let (mut sched, mut rx) = scheduler();
        let id = sched
            .add(JobConfig::new(template(0x100), 10, Some(3)).unwrap())
            .unwrap();
        sched.start(id).unwrap();

        // Tick accepted, but the send never happened
        let tick = rx.recv().await.unwrap();
        assert_eq!(sched.on_tick(tick).unwrap().job, id);
        let job = sched.get(id).unwrap();
        assert_eq!(job.sent_count, 0);
        assert_eq!(job.remaining, Some(3));

        sched.stop(id).unwrap();
        assert_eq!(sched.commit_emission(id), None);
        assert_eq!(sched.get(id).unwrap().sent_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_errors() {
        let (mut sched, _rx) = scheduler();
        let id = sched
            .add(JobConfig::new(template(0x100), 10, None).unwrap())
            .unwrap();

        assert_eq!(sched.stop(id), Err(SchedulerStateError::NotRunning(id)));
        sched.start(id).unwrap();
        assert_eq!(sched.start(id), Err(SchedulerStateError::AlreadyRunning(id)));
        assert_eq!(
            sched.remove(id).map(|j| j.id),
            Err(SchedulerStateError::StillRunning(id))
        );
        assert!(sched.get(id).unwrap().is_running());

        sched.stop(id).unwrap();
        assert_eq!(sched.remove(id).unwrap().id, id);
        assert_eq!(
            sched.start(JobId(99)),
            Err(SchedulerStateError::UnknownJob(JobId(99)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_remaining_and_restart_after_completion_resets() {
        let (mut sched, mut rx) = scheduler();
        let id = sched
            .add(JobConfig::new(template(0x100), 10, Some(2)).unwrap())
            .unwrap();

        sched.start(id).unwrap();
        let tick = rx.recv().await.unwrap();
        sched.on_tick(tick).unwrap();
        sched.commit_emission(id).unwrap();
        sched.stop(id).unwrap();
        assert_eq!(sched.get(id).unwrap().remaining, Some(1));

        // Resume where it left off
        sched.start(id).unwrap();
        let tick = rx.recv().await.unwrap();
        sched.on_tick(tick).unwrap();
        assert!(sched.commit_emission(id).unwrap().finished);
        assert!(sched.get(id).unwrap().is_exhausted());

        // A finished job restarts with its full count
        sched.start(id).unwrap();
        assert_eq!(sched.get(id).unwrap().remaining, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_all_stop_all_and_reset() {
        let (mut sched, _rx) = scheduler();
        let a = sched
            .add(JobConfig::new(template(0x100), 10, Some(5)).unwrap())
            .unwrap();
        let b = sched
            .add(JobConfig::new(template(0x200), 20, None).unwrap())
            .unwrap();

        sched.start(a).unwrap();
        assert_eq!(sched.start_all(), vec![b]);
        assert_eq!(sched.running_count(), 2);

        assert_eq!(sched.stop_all(), vec![a, b]);
        assert_eq!(sched.running_count(), 0);
        assert!(sched.stop_all().is_empty());

        sched.reset_counters();
        assert_eq!(sched.get(a).unwrap().remaining, Some(5));
        assert_eq!(sched.get(a).unwrap().sent_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_tick_independently() {
        let (mut sched, mut rx) = scheduler();
        let fast = sched
            .add(JobConfig::new(template(0x100), 100, None).unwrap())
            .unwrap();
        let slow = sched
            .add(JobConfig::new(template(0x200), 250, None).unwrap())
            .unwrap();
        sched.start_all();

        let deadline = Instant::now() + Duration::from_millis(950);
        let mut fast_count = 0;
        let mut slow_count = 0;
        while let Ok(Some(tick)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            if let Some(emission) = sched.on_tick(tick) {
                sched.commit_emission(emission.job);
                if emission.job == fast {
                    fast_count += 1;
                } else if emission.job == slow {
                    slow_count += 1;
                }
            }
        }

        assert_eq!(fast_count, 9);
        assert_eq!(slow_count, 3);
    }
}
