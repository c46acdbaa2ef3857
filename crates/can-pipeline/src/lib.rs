//! CAN Frame Pipeline
//!
//! This crate takes every frame seen on a CAN channel, whether received,
//! sent by the operator or emitted by a periodic job, and runs it through
//! one serialized pipeline:
//!
//! 1. the **classifier** assigns a display category (TX, RX, DIAG, ERR or
//!    STALE) and tracks identical-payload runs per identifier
//! 2. the **statistics table** counts sightings per identifier
//! 3. the **history store** keeps every transmitted frame
//! 4. the **filter engine** decides whether the frame reaches presentation
//!    (ordered list, first enabled match wins, fail-open by default)
//!
//! # Actor Architecture
//!
//! [`PipelineHandle::spawn`] starts an actor that owns all of that state plus
//! the [`PeriodicScheduler`] and the driver session. Operator commands,
//! periodic job ticks and received frames are all messages to the actor, so
//! there is a single global frame order and no frame ever observes a
//! half-applied filter change. Presentation reads a broadcast stream of
//! [`PipelineEvent`]s that never blocks the actor.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use can_frame::{Bitrate, BusConfig, CanDriver};
//! use can_pipeline::{Filter, PipelineConfig, PipelineEvent, PipelineHandle};
//!
//! # async fn run(driver: Arc<dyn CanDriver>) -> Result<(), can_pipeline::PipelineError> {
//! let pipeline = PipelineHandle::spawn(driver, PipelineConfig::default());
//! let mut feed = pipeline.subscribe();
//!
//! pipeline.add_filter(Filter::reject_range("chatter", 0x100, 0x1FF)?).await?;
//! pipeline.connect(1, BusConfig::classic(Bitrate::Kbps500)).await?;
//!
//! while let Some(event) = feed.recv().await {
//!     if let PipelineEvent::FrameAdmitted { frame, category, .. } = event {
//!         println!("{} {}", category.label(), frame.id());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod classifier;
pub mod clock;
pub mod comments;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod handle;
pub mod history;
pub mod pipeline;
pub mod scheduler;
mod session;
pub mod stats;

// Re-export actor types
pub use actor::{run_pipeline_actor, PipelineCommand, PipelineStatus};
pub use handle::PipelineHandle;

// Re-export event types
pub use events::{DisconnectReason, FrameFeed, PipelineEvent};

// Re-export core types
pub use classifier::{Category, Classifier, StalenessTable, DEFAULT_STALE_THRESHOLD};
pub use clock::MonotonicClock;
pub use comments::CommentBook;
pub use config::PipelineConfig;
pub use error::{FilterConfigError, JobConfigError, PipelineError, SchedulerStateError};
pub use filter::{Filter, FilterEngine, FilterKind, FilterPolicy};
pub use history::HistoryStore;
pub use pipeline::{IngestOutcome, Pipeline, TrafficCounters};
pub use scheduler::{
    Committed, Emission, JobConfig, JobId, JobState, JobTick, PeriodicJob, PeriodicScheduler,
};
pub use stats::{GroupedStat, StatsAggregator};
