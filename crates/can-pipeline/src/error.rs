//! Error types for the pipeline

use can_frame::{DriverError, FrameValidationError};
use thiserror::Error;

use crate::scheduler::JobId;

/// Rejected filter definitions or filter lookups
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterConfigError {
    /// Range filter with `lo > hi`
    #[error("inverted range: 0x{lo:X} > 0x{hi:X}")]
    InvertedRange {
        /// Lower bound as given
        lo: u32,
        /// Upper bound as given
        hi: u32,
    },

    /// Identifier wider than 29 bits
    #[error("identifier 0x{0:X} exceeds 29 bits")]
    IdOutOfRange(u32),

    /// Mask filter that can never be meaningful
    #[error("invalid mask filter: base 0x{base:X}, mask 0x{mask:X}")]
    InvalidMask {
        /// Base identifier
        base: u32,
        /// Mask bits
        mask: u32,
    },

    /// A filter with this name already exists
    #[error("duplicate filter name: {0}")]
    DuplicateName(String),

    /// Filters must be named
    #[error("filter name is empty")]
    EmptyName,

    /// No filter with this name
    #[error("filter not found: {0}")]
    NotFound(String),
}

/// Rejected periodic job definitions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobConfigError {
    /// Interval must be positive
    #[error("interval must be greater than zero")]
    ZeroInterval,

    /// A finite repeat count must be positive (use `None` for infinite)
    #[error("repeat count must be greater than zero")]
    ZeroCount,

    /// Frame template failed validation
    #[error("invalid job template: {0}")]
    InvalidTemplate(#[from] FrameValidationError),
}

/// Scheduler operations that do not apply to a job's current state
///
/// These are reported to the caller and leave the scheduler unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerStateError {
    /// Start requested on a running job
    #[error("job {0} is already running")]
    AlreadyRunning(JobId),

    /// Stop requested on a stopped job
    #[error("job {0} is not running")]
    NotRunning(JobId),

    /// Remove requested on a running job
    #[error("job {0} must be stopped before removal")]
    StillRunning(JobId),

    /// No job with this id
    #[error("unknown job {0}")]
    UnknownJob(JobId),
}

/// Any error a pipeline command can report
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Frame validation failed
    #[error(transparent)]
    Frame(#[from] FrameValidationError),

    /// Filter configuration rejected
    #[error(transparent)]
    Filter(#[from] FilterConfigError),

    /// Job configuration rejected
    #[error(transparent)]
    Job(#[from] JobConfigError),

    /// Scheduler state does not allow the operation
    #[error(transparent)]
    Scheduler(#[from] SchedulerStateError),

    /// Driver failure (ends the session)
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Operation needs a connected session
    #[error("not connected")]
    NotConnected,

    /// Connect requested while a session is active
    #[error("already connected on channel {0}")]
    AlreadyConnected(u8),

    /// The pipeline actor has shut down
    #[error("pipeline actor is not running")]
    ActorClosed,
}
