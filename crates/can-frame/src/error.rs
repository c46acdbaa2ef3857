//! Error types for frame construction and driver access

use thiserror::Error;

/// Errors raised when a frame (or frame template) fails validation
///
/// Frames are never truncated or padded to make them fit: construction
/// fails and nothing is stored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameValidationError {
    /// Payload length is not allowed for the frame's FD-ness
    #[error("invalid payload length {len} for {} frame", frame_kind(.fd))]
    InvalidLength {
        /// Offending payload length in bytes
        len: usize,
        /// Whether the frame was flagged as CAN-FD
        fd: bool,
    },

    /// Identifier does not fit the standard (11-bit) or extended (29-bit) range
    #[error("identifier 0x{id:X} out of range for {} id", id_kind(.extended))]
    IdOutOfRange {
        /// Offending identifier
        id: u32,
        /// Whether the identifier was tagged as extended
        extended: bool,
    },

    /// Bit rate switch requested on a classic frame
    #[error("BRS flag is only valid on CAN-FD frames")]
    BrsWithoutFd,

    /// DLC code outside 0..=15
    #[error("invalid DLC code {0}")]
    InvalidDlc(u8),
}

fn frame_kind(fd: &bool) -> &'static str {
    if *fd {
        "CAN-FD"
    } else {
        "classic CAN"
    }
}

fn id_kind(extended: &bool) -> &'static str {
    if *extended {
        "extended"
    } else {
        "standard"
    }
}

/// Errors reported by a hardware driver
///
/// The pipeline treats every driver error as fatal for the active session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Channel number outside the supported range or not present
    #[error("channel {0} unavailable")]
    ChannelUnavailable(u8),

    /// Operation on a handle that is not open
    #[error("channel not open")]
    NotOpen,

    /// Bus configuration rejected by the hardware
    #[error("configuration rejected: {0}")]
    Config(String),

    /// Transport or OS level failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Hardware reported a fault (bus-off, transmit error, ...)
    #[error("hardware fault: {0}")]
    Hardware(String),
}
