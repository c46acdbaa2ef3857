//! Frame value types
//!
//! A [`Frame`] is validated once at construction and never mutated after.
//! The same payload rules apply to [`FrameTemplate`], which describes a frame
//! to be sent later (manual send or periodic job).

use std::fmt;

use crate::dlc::{is_valid_len, len_to_dlc};
use crate::error::FrameValidationError;

/// Largest 11-bit identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest 29-bit identifier
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// CAN identifier tagged with its width
///
/// Ordering compares the raw value first, so sorted collections list ids
/// in ascending numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "CanIdRepr", into = "CanIdRepr")
)]
pub struct CanId {
    raw: u32,
    extended: bool,
}

impl CanId {
    /// Create an identifier, checking it against the range for its width
    pub fn new(raw: u32, extended: bool) -> Result<Self, FrameValidationError> {
        let max = if extended {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if raw > max {
            return Err(FrameValidationError::IdOutOfRange { id: raw, extended });
        }
        Ok(Self { raw, extended })
    }

    /// Create an 11-bit identifier
    pub fn standard(raw: u32) -> Result<Self, FrameValidationError> {
        Self::new(raw, false)
    }

    /// Create a 29-bit identifier
    pub fn extended(raw: u32) -> Result<Self, FrameValidationError> {
        Self::new(raw, true)
    }

    /// Numeric identifier value
    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Whether this is a 29-bit identifier
    pub fn is_extended(&self) -> bool {
        self.extended
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0x{:08X}", self.raw)
        } else {
            write!(f, "0x{:03X}", self.raw)
        }
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct CanIdRepr {
    id: u32,
    #[serde(default)]
    extended: bool,
}

#[cfg(feature = "serde")]
impl TryFrom<CanIdRepr> for CanId {
    type Error = FrameValidationError;

    fn try_from(repr: CanIdRepr) -> Result<Self, Self::Error> {
        CanId::new(repr.id, repr.extended)
    }
}

#[cfg(feature = "serde")]
impl From<CanId> for CanIdRepr {
    fn from(id: CanId) -> Self {
        Self {
            id: id.raw,
            extended: id.extended,
        }
    }
}

/// Direction of a frame relative to this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Sent by this node
    Tx,
    /// Received from the bus
    Rx,
    /// Error frame reported by the controller
    Err,
}

impl Direction {
    /// Short column label
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Tx => "TX",
            Direction::Rx => "RX",
            Direction::Err => "ERR",
        }
    }
}

/// CAN-FD related frame flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameFlags {
    /// CAN-FD frame
    #[cfg_attr(feature = "serde", serde(default))]
    pub fd: bool,
    /// Bit rate switch for the data phase (FD only)
    #[cfg_attr(feature = "serde", serde(default))]
    pub brs: bool,
}

impl FrameFlags {
    /// Classic CAN frame
    pub const CLASSIC: Self = Self {
        fd: false,
        brs: false,
    };

    /// CAN-FD frame without bit rate switch
    pub const FD: Self = Self {
        fd: true,
        brs: false,
    };

    /// CAN-FD frame with bit rate switch
    pub const FD_BRS: Self = Self { fd: true, brs: true };
}

/// Monotonic capture time in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create from a microsecond count
    pub const fn from_micros(us: u64) -> Self {
        Self(us)
    }

    /// Microseconds since the clock origin
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Microseconds elapsed since `earlier` (zero if `earlier` is later)
    pub fn micros_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

fn validate_payload(len: usize, flags: FrameFlags) -> Result<(), FrameValidationError> {
    if flags.brs && !flags.fd {
        return Err(FrameValidationError::BrsWithoutFd);
    }
    if !is_valid_len(len, flags.fd) {
        return Err(FrameValidationError::InvalidLength { len, fd: flags.fd });
    }
    Ok(())
}

/// One CAN or CAN-FD event
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "FrameRepr", into = "FrameRepr")
)]
pub struct Frame {
    id: CanId,
    data: Vec<u8>,
    flags: FrameFlags,
    direction: Direction,
    timestamp: Timestamp,
}

impl Frame {
    /// Build a frame, rejecting payloads that do not fit its FD-ness
    pub fn new(
        id: CanId,
        data: impl Into<Vec<u8>>,
        flags: FrameFlags,
        direction: Direction,
        timestamp: Timestamp,
    ) -> Result<Self, FrameValidationError> {
        let data = data.into();
        validate_payload(data.len(), flags)?;
        Ok(Self {
            id,
            data,
            flags,
            direction,
            timestamp,
        })
    }

    /// Identifier
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// FD flags
    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    /// Direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Capture time
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Same frame with a different capture time
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether this is a CAN-FD frame
    pub fn is_fd(&self) -> bool {
        self.flags.fd
    }

    /// Data length code for the payload
    pub fn dlc(&self) -> u8 {
        // Construction guarantees the length is a table entry.
        len_to_dlc(self.data.len()).unwrap_or(0)
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct FrameRepr {
    id: u32,
    #[serde(default)]
    extended: bool,
    data: Vec<u8>,
    #[serde(default)]
    fd: bool,
    #[serde(default)]
    brs: bool,
    direction: Direction,
    timestamp_us: u64,
}

#[cfg(feature = "serde")]
impl TryFrom<FrameRepr> for Frame {
    type Error = FrameValidationError;

    fn try_from(repr: FrameRepr) -> Result<Self, Self::Error> {
        Frame::new(
            CanId::new(repr.id, repr.extended)?,
            repr.data,
            FrameFlags {
                fd: repr.fd,
                brs: repr.brs,
            },
            repr.direction,
            Timestamp::from_micros(repr.timestamp_us),
        )
    }
}

#[cfg(feature = "serde")]
impl From<Frame> for FrameRepr {
    fn from(frame: Frame) -> Self {
        Self {
            id: frame.id.raw,
            extended: frame.id.extended,
            data: frame.data,
            fd: frame.flags.fd,
            brs: frame.flags.brs,
            direction: frame.direction,
            timestamp_us: frame.timestamp.0,
        }
    }
}

/// A validated frame description that can be stamped into frames on demand
///
/// Used for manual sends and as the payload of periodic jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "TemplateRepr", into = "TemplateRepr")
)]
pub struct FrameTemplate {
    id: CanId,
    data: Vec<u8>,
    flags: FrameFlags,
}

impl FrameTemplate {
    /// Validate a template the same way [`Frame::new`] validates a frame
    pub fn new(
        id: CanId,
        data: impl Into<Vec<u8>>,
        flags: FrameFlags,
    ) -> Result<Self, FrameValidationError> {
        let data = data.into();
        validate_payload(data.len(), flags)?;
        Ok(Self { id, data, flags })
    }

    /// Identifier
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// FD flags
    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    /// Stamp a concrete frame from this template
    pub fn to_frame(&self, direction: Direction, timestamp: Timestamp) -> Frame {
        Frame {
            id: self.id,
            data: self.data.clone(),
            flags: self.flags,
            direction,
            timestamp,
        }
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct TemplateRepr {
    id: u32,
    #[serde(default)]
    extended: bool,
    data: Vec<u8>,
    #[serde(default)]
    fd: bool,
    #[serde(default)]
    brs: bool,
}

#[cfg(feature = "serde")]
impl TryFrom<TemplateRepr> for FrameTemplate {
    type Error = FrameValidationError;

    fn try_from(repr: TemplateRepr) -> Result<Self, Self::Error> {
        FrameTemplate::new(
            CanId::new(repr.id, repr.extended)?,
            repr.data,
            FrameFlags {
                fd: repr.fd,
                brs: repr.brs,
            },
        )
    }
}

#[cfg(feature = "serde")]
impl From<FrameTemplate> for TemplateRepr {
    fn from(template: FrameTemplate) -> Self {
        Self {
            id: template.id.raw,
            extended: template.id.extended,
            data: template.data,
            fd: template.flags.fd,
            brs: template.flags.brs,
        }
    }
}
