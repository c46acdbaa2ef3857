//! CAN Frame Library
//!
//! This crate provides the value types shared by every part of the
//! traffic pipeline:
//!
//! - **Frame**: an immutable, validated CAN or CAN-FD event
//! - **FrameTemplate**: a validated frame description used for sends
//! - **DLC table**: classic and FD payload length rules
//! - **Bitrates**: nominal and data-phase rates
//! - **Driver contract**: the `CanDriver` trait hardware bindings implement
//!
//! Validation happens once, at construction. A payload that does not fit
//! the frame's FD-ness is rejected, never truncated.
//!
//! # Example
//!
//! ```rust
//! use can_frame::{CanId, Direction, Frame, FrameFlags, FrameValidationError, Timestamp};
//!
//! let id = CanId::standard(0x7E0).unwrap();
//! let frame = Frame::new(id, vec![0x02, 0x3E, 0x00], FrameFlags::CLASSIC, Direction::Tx, Timestamp::from_micros(0)).unwrap();
//! assert_eq!(frame.dlc(), 3);
//!
//! // 9 bytes is not a legal FD length
//! let err = Frame::new(id, vec![0u8; 9], FrameFlags::FD, Direction::Tx, Timestamp::from_micros(0));
//! assert!(matches!(err, Err(FrameValidationError::InvalidLength { len: 9, fd: true })));
//! ```

pub mod bitrate;
pub mod display;
pub mod dlc;
pub mod driver;
pub mod error;
pub mod frame;

pub use bitrate::{Bitrate, FdBitrate};
pub use driver::{validate_channel, BusConfig, CanDriver, ChannelHandle, MAX_CHANNEL, MIN_CHANNEL};
pub use error::{DriverError, FrameValidationError};
pub use frame::{
    CanId, Direction, Frame, FrameFlags, FrameTemplate, Timestamp, MAX_EXTENDED_ID,
    MAX_STANDARD_ID,
};
