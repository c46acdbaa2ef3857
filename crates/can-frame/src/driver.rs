//! Hardware driver contract
//!
//! The pipeline talks to CAN hardware only through [`CanDriver`]. Real
//! bindings (vendor libraries, SocketCAN) and the simulated bus both
//! implement it. All methods take `&self`; implementations synchronize
//! internally so the receive thread and the send path can share one driver.

use std::time::Duration;

use crate::bitrate::{Bitrate, FdBitrate};
use crate::error::DriverError;
use crate::frame::Frame;

/// Lowest channel number accepted by [`CanDriver::open`]
pub const MIN_CHANNEL: u8 = 1;

/// Highest channel number accepted by [`CanDriver::open`]
pub const MAX_CHANNEL: u8 = 4;

/// Handle to an opened channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u8);

impl ChannelHandle {
    /// Channel number this handle was opened on
    pub fn channel(&self) -> u8 {
        self.0
    }
}

/// Bus timing configuration applied after opening a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusConfig {
    /// Nominal (arbitration) bit rate
    pub bitrate: Bitrate,
    /// Enable CAN-FD
    #[cfg_attr(feature = "serde", serde(default))]
    pub fd: bool,
    /// Data phase bit rate (FD only)
    #[cfg_attr(feature = "serde", serde(default))]
    pub fd_bitrate: Option<FdBitrate>,
}

impl BusConfig {
    /// Classic CAN at the given rate
    pub fn classic(bitrate: Bitrate) -> Self {
        Self {
            bitrate,
            fd: false,
            fd_bitrate: None,
        }
    }

    /// CAN-FD with the given nominal and data rates
    pub fn fd(bitrate: Bitrate, fd_bitrate: FdBitrate) -> Self {
        Self {
            bitrate,
            fd: true,
            fd_bitrate: Some(fd_bitrate),
        }
    }
}

/// Check a channel number against the supported range
pub fn validate_channel(channel: u8) -> Result<(), DriverError> {
    if (MIN_CHANNEL..=MAX_CHANNEL).contains(&channel) {
        Ok(())
    } else {
        Err(DriverError::ChannelUnavailable(channel))
    }
}

/// Narrow interface to CAN hardware
pub trait CanDriver: Send + Sync {
    /// Open a channel (1..=4)
    fn open(&self, channel: u8) -> Result<ChannelHandle, DriverError>;

    /// Apply bus timing to an open channel
    fn configure(&self, handle: ChannelHandle, config: &BusConfig) -> Result<(), DriverError>;

    /// Transmit a frame
    ///
    /// Called from the pipeline's serialized stage, so received frames wait
    /// while it runs. Implementations should hand the frame to the hardware
    /// queue and return rather than wait for bus acknowledgement.
    fn send(&self, handle: ChannelHandle, frame: &Frame) -> Result<(), DriverError>;

    /// Wait up to `timeout` for the next frame
    ///
    /// Returns `Ok(None)` on timeout; a timeout is not an error.
    fn receive(&self, handle: ChannelHandle, timeout: Duration)
        -> Result<Option<Frame>, DriverError>;

    /// Close the channel. Closing an already closed handle is a no-op.
    ///
    /// A `receive` blocked on the same channel should return promptly.
    fn close(&self, handle: ChannelHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_range() {
        assert!(validate_channel(1).is_ok());
        assert!(validate_channel(4).is_ok());
        assert_eq!(validate_channel(0), Err(DriverError::ChannelUnavailable(0)));
        assert_eq!(validate_channel(5), Err(DriverError::ChannelUnavailable(5)));
    }
}
