//! Nominal and data-phase bit rates

use std::fmt;
use std::str::FromStr;

/// Arbitration phase bit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Bitrate {
    /// 100 kbit/s
    Kbps100,
    /// 125 kbit/s
    Kbps125,
    /// 250 kbit/s
    Kbps250,
    /// 500 kbit/s
    #[default]
    Kbps500,
    /// 1 Mbit/s
    Mbps1,
}

impl Bitrate {
    /// All supported nominal rates, slowest first
    pub const ALL: [Bitrate; 5] = [
        Bitrate::Kbps100,
        Bitrate::Kbps125,
        Bitrate::Kbps250,
        Bitrate::Kbps500,
        Bitrate::Mbps1,
    ];

    /// Bits per second
    pub fn bits_per_second(&self) -> u32 {
        match self {
            Bitrate::Kbps100 => 100_000,
            Bitrate::Kbps125 => 125_000,
            Bitrate::Kbps250 => 250_000,
            Bitrate::Kbps500 => 500_000,
            Bitrate::Mbps1 => 1_000_000,
        }
    }

    /// Short label ("500k", "1M")
    pub fn label(&self) -> &'static str {
        match self {
            Bitrate::Kbps100 => "100k",
            Bitrate::Kbps125 => "125k",
            Bitrate::Kbps250 => "250k",
            Bitrate::Kbps500 => "500k",
            Bitrate::Mbps1 => "1M",
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bitrate::ALL
            .into_iter()
            .find(|b| b.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown bitrate: {}", s))
    }
}

/// CAN-FD data phase bit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FdBitrate {
    /// 1 Mbit/s
    Mbps1,
    /// 2 Mbit/s
    #[default]
    Mbps2,
    /// 4 Mbit/s
    Mbps4,
    /// 5 Mbit/s
    Mbps5,
    /// 8 Mbit/s
    Mbps8,
}

impl FdBitrate {
    /// All supported data phase rates, slowest first
    pub const ALL: [FdBitrate; 5] = [
        FdBitrate::Mbps1,
        FdBitrate::Mbps2,
        FdBitrate::Mbps4,
        FdBitrate::Mbps5,
        FdBitrate::Mbps8,
    ];

    /// Bits per second
    pub fn bits_per_second(&self) -> u32 {
        match self {
            FdBitrate::Mbps1 => 1_000_000,
            FdBitrate::Mbps2 => 2_000_000,
            FdBitrate::Mbps4 => 4_000_000,
            FdBitrate::Mbps5 => 5_000_000,
            FdBitrate::Mbps8 => 8_000_000,
        }
    }

    /// Short label ("2M")
    pub fn label(&self) -> &'static str {
        match self {
            FdBitrate::Mbps1 => "1M",
            FdBitrate::Mbps2 => "2M",
            FdBitrate::Mbps4 => "4M",
            FdBitrate::Mbps5 => "5M",
            FdBitrate::Mbps8 => "8M",
        }
    }
}

impl fmt::Display for FdBitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FdBitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FdBitrate::ALL
            .into_iter()
            .find(|b| b.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown FD bitrate: {}", s))
    }
}
