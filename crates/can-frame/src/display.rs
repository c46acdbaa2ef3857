//! Text rendering helpers for frame columns
//!
//! Shared by anything that lists frames as text (traffic logs, exports).

use crate::frame::{Direction, Frame};

/// Render a payload as space separated hex ("11 22 33")
pub fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a payload as ASCII, printable bytes as-is and everything else as '.'
pub fn ascii_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// Flag column for a frame ("EXT FD BRS")
pub fn flags_label(frame: &Frame) -> String {
    let mut flags = Vec::new();
    if frame.id().is_extended() {
        flags.push("EXT");
    }
    if frame.flags().fd {
        flags.push("FD");
    }
    if frame.flags().brs {
        flags.push("BRS");
    }
    if frame.direction() == Direction::Err {
        flags.push("ERR");
    }
    flags.join(" ")
}
