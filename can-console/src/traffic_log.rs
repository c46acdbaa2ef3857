//! Bounded log of admitted traffic with text export
//!
//! Holds the most recent admitted frames for display. When full, the oldest
//! entry is evicted. Export writes one line per entry with the columns
//! Time, Dir, Type, ID, DLC, Data, ASCII, Flags and Comment.

use std::collections::VecDeque;
use std::path::Path;

use can_frame::display::{ascii_bytes, flags_label, hex_bytes};
use can_frame::{Frame, Timestamp};
use can_pipeline::Category;

/// One admitted frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// The frame
    pub frame: Frame,
    /// Display category
    pub category: Category,
    /// Operator comment at the time it was admitted
    pub comment: Option<String>,
}

/// Traffic log state
#[derive(Debug)]
pub struct TrafficLog {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    paused: bool,
    evicted: u64,
}

impl TrafficLog {
    /// Create a log holding at most `max_entries` (at least one)
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: VecDeque::with_capacity(max_entries.min(4096)),
            max_entries,
            paused: false,
            evicted: 0,
        }
    }

    /// Append an entry unless paused; returns whether it was kept
    pub fn push(&mut self, entry: LogEntry) -> bool {
        if self.paused {
            return false;
        }
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
        true
    }

    /// Stop or resume recording
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Whether recording is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped to stay within the size limit
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Format a capture time as seconds with microseconds
    fn format_timestamp(timestamp: Timestamp) -> String {
        let us = timestamp.as_micros();
        format!("{}.{:06}", us / 1_000_000, us % 1_000_000)
    }

    /// Format an entry as one export line
    pub fn format_entry(entry: &LogEntry) -> String {
        let frame = &entry.frame;
        format!(
            "{:>14}  {:<3} {:<5} {:<10} {:>2}  {:<47}  {:<16}  {:<11}  {}",
            Self::format_timestamp(frame.timestamp()),
            frame.direction().label(),
            entry.category.label(),
            frame.id().to_string(),
            frame.dlc(),
            hex_bytes(frame.data()),
            ascii_bytes(frame.data()),
            flags_label(frame),
            entry.comment.as_deref().unwrap_or(""),
        )
    }

    /// Format the whole log with a header
    pub fn format_log(&self) -> String {
        let mut output = String::new();
        output.push_str("# canscope traffic log\n");
        output.push_str(&format!("# Entries: {}\n", self.entries.len()));
        output.push_str(&format!(
            "{:>14}  {:<3} {:<5} {:<10} {:>2}  {:<47}  {:<16}  {:<11}  {}\n",
            "Time", "Dir", "Type", "ID", "DLC", "Data", "ASCII", "Flags", "Comment"
        ));

        for entry in &self.entries {
            output.push_str(Self::format_entry(entry).trim_end());
            output.push('\n');
        }
        output
    }

    /// Write the formatted log to `path`
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.format_log())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_frame::{CanId, Direction, FrameFlags};
    use proptest::prelude::*;

    fn entry(id: u32, data: &[u8], us: u64) -> LogEntry {
        LogEntry {
            frame: Frame::new(
                CanId::standard(id).unwrap(),
                data.to_vec(),
                FrameFlags::CLASSIC,
                Direction::Rx,
                Timestamp::from_micros(us),
            )
            .unwrap(),
            category: Category::Rx,
            comment: None,
        }
    }

    #[test]
    fn test_oldest_entries_are_evicted() {
        let mut log = TrafficLog::new(3);
        for i in 0..5 {
            log.push(entry(0x100 + i, &[], i as u64));
        }

        let ids: Vec<u32> = log.entries().map(|e| e.frame.id().raw()).collect();
        assert_eq!(ids, vec![0x102, 0x103, 0x104]);
        assert_eq!(log.evicted(), 2);
    }

    #[test]
    fn test_paused_log_ignores_entries() {
        let mut log = TrafficLog::new(10);
        log.set_paused(true);
        assert!(!log.push(entry(0x1, &[], 0)));
        assert!(log.is_empty());

        log.set_paused(false);
        assert!(log.push(entry(0x1, &[], 0)));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_export_columns() {
        let mut log = TrafficLog::new(10);
        let mut commented = entry(0x7E8, b"\x03A\x0D2", 1_500_000);
        commented.category = Category::Diag;
        commented.comment = Some("ECU response".into());
        log.push(commented);

        let text = log.format_log();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "# Entries: 1");
        assert!(lines[2].contains("Time"));
        assert!(lines[2].trim_end().ends_with("Comment"));

        let row = lines[3];
        assert!(row.contains("1.500000"));
        assert!(row.contains("RX  DIAG "));
        assert!(row.contains("0x7E8"));
        assert!(row.contains("03 41 0D 32"));
        assert!(row.contains(".A.2"));
        assert!(row.ends_with("ECU response"));
    }

    #[test]
    fn test_direction_and_category_have_their_own_columns() {
        let mut stale = entry(0x321, &[0xAA], 0);
        stale.category = Category::Stale;
        let row = TrafficLog::format_entry(&stale);

        let header = TrafficLog::new(1).format_log();
        let header = header.lines().nth(2).unwrap();
        let dir_col = header.find("Dir").unwrap();
        let type_col = header.find("Type").unwrap();

        assert_eq!(&row[dir_col..dir_col + 2], "RX");
        assert_eq!(&row[type_col..type_col + 5], "STALE");
    }

    proptest! {
        #[test]
        fn log_never_exceeds_its_size(max in 1usize..50, pushes in 0usize..200) {
            let mut log = TrafficLog::new(max);
            for i in 0..pushes {
                log.push(entry(0x10, &[], i as u64));
            }
            prop_assert_eq!(log.len(), pushes.min(max));
            prop_assert_eq!(log.evicted() as usize, pushes.saturating_sub(max));
        }
    }
}
