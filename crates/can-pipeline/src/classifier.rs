//! Frame classification (display category and staleness)
//!
//! Decision order, first match wins:
//! 1. error frames are `Err`
//! 2. identifiers in the diagnostic set are `Diag`
//! 3. identifiers repeating an identical payload `stale_threshold` times in a
//!    row are `Stale`
//! 4. otherwise `Tx` or `Rx` by direction
//!
//! The run-length table is updated for every ingested frame, whether or not
//! the frame is later shown.

use std::collections::{HashMap, HashSet};

use can_frame::{CanId, Direction, Frame};
use serde::{Deserialize, Serialize};

/// Default number of identical payloads in a row before a frame is stale
pub const DEFAULT_STALE_THRESHOLD: u32 = 5;

/// Display category assigned to each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Sent by this node
    Tx,
    /// Received from the bus
    Rx,
    /// Diagnostic protocol traffic
    Diag,
    /// Error frame
    Err,
    /// Repeating unchanged payload
    Stale,
}

impl Category {
    /// Short label
    pub fn label(&self) -> &'static str {
        match self {
            Category::Tx => "TX",
            Category::Rx => "RX",
            Category::Diag => "DIAG",
            Category::Err => "ERR",
            Category::Stale => "STALE",
        }
    }

    /// Suggested row color
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            Category::Tx => [100, 180, 255],   // Light blue
            Category::Rx => [100, 255, 180],   // Light green
            Category::Diag => [255, 180, 100], // Orange
            Category::Err => [255, 90, 90],    // Red
            Category::Stale => [128, 128, 128], // Gray
        }
    }

    /// Whether the row should be drawn faded
    pub fn is_faded(&self) -> bool {
        matches!(self, Category::Stale)
    }
}

#[derive(Debug, Clone)]
struct PayloadRun {
    last: Vec<u8>,
    length: u32,
}

/// Per-identifier count of consecutive identical payloads
#[derive(Debug, Clone, Default)]
pub struct StalenessTable {
    runs: HashMap<CanId, PayloadRun>,
}

impl StalenessTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting and return the current run length for its identifier
    pub fn observe(&mut self, frame: &Frame) -> u32 {
        match self.runs.get_mut(&frame.id()) {
            Some(run) if run.last == frame.data() => {
                run.length = run.length.saturating_add(1);
                run.length
            }
            Some(run) => {
                run.last.clear();
                run.last.extend_from_slice(frame.data());
                run.length = 1;
                1
            }
            None => {
                self.runs.insert(
                    frame.id(),
                    PayloadRun {
                        last: frame.data().to_vec(),
                        length: 1,
                    },
                );
                1
            }
        }
    }

    /// Current run length for an identifier (0 if never seen)
    pub fn run_length(&self, id: CanId) -> u32 {
        self.runs.get(&id).map(|r| r.length).unwrap_or(0)
    }

    /// Number of tracked identifiers
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether no identifier has been seen
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Forget every run
    pub fn clear(&mut self) {
        self.runs.clear();
    }
}

/// Assigns categories to frames
#[derive(Debug, Clone)]
pub struct Classifier {
    diagnostic_ids: HashSet<u32>,
    stale_threshold: u32,
    staleness: StalenessTable,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(std::iter::empty(), DEFAULT_STALE_THRESHOLD)
    }
}

impl Classifier {
    /// Create a classifier with a diagnostic id set and stale threshold
    ///
    /// A threshold of 0 is treated as 1.
    pub fn new(diagnostic_ids: impl IntoIterator<Item = u32>, stale_threshold: u32) -> Self {
        Self {
            diagnostic_ids: diagnostic_ids.into_iter().collect(),
            stale_threshold: stale_threshold.max(1),
            staleness: StalenessTable::new(),
        }
    }

    /// Update staleness for `frame` and return its category
    pub fn classify(&mut self, frame: &Frame) -> Category {
        let run = self.staleness.observe(frame);
        self.categorize(frame, run)
    }

    /// Category for a frame given its current run length, without side effects
    pub fn categorize(&self, frame: &Frame, run_length: u32) -> Category {
        if frame.direction() == Direction::Err {
            return Category::Err;
        }
        if self.diagnostic_ids.contains(&frame.id().raw()) {
            return Category::Diag;
        }
        if run_length >= self.stale_threshold {
            return Category::Stale;
        }
        match frame.direction() {
            Direction::Tx => Category::Tx,
            _ => Category::Rx,
        }
    }

    /// Replace the diagnostic set
    pub fn set_diagnostic_ids(&mut self, ids: impl IntoIterator<Item = u32>) {
        self.diagnostic_ids = ids.into_iter().collect();
    }

    /// Run length needed for `Stale`
    pub fn stale_threshold(&self) -> u32 {
        self.stale_threshold
    }

    /// Run-length table
    pub fn staleness(&self) -> &StalenessTable {
        &self.staleness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_frame::{FrameFlags, Timestamp};
    use proptest::prelude::*;

    fn frame(id: u32, data: &[u8], direction: Direction) -> Frame {
        Frame::new(
            CanId::standard(id).unwrap(),
            data.to_vec(),
            FrameFlags::CLASSIC,
            direction,
            Timestamp::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_direction_categories() {
        let mut classifier = Classifier::default();
        assert_eq!(classifier.classify(&frame(0x100, &[1], Direction::Tx)), Category::Tx);
        assert_eq!(classifier.classify(&frame(0x200, &[1], Direction::Rx)), Category::Rx);
        assert_eq!(classifier.classify(&frame(0x300, &[1], Direction::Err)), Category::Err);
    }

    #[test]
    fn test_only_stale_rows_are_faded_and_colors_differ() {
        let all = [
            Category::Tx,
            Category::Rx,
            Category::Diag,
            Category::Err,
            Category::Stale,
        ];
        let faded: Vec<Category> = all.iter().copied().filter(Category::is_faded).collect();
        assert_eq!(faded, vec![Category::Stale]);

        let colors: HashSet<[u8; 3]> = all.iter().map(Category::rgb).collect();
        assert_eq!(colors.len(), all.len());
    }

    #[test]
    fn test_replacing_diagnostic_set() {
        let mut classifier = Classifier::new([0x7DF], DEFAULT_STALE_THRESHOLD);
        classifier.set_diagnostic_ids([0x7E0]);
        assert_eq!(classifier.classify(&frame(0x7DF, &[1], Direction::Tx)), Category::Tx);
        assert_eq!(classifier.classify(&frame(0x7E0, &[1], Direction::Tx)), Category::Diag);
    }

    #[test]
    fn test_diagnostic_overrides_direction_not_error() {
        let mut classifier = Classifier::new([0x7E0, 0x7E8], DEFAULT_STALE_THRESHOLD);
        assert_eq!(classifier.classify(&frame(0x7E0, &[2], Direction::Tx)), Category::Diag);
        assert_eq!(classifier.classify(&frame(0x7E8, &[3], Direction::Rx)), Category::Diag);
        assert_eq!(classifier.classify(&frame(0x7E8, &[4], Direction::Err)), Category::Err);
    }

    #[test]
    fn test_fifth_identical_payload_is_stale() {
        let mut classifier = Classifier::default();
        let payload = [0xDE, 0xAD];

        for _ in 0..4 {
            assert_eq!(classifier.classify(&frame(0x321, &payload, Direction::Rx)), Category::Rx);
        }
        assert_eq!(classifier.classify(&frame(0x321, &payload, Direction::Rx)), Category::Stale);
        assert_eq!(classifier.classify(&frame(0x321, &payload, Direction::Rx)), Category::Stale);

        // Payload change resets the run immediately
        assert_eq!(classifier.classify(&frame(0x321, &[0xBE, 0xEF], Direction::Rx)), Category::Rx);
        assert_eq!(classifier.staleness().run_length(CanId::standard(0x321).unwrap()), 1);
    }

    #[test]
    fn test_diagnostic_id_never_turns_stale() {
        let mut classifier = Classifier::new([0x7DF], 5);
        for _ in 0..4 {
            classifier.classify(&frame(0x7DF, &[0x01], Direction::Tx));
        }
        assert_eq!(classifier.classify(&frame(0x7DF, &[0x01], Direction::Tx)), Category::Diag);
        assert!(classifier.staleness().run_length(CanId::standard(0x7DF).unwrap()) >= 5);
    }

    #[test]
    fn test_runs_are_tracked_per_identifier() {
        let mut table = StalenessTable::new();
        assert_eq!(table.observe(&frame(0x1, &[1], Direction::Rx)), 1);
        assert_eq!(table.observe(&frame(0x2, &[1], Direction::Rx)), 1);
        assert_eq!(table.observe(&frame(0x1, &[1], Direction::Rx)), 2);
        assert_eq!(table.observe(&frame(0x2, &[1], Direction::Tx)), 2);
        assert_eq!(table.len(), 2);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.run_length(CanId::standard(0x1).unwrap()), 0);
    }

    proptest! {
        #[test]
        fn error_frames_are_always_err(
            id in 0u32..0x800,
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..=8), 1..20),
        ) {
            let mut classifier = Classifier::new([id], 5);
            for data in payloads {
                prop_assert_eq!(classifier.classify(&frame(id, &data, Direction::Err)), Category::Err);
            }
        }
    }
}
