//! Append-only log of transmitted frames

use can_frame::{Direction, Frame};

/// Transmitted frames in send order
///
/// Unbounded; only an explicit [`HistoryStore::clear`] removes frames.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    frames: Vec<Frame>,
}

impl HistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transmitted frame
    ///
    /// Frames that are not `Tx` are not recorded; returns whether the frame
    /// was stored.
    pub fn record(&mut self, frame: &Frame) -> bool {
        if frame.direction() != Direction::Tx {
            return false;
        }
        self.frames.push(frame.clone());
        true
    }

    /// Every recorded frame in send order
    pub fn all(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of recorded frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_frame::{CanId, FrameFlags, Timestamp};

    fn frame(id: u32, direction: Direction) -> Frame {
        Frame::new(
            CanId::standard(id).unwrap(),
            vec![id as u8],
            FrameFlags::CLASSIC,
            direction,
            Timestamp::from_micros(id as u64),
        )
        .unwrap()
    }

    #[test]
    fn test_records_only_tx_in_order() {
        let mut history = HistoryStore::new();
        assert!(history.record(&frame(1, Direction::Tx)));
        assert!(!history.record(&frame(2, Direction::Rx)));
        assert!(history.record(&frame(3, Direction::Tx)));
        assert!(history.record(&frame(3, Direction::Tx)));

        let ids: Vec<u32> = history.all().iter().map(|f| f.id().raw()).collect();
        assert_eq!(ids, vec![1, 3, 3]);
    }

    #[test]
    fn test_clear_empties_the_store() {
        let mut history = HistoryStore::new();
        for id in 0..10 {
            history.record(&frame(id, Direction::Tx));
        }
        assert_eq!(history.len(), 10);

        history.clear();
        assert!(history.is_empty());
    }
}
