//! Synchronous pipeline core
//!
//! Owns every piece of per-frame state. The actor wraps it so that all
//! producers go through one serialized `ingest`, but the core itself is plain
//! data and can be driven directly in tests.

use can_frame::{CanId, Direction, Frame};
use serde::Serialize;
use tracing::trace;

use crate::classifier::{Category, Classifier};
use crate::comments::CommentBook;
use crate::config::PipelineConfig;
use crate::filter::FilterEngine;
use crate::history::HistoryStore;
use crate::stats::StatsAggregator;

/// Frame totals by direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficCounters {
    /// Frames sent by this node
    pub tx: u64,
    /// Frames received from the bus
    pub rx: u64,
    /// Error frames
    pub err: u64,
    /// Sends the driver refused
    pub send_failures: u64,
}

impl TrafficCounters {
    fn count(&mut self, direction: Direction) {
        match direction {
            Direction::Tx => self.tx += 1,
            Direction::Rx => self.rx += 1,
            Direction::Err => self.err += 1,
        }
    }
}

/// Result of ingesting one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Display category
    pub category: Category,
    /// Whether the filters let the frame through to presentation
    pub admitted: bool,
}

/// Frame processing state
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    filters: FilterEngine,
    classifier: Classifier,
    stats: StatsAggregator,
    history: HistoryStore,
    comments: CommentBook,
    counters: TrafficCounters,
}

impl Pipeline {
    /// Build an empty pipeline
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            filters: FilterEngine::with_default_policy(config.default_policy),
            classifier: Classifier::new(config.diagnostic_ids.iter().copied(), config.stale_threshold),
            stats: StatsAggregator::new(),
            history: HistoryStore::new(),
            comments: CommentBook::new(),
            counters: TrafficCounters::default(),
            config,
        }
    }

    /// Run one frame through classify, stats, history and filters
    ///
    /// Staleness, statistics and history see every frame; the filters only
    /// decide whether it reaches presentation.
    pub fn ingest(&mut self, frame: &Frame) -> IngestOutcome {
        let category = self.classifier.classify(frame);
        self.stats.update(frame);
        self.history.record(frame);
        self.counters.count(frame.direction());
        let admitted = self.filters.admit(frame);

        trace!(
            "{} {} {} -> {} ({})",
            frame.timestamp().as_micros(),
            frame.direction().label(),
            frame.id(),
            category.label(),
            if admitted { "shown" } else { "hidden" }
        );

        IngestOutcome { category, admitted }
    }

    /// Count a send the driver refused
    pub fn record_send_failure(&mut self) {
        self.counters.send_failures += 1;
    }

    /// Configuration the pipeline was built with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Filter list
    pub fn filters(&self) -> &FilterEngine {
        &self.filters
    }

    /// Mutable filter list
    pub fn filters_mut(&mut self) -> &mut FilterEngine {
        &mut self.filters
    }

    /// Classifier
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Mutable classifier
    pub fn classifier_mut(&mut self) -> &mut Classifier {
        &mut self.classifier
    }

    /// Statistics table handle
    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Transmit history
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Operator comments
    pub fn comments(&self) -> &CommentBook {
        &self.comments
    }

    /// Comment for an identifier
    pub fn comment_for(&self, id: CanId) -> Option<&str> {
        self.comments.get(id.raw())
    }

    /// Set or clear (blank text) an identifier's comment
    pub fn set_comment(&mut self, id: u32, text: impl Into<String>) {
        self.comments.set(id, text);
    }

    /// Traffic totals
    pub fn counters(&self) -> TrafficCounters {
        self.counters
    }

    /// Empty the transmit history
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Clear the statistics table and traffic totals
    pub fn reset_stats(&mut self) {
        self.stats.reset();
        self.counters = TrafficCounters::default();
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterPolicy};
    use can_frame::{FrameFlags, Timestamp};

    fn frame(id: u32, data: &[u8], direction: Direction, us: u64) -> Frame {
        Frame::new(
            CanId::standard(id).unwrap(),
            data.to_vec(),
            FrameFlags::CLASSIC,
            direction,
            Timestamp::from_micros(us),
        )
        .unwrap()
    }

    #[test]
    fn test_hidden_frames_still_count() {
        let mut pipeline = Pipeline::default();
        pipeline
            .filters_mut()
            .add(Filter::reject_range("hide", 0x300, 0x3FF).unwrap())
            .unwrap();

        for i in 0..5 {
            let outcome = pipeline.ingest(&frame(0x321, &[0xAA], Direction::Rx, i));
            assert!(!outcome.admitted);
        }

        let id = CanId::standard(0x321).unwrap();
        assert_eq!(pipeline.stats().get(id).unwrap().count, 5);
        assert_eq!(pipeline.classifier().staleness().run_length(id), 5);

        // Staleness carried on while hidden
        pipeline.filters_mut().disable_all();
        let outcome = pipeline.ingest(&frame(0x321, &[0xAA], Direction::Rx, 6));
        assert_eq!(outcome.category, Category::Stale);
        assert!(outcome.admitted);
    }

    #[test]
    fn test_only_tx_frames_enter_history() {
        let mut pipeline = Pipeline::default();
        pipeline.ingest(&frame(0x100, &[1], Direction::Tx, 1));
        pipeline.ingest(&frame(0x200, &[2], Direction::Rx, 2));
        pipeline.ingest(&frame(0x300, &[3], Direction::Err, 3));
        pipeline.ingest(&frame(0x101, &[4], Direction::Tx, 4));

        let ids: Vec<u32> = pipeline.history().all().iter().map(|f| f.id().raw()).collect();
        assert_eq!(ids, vec![0x100, 0x101]);
        assert_eq!(
            pipeline.counters(),
            TrafficCounters {
                tx: 2,
                rx: 1,
                err: 1,
                send_failures: 0
            }
        );
    }

    #[test]
    fn test_grouped_stats_keep_last_payload() {
        let mut pipeline = Pipeline::default();
        pipeline.ingest(&frame(0x744, &[0xA], Direction::Rx, 10));
        pipeline.ingest(&frame(0x744, &[0xA], Direction::Rx, 20));
        pipeline.ingest(&frame(0x744, &[0xB], Direction::Rx, 30));

        let stat = pipeline.stats().get(CanId::standard(0x744).unwrap()).unwrap();
        assert_eq!(stat.count, 3);
        assert_eq!(stat.last_data, vec![0xB]);
        assert_eq!(stat.last_time, Timestamp::from_micros(30));
    }

    #[test]
    fn test_fail_closed_default() {
        let mut pipeline = Pipeline::new(PipelineConfig {
            default_policy: FilterPolicy::Reject,
            ..PipelineConfig::default()
        });
        assert!(!pipeline.ingest(&frame(0x100, &[], Direction::Rx, 0)).admitted);

        pipeline
            .filters_mut()
            .add(Filter::accept_single("engine", 0x100).unwrap())
            .unwrap();
        assert!(pipeline.ingest(&frame(0x100, &[], Direction::Rx, 1)).admitted);
    }

    #[test]
    fn test_reset_keeps_history_and_comments() {
        let mut pipeline = Pipeline::new(PipelineConfig {
            diagnostic_ids: vec![0x7DF],
            ..PipelineConfig::default()
        });
        pipeline.set_comment(0x7DF, "OBD request");
        let outcome = pipeline.ingest(&frame(0x7DF, &[2, 1, 0], Direction::Tx, 0));
        assert_eq!(outcome.category, Category::Diag);

        pipeline.reset_stats();
        assert!(pipeline.stats().is_empty());
        assert_eq!(pipeline.counters(), TrafficCounters::default());
        assert_eq!(pipeline.history().len(), 1);
        assert_eq!(
            pipeline.comment_for(CanId::standard(0x7DF).unwrap()),
            Some("OBD request")
        );

        pipeline.clear_history();
        assert!(pipeline.history().is_empty());
    }
}
