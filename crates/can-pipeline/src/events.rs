//! Event stream for presentation
//!
//! Admitted frames and lifecycle changes leave the pipeline over one
//! broadcast channel, in the order the actor produced them. The channel is
//! bounded and never waits for readers: a subscriber that falls behind loses
//! the oldest events and [`FrameFeed`] counts how many.

use can_frame::{BusConfig, DriverError, Frame};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

use crate::classifier::Category;
use crate::scheduler::JobId;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Operator disconnect or shutdown
    Requested,
    /// The driver failed
    DriverFault(DriverError),
}

/// Event emitted by the pipeline actor
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    // -------------------------------------------------------------------------
    // Traffic
    // -------------------------------------------------------------------------
    /// A frame passed the filters
    FrameAdmitted {
        /// The frame
        frame: Frame,
        /// Display category
        category: Category,
        /// Operator comment for the identifier, if any
        comment: Option<String>,
    },

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------
    /// Filter appended to the list
    FilterAdded {
        /// Filter name
        name: String,
    },
    /// Filter removed
    FilterRemoved {
        /// Filter name
        name: String,
    },
    /// One filter enabled or disabled
    FilterToggled {
        /// Filter name
        name: String,
        /// New state
        enabled: bool,
    },
    /// Every filter enabled or disabled at once
    AllFiltersToggled {
        /// New state
        enabled: bool,
    },

    // -------------------------------------------------------------------------
    // Periodic jobs
    // -------------------------------------------------------------------------
    /// Job registered
    JobAdded {
        /// Job id
        job: JobId,
    },
    /// Job removed
    JobRemoved {
        /// Job id
        job: JobId,
    },
    /// Job timer armed
    JobStarted {
        /// Job id
        job: JobId,
    },
    /// Job stopped by the operator or by a session end
    JobStopped {
        /// Job id
        job: JobId,
    },
    /// Job sent its last frame and stopped itself
    JobCompleted {
        /// Job id
        job: JobId,
    },

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------
    /// Driver channel opened and configured
    SessionConnected {
        /// Channel number
        channel: u8,
        /// Bus configuration applied
        config: BusConfig,
    },
    /// Session ended
    SessionDisconnected {
        /// Channel number
        channel: u8,
        /// Why it ended
        reason: DisconnectReason,
    },

    // -------------------------------------------------------------------------
    // Stores
    // -------------------------------------------------------------------------
    /// Transmit history emptied
    HistoryCleared,
    /// Statistics table and counters cleared
    StatsReset,

    /// Something failed outside a command reply (driver faults)
    Error(String),
}

/// Subscriber side of the event stream
///
/// Tracks how many events were lost because this subscriber lagged.
#[derive(Debug)]
pub struct FrameFeed {
    rx: broadcast::Receiver<PipelineEvent>,
    dropped: u64,
}

impl FrameFeed {
    /// Wrap a broadcast receiver
    pub fn new(rx: broadcast::Receiver<PipelineEvent>) -> Self {
        Self { rx, dropped: 0 }
    }

    /// Next event, or `None` once the pipeline has shut down
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.note_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.note_lag(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Events lost to lag so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn note_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        warn!("Event subscriber lagged, dropped {} event(s)", skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lagging_feed_counts_drops() {
        let (tx, rx) = broadcast::channel(4);
        let mut feed = FrameFeed::new(rx);

        for _ in 0..10 {
            tx.send(PipelineEvent::HistoryCleared).unwrap();
        }

        let mut received = 0;
        while feed.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, 4);
        assert_eq!(feed.dropped(), 6);

        drop(tx);
        assert!(feed.recv().await.is_none());
    }
}
