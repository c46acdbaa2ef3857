//! Simulated bus participants
//!
//! A node broadcasts one frame on a fixed period, optionally bumping a
//! counter byte so the payload changes between sightings.

use std::time::{Duration, Instant};

use can_frame::{CanId, Direction, Frame, FrameFlags, FrameTemplate, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected simulated node definitions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimConfigError {
    /// Nodes need a positive period
    #[error("simulated node '{0}' has a zero period")]
    ZeroPeriod(String),
}

/// How a node's payload evolves between emissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadPattern {
    /// Same payload every time
    #[default]
    Fixed,
    /// Increment the byte at `index` (wrapping) on every emission
    Counter {
        /// Byte position in the payload
        index: usize,
    },
}

/// Definition of a simulated node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimNodeConfig {
    /// Display name
    pub name: String,
    /// Frame broadcast by the node
    pub template: FrameTemplate,
    /// Time between frames in milliseconds
    pub period_ms: u32,
    /// Payload evolution
    #[serde(default)]
    pub pattern: PayloadPattern,
}

impl SimNodeConfig {
    /// Check the period
    pub fn validate(&self) -> Result<(), SimConfigError> {
        if self.period_ms == 0 {
            return Err(SimConfigError::ZeroPeriod(self.name.clone()));
        }
        Ok(())
    }

    /// A small mixed bus: a changing engine frame, a constant body frame that
    /// goes stale, and a diagnostic response
    pub fn demo_nodes() -> Vec<SimNodeConfig> {
        let mut nodes = Vec::new();
        let specs: [(&str, u32, &[u8], u32, PayloadPattern); 3] = [
            (
                "engine",
                0x0C0,
                &[0x00, 0x10, 0x27, 0x00],
                100,
                PayloadPattern::Counter { index: 0 },
            ),
            ("body", 0x3E0, &[0x01, 0x00, 0x00, 0x80], 250, PayloadPattern::Fixed),
            (
                "ecu-diag",
                0x7E8,
                &[0x03, 0x41, 0x0D, 0x32],
                1000,
                PayloadPattern::Fixed,
            ),
        ];

        for (name, id, data, period_ms, pattern) in specs {
            let template = CanId::standard(id)
                .and_then(|id| FrameTemplate::new(id, data.to_vec(), FrameFlags::CLASSIC));
            if let Ok(template) = template {
                nodes.push(SimNodeConfig {
                    name: name.to_string(),
                    template,
                    period_ms,
                    pattern,
                });
            }
        }
        nodes
    }
}

/// Running node with its own schedule
#[derive(Debug, Clone)]
pub struct SimNode {
    config: SimNodeConfig,
    current: FrameTemplate,
    next_due: Instant,
    emitted: u64,
}

impl SimNode {
    /// Start a node; its first frame is due one period after `now`
    pub fn new(config: SimNodeConfig, now: Instant) -> Self {
        let current = config.template.clone();
        let next_due = now + Duration::from_millis(config.period_ms as u64);
        Self {
            config,
            current,
            next_due,
            emitted: 0,
        }
    }

    /// Node definition
    pub fn config(&self) -> &SimNodeConfig {
        &self.config
    }

    /// When the next frame is due
    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Frames emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Whether a frame is due at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due <= now
    }

    /// Produce the next frame and schedule the one after
    pub fn emit(&mut self, timestamp: Timestamp) -> Frame {
        let frame = self.current.to_frame(Direction::Rx, timestamp);

        if let PayloadPattern::Counter { index } = self.config.pattern {
            let mut payload = self.current.data().to_vec();
            if let Some(byte) = payload.get_mut(index) {
                *byte = byte.wrapping_add(1);
                // Same length as before, so this cannot fail
                if let Ok(next) =
                    FrameTemplate::new(self.current.id(), payload, self.current.flags())
                {
                    self.current = next;
                }
            }
        }

        self.emitted += 1;
        self.next_due += Duration::from_millis(self.config.period_ms as u64);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(pattern: PayloadPattern) -> SimNodeConfig {
        SimNodeConfig {
            name: "test".into(),
            template: FrameTemplate::new(
                CanId::standard(0x123).unwrap(),
                vec![0xFF, 0x00],
                FrameFlags::CLASSIC,
            )
            .unwrap(),
            period_ms: 50,
            pattern,
        }
    }

    #[test]
    fn test_counter_pattern_wraps() {
        let start = Instant::now();
        let mut sim = SimNode::new(node(PayloadPattern::Counter { index: 0 }), start);

        assert!(!sim.is_due(start));
        assert!(sim.is_due(start + Duration::from_millis(50)));

        let first = sim.emit(Timestamp::from_micros(1));
        let second = sim.emit(Timestamp::from_micros(2));
        assert_eq!(first.data(), &[0xFF, 0x00]);
        assert_eq!(second.data(), &[0x00, 0x00]);
        assert_eq!(second.direction(), Direction::Rx);
        assert_eq!(sim.emitted(), 2);
        assert_eq!(sim.next_due(), start + Duration::from_millis(150));
    }

    #[test]
    fn test_fixed_pattern_repeats() {
        let mut sim = SimNode::new(node(PayloadPattern::Fixed), Instant::now());
        let a = sim.emit(Timestamp::default());
        let b = sim.emit(Timestamp::default());
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_counter_index_past_payload_is_ignored() {
        let mut sim = SimNode::new(node(PayloadPattern::Counter { index: 9 }), Instant::now());
        sim.emit(Timestamp::default());
        assert_eq!(sim.emit(Timestamp::default()).data(), &[0xFF, 0x00]);
    }

    #[test]
    fn test_zero_period_rejected() {
        let mut config = node(PayloadPattern::Fixed);
        config.period_ms = 0;
        assert_eq!(
            config.validate(),
            Err(SimConfigError::ZeroPeriod("test".into()))
        );
        assert_eq!(SimNodeConfig::demo_nodes().len(), 3);
    }

    #[test]
    fn test_node_config_json() {
        let json = r#"{
            "name": "gear",
            "template": {"id": 256, "data": [1, 2], "fd": false, "brs": false},
            "period_ms": 20,
            "pattern": {"type": "counter", "index": 1}
        }"#;
        let config: SimNodeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pattern, PayloadPattern::Counter { index: 1 });
        assert_eq!(config.template.id().raw(), 0x100);
    }
}
