//! Pipeline configuration

use serde::{Deserialize, Serialize};

use crate::classifier::DEFAULT_STALE_THRESHOLD;
use crate::filter::FilterPolicy;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Identifiers classified as diagnostic traffic
    #[serde(default)]
    pub diagnostic_ids: Vec<u32>,
    /// Identical payloads in a row before a frame is stale
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: u32,
    /// Outcome for frames no enabled filter matches
    #[serde(default)]
    pub default_policy: FilterPolicy,
    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Capacity of the command channel
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// Receive loop poll timeout in milliseconds
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u32,
}

fn default_stale_threshold() -> u32 {
    DEFAULT_STALE_THRESHOLD
}

fn default_event_buffer() -> usize {
    1024
}

fn default_command_buffer() -> usize {
    256
}

fn default_receive_timeout_ms() -> u32 {
    100
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            diagnostic_ids: Vec::new(),
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            default_policy: FilterPolicy::Accept,
            event_buffer: default_event_buffer(),
            command_buffer: default_command_buffer(),
            receive_timeout_ms: default_receive_timeout_ms(),
        }
    }
}
