//! Console settings
//!
//! Stored as pretty JSON in `$XDG_CONFIG_HOME/canscope/settings.json`
//! (falling back to `~/.config/canscope`). A missing or unreadable file
//! yields the defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use can_frame::BusConfig;
use can_pipeline::{Filter, FilterConfigError, FilterKind, FilterPolicy, JobConfig, PipelineConfig};
use can_sim::{SimNodeConfig, VirtualBusConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Settings persistence failures
#[derive(Debug, Error)]
pub enum SettingsError {
    /// No home or config directory could be determined
    #[error("could not determine settings path")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings could not be serialized
    #[error("settings serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Saved filter definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterSettings {
    /// Unique filter name
    pub name: String,
    /// Predicate
    pub kind: FilterKind,
    /// Outcome on match
    #[serde(default)]
    pub policy: FilterPolicy,
    /// Whether the filter starts enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl FilterSettings {
    /// Validate into a pipeline filter
    pub fn to_filter(&self) -> Result<Filter, FilterConfigError> {
        Ok(Filter::new(self.name.clone(), self.kind, self.policy)?.with_enabled(self.enabled))
    }
}

fn default_true() -> bool {
    true
}

fn default_channel() -> u8 {
    1
}

fn default_history_size() -> usize {
    1000
}

/// OBD-II functional request plus the physical ECU request/response range
fn default_pipeline() -> PipelineConfig {
    PipelineConfig {
        diagnostic_ids: std::iter::once(0x7DF).chain(0x7E0..=0x7EF).collect(),
        ..PipelineConfig::default()
    }
}

fn default_simulation() -> VirtualBusConfig {
    VirtualBusConfig {
        loopback: false,
        nodes: SimNodeConfig::demo_nodes(),
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Driver channel (1..=4)
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Bus timing
    #[serde(default)]
    pub bus: BusConfig,
    /// Pipeline tuning
    #[serde(default = "default_pipeline")]
    pub pipeline: PipelineConfig,
    /// Traffic log size
    #[serde(default = "default_history_size")]
    pub traffic_history_size: usize,
    /// Filters restored on startup, in evaluation order
    #[serde(default)]
    pub filters: Vec<FilterSettings>,
    /// Periodic jobs restored on startup
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
    /// Comments by identifier
    #[serde(default)]
    pub comments: BTreeMap<u32, String>,
    /// Simulated bus
    #[serde(default = "default_simulation")]
    pub simulation: VirtualBusConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            bus: BusConfig::default(),
            pipeline: default_pipeline(),
            traffic_history_size: default_history_size(),
            filters: Vec::new(),
            jobs: Vec::new(),
            comments: BTreeMap::new(),
            simulation: default_simulation(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for canscope
    /// Uses $XDG_CONFIG_HOME/canscope when set, falls back to ~/.config/canscope
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("canscope"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("canscope"))
    }

    /// Default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load from the default location
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&text) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring invalid settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save to the default location
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
