//! Ordered identifier filters
//!
//! The first enabled filter whose predicate matches a frame decides whether
//! the frame is shown. When nothing matches, the engine's default policy
//! applies (show, unless configured fail-closed).

use can_frame::{CanId, Frame, MAX_EXTENDED_ID};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::FilterConfigError;

/// Identifier predicate of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterKind {
    /// Exactly one identifier
    Single {
        /// Identifier to match
        id: u32,
    },
    /// Inclusive identifier range
    Range {
        /// Lowest matching identifier
        lo: u32,
        /// Highest matching identifier
        hi: u32,
    },
    /// Identifiers equal to `base` on every bit set in `mask`
    Mask {
        /// Reference identifier
        base: u32,
        /// Bits that must match
        mask: u32,
    },
}

impl FilterKind {
    /// Check the predicate parameters
    pub fn validate(&self) -> Result<(), FilterConfigError> {
        match *self {
            FilterKind::Single { id } => {
                if id > MAX_EXTENDED_ID {
                    return Err(FilterConfigError::IdOutOfRange(id));
                }
            }
            FilterKind::Range { lo, hi } => {
                if hi > MAX_EXTENDED_ID {
                    return Err(FilterConfigError::IdOutOfRange(hi));
                }
                if lo > hi {
                    return Err(FilterConfigError::InvertedRange { lo, hi });
                }
            }
            FilterKind::Mask { base, mask } => {
                if mask == 0 || mask > MAX_EXTENDED_ID || base > MAX_EXTENDED_ID {
                    return Err(FilterConfigError::InvalidMask { base, mask });
                }
            }
        }
        Ok(())
    }

    /// Evaluate the predicate against a raw identifier
    pub fn matches(&self, id: u32) -> bool {
        match *self {
            FilterKind::Single { id: target } => id == target,
            FilterKind::Range { lo, hi } => lo <= id && id <= hi,
            FilterKind::Mask { base, mask } => (id & mask) == (base & mask),
        }
    }

    /// Human-readable parameters
    pub fn describe(&self) -> String {
        match *self {
            FilterKind::Single { id } => format!("ID: 0x{:X}", id),
            FilterKind::Range { lo, hi } => format!("0x{:X} - 0x{:X}", lo, hi),
            FilterKind::Mask { base, mask } => format!("Base: 0x{:X}, Mask: 0x{:X}", base, mask),
        }
    }
}

/// What happens to a frame that matches a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterPolicy {
    /// Show the frame
    #[default]
    Accept,
    /// Hide the frame
    Reject,
}

impl FilterPolicy {
    fn admits(&self) -> bool {
        matches!(self, FilterPolicy::Accept)
    }
}

/// A named, validated filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filter {
    name: String,
    kind: FilterKind,
    policy: FilterPolicy,
    enabled: bool,
}

impl Filter {
    /// Create an enabled filter
    pub fn new(
        name: impl Into<String>,
        kind: FilterKind,
        policy: FilterPolicy,
    ) -> Result<Self, FilterConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FilterConfigError::EmptyName);
        }
        kind.validate()?;
        Ok(Self {
            name,
            kind,
            policy,
            enabled: true,
        })
    }

    /// Accept filter for a single identifier
    pub fn accept_single(name: impl Into<String>, id: u32) -> Result<Self, FilterConfigError> {
        Self::new(name, FilterKind::Single { id }, FilterPolicy::Accept)
    }

    /// Reject filter for an identifier range
    pub fn reject_range(
        name: impl Into<String>,
        lo: u32,
        hi: u32,
    ) -> Result<Self, FilterConfigError> {
        Self::new(name, FilterKind::Range { lo, hi }, FilterPolicy::Reject)
    }

    /// Return the same filter with the given enabled state
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Filter name (unique within an engine)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Predicate
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Policy on match
    pub fn policy(&self) -> FilterPolicy {
        self.policy
    }

    /// Whether the filter takes part in evaluation
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether this filter is enabled and its predicate matches `id`
    pub fn applies_to(&self, id: CanId) -> bool {
        self.enabled && self.kind.matches(id.raw())
    }
}

/// Ordered filter list with first-match-wins evaluation
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    filters: Vec<Filter>,
    default_policy: FilterPolicy,
}

impl FilterEngine {
    /// Create an empty, fail-open engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty engine with the given no-match policy
    pub fn with_default_policy(default_policy: FilterPolicy) -> Self {
        Self {
            filters: Vec::new(),
            default_policy,
        }
    }

    /// Policy applied when no enabled filter matches
    pub fn default_policy(&self) -> FilterPolicy {
        self.default_policy
    }

    /// Change the no-match policy
    pub fn set_default_policy(&mut self, policy: FilterPolicy) {
        self.default_policy = policy;
    }

    /// Append a filter to the end of the list
    pub fn add(&mut self, filter: Filter) -> Result<(), FilterConfigError> {
        if self.filters.iter().any(|f| f.name == filter.name) {
            return Err(FilterConfigError::DuplicateName(filter.name));
        }
        info!(
            "Added filter {} ({:?} {})",
            filter.name,
            filter.policy,
            filter.kind.describe()
        );
        self.filters.push(filter);
        Ok(())
    }

    /// Remove a filter by name
    pub fn remove(&mut self, name: &str) -> Result<Filter, FilterConfigError> {
        let index = self.position(name)?;
        let removed = self.filters.remove(index);
        info!("Removed filter {}", name);
        Ok(removed)
    }

    /// Enable or disable a filter by name
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), FilterConfigError> {
        let index = self.position(name)?;
        self.filters[index].enabled = enabled;
        debug!("Filter {} enabled={}", name, enabled);
        Ok(())
    }

    /// Enable every filter
    pub fn enable_all(&mut self) {
        self.filters.iter_mut().for_each(|f| f.enabled = true);
    }

    /// Disable every filter
    pub fn disable_all(&mut self) {
        self.filters.iter_mut().for_each(|f| f.enabled = false);
    }

    /// Filters in evaluation order
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Number of filters
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// First enabled filter matching `id`, if any
    pub fn first_match(&self, id: CanId) -> Option<&Filter> {
        self.filters.iter().find(|f| f.applies_to(id))
    }

    /// Decide whether a frame is shown
    pub fn admit(&self, frame: &Frame) -> bool {
        self.first_match(frame.id())
            .map(|f| f.policy)
            .unwrap_or(self.default_policy)
            .admits()
    }

    fn position(&self, name: &str) -> Result<usize, FilterConfigError> {
        self.filters
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| FilterConfigError::NotFound(name.to_string()))
    }
}
