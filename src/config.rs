//! Engine configuration.
//!
//! # Example
//! ```ignore
//! use propgraph::{GraphConfig, VisibilityMode};
//!
//! let config = GraphConfig::default()
//!     .thread_num(8)
//!     .visibility(VisibilityMode::from_str("sync"));
//! ```

use std::time::Duration;

/// When a released insert timestamp becomes visible to readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisibilityMode {
    /// A background thread folds released timestamps into the read timestamp.
    #[default]
    Background,
    /// The releasing call advances the read timestamp itself and returns
    /// only once its own write is visible.
    WaitVisible,
}

impl VisibilityMode {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sync" | "wait" | "wait_visible" | "waitvisible" => VisibilityMode::WaitVisible,
            "async" | "background" => VisibilityMode::Background,
            _ => VisibilityMode::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Worker threads for bulk load
    pub thread_num: usize,
    pub visibility: VisibilityMode,
    /// In-flight timestamp slots in the version ring. Rounded up to a power of two.
    pub ring_size: usize,
    /// Sleep between background advancement passes, and between retries in
    /// every spin-wait.
    pub advance_interval: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            thread_num: 1,
            visibility: VisibilityMode::default(),
            ring_size: 1 << 16,
            advance_interval: Duration::from_micros(100),
        }
    }
}

impl GraphConfig {
    pub fn new(visibility: VisibilityMode) -> Self {
        Self { visibility, ..Default::default() }
    }

    pub fn thread_num(mut self, n: usize) -> Self {
        self.thread_num = n.max(1);
        self
    }

    pub fn visibility(mut self, mode: VisibilityMode) -> Self {
        self.visibility = mode;
        self
    }

    pub fn ring_size(mut self, slots: usize) -> Self {
        self.ring_size = slots;
        self
    }

    pub fn advance_interval(mut self, interval: Duration) -> Self {
        self.advance_interval = interval;
        self
    }

    /// Ring size actually used: a power of two, at least one 64-bit word.
    pub fn effective_ring_size(&self) -> usize {
        self.ring_size.max(64).next_power_of_two()
    }
}
