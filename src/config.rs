use std::time::Duration;

use crate::model::DisplayOptions;

/// Reference cadence of the stats dump.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Anything faster mostly measures scheduling jitter.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runtime settings for one collector instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorConfig {
    pub poll_interval: Duration,
    /// Stop after this many poll cycles; `None` runs until interrupted.
    pub max_cycles: Option<u64>,
    pub display: DisplayOptions,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_cycles: None,
            display: DisplayOptions::default(),
        }
    }
}

impl CollectorConfig {
    /// Interval in milliseconds, raised to [`MIN_POLL_INTERVAL`] if lower.
    pub fn with_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval = Duration::from_millis(ms).max(MIN_POLL_INTERVAL);
        self
    }

    /// A count of 0 means unbounded.
    pub fn with_max_cycles(mut self, count: u64) -> Self {
        self.max_cycles = (count > 0).then_some(count);
        self
    }

    pub fn with_display(mut self, display: DisplayOptions) -> Self {
        self.display = display;
        self
    }
}
