//! SupervisorConfig - runtime knobs that are not part of the process table.

use std::time::Duration;

pub const DEFAULT_INSTANCE: &str = "pc";

/// How long legacy retained stream topics stay subscribed after a connect.
pub const DEFAULT_CLEANUP_WINDOW: Duration = Duration::from_secs(20);

pub const DEFAULT_CHILD_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Topic prefix and MQTT client id.
    pub instance: String,
    pub cleanup_window: Duration,
    /// Bound of the channel carrying child output/exit events to the event loop.
    /// Full channel back-pressures the pipe readers.
    pub child_event_capacity: usize,
}

impl SupervisorConfig {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            ..Self::default()
        }
    }

    pub fn with_cleanup_window(mut self, window: Duration) -> Self {
        self.cleanup_window = window;
        self
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            instance: DEFAULT_INSTANCE.to_string(),
            cleanup_window: DEFAULT_CLEANUP_WINDOW,
            child_event_capacity: DEFAULT_CHILD_EVENT_CAPACITY,
        }
    }
}
