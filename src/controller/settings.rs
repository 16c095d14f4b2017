//! Controller tuning knobs.

use std::time::Duration;

/// Runtime parameters for a controller replica.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// How long an RPC handler waits for its operation's commit notification
    /// before replying not-leader (default: 500ms).
    pub wait_timeout: Duration,
    /// Capacity of the commit stream channel (default: 64).
    pub commit_capacity: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(500),
            commit_capacity: 64,
        }
    }
}

impl ControllerSettings {
    /// Create a new settings with a custom wait timeout
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Create a new settings with a custom commit channel capacity
    pub fn with_commit_capacity(mut self, capacity: usize) -> Self {
        self.commit_capacity = capacity;
        self
    }
}
