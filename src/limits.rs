//! Run limits and cancellation
//!
//! Configurable bounds on a single workflow run: how many nodes may execute
//! at once, how long one handler call may take, and how long the whole run
//! may last.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bounds applied to one run
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Maximum number of nodes executing concurrently
    pub max_parallelism: usize,

    /// Maximum duration of one handler invocation
    pub node_timeout: Duration,

    /// Maximum duration of the entire run
    pub max_run_duration: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_parallelism: 8,
            node_timeout: Duration::from_secs(60),
            max_run_duration: Duration::from_secs(600), // 10 minutes
        }
    }
}

impl RunLimits {
    /// Tight limits for tests
    pub fn testing() -> Self {
        Self {
            max_parallelism: 2,
            node_timeout: Duration::from_millis(500),
            max_run_duration: Duration::from_secs(5),
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a run.
///
/// Cancellation is checked before each node starts; nodes already running
/// finish naturally and keep their results.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let limits = RunLimits::default();
        assert!(limits.max_parallelism > 0);
        assert!(limits.node_timeout < limits.max_run_duration);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
