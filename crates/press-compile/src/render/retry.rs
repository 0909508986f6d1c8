use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed-delay retry schedule for a single page render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total rasterizer invocations allowed for one page
    pub max_attempts: u32,
    /// Delay after the n-th failed attempt; the last entry repeats
    pub delays_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delays_ms: vec![1_000, 3_000, 10_000],
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, without backoff
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delays_ms: Vec::new(),
        }
    }

    /// Delay to wait after `attempt` (1-based) failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.delays_ms
            .get(index)
            .or_else(|| self.delays_ms.last())
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or(Duration::ZERO)
    }
}
