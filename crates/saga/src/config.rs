//! Saga configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the identifier pool and the print saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SagaConfig {
    /// Allocation attempts before giving up with `AllocationExhausted`.
    pub max_reserve_retries: u32,
    /// Backoff before the second attempt; doubles on each further attempt.
    pub retry_backoff_base_ms: u64,
    /// Upper bound for a single backoff sleep.
    pub retry_backoff_max_ms: u64,
    /// Minimum gap between two accepted batches from the same operator.
    pub cooldown_ms: u64,
    /// Largest pallet count accepted in one batch.
    pub max_batch_size: usize,
    /// Bounded fan-out width of the artifact stage.
    pub parallelism: usize,
    /// Extra attempts for a retryable artifact failure.
    pub artifact_retries: u32,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            max_reserve_retries: 5,
            retry_backoff_base_ms: 100,
            retry_backoff_max_ms: 2000,
            cooldown_ms: 3000,
            max_batch_size: 100,
            parallelism: 5,
            artifact_retries: 2,
        }
    }
}

impl SagaConfig {
    /// Sleep before retry number `attempt` (1-based: the delay after the
    /// first failed attempt is `backoff(1)`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let ms = self
            .retry_backoff_base_ms
            .saturating_mul(factor)
            .min(self.retry_backoff_max_ms);
        Duration::from_millis(ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Fan-out width, never below one.
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.max(1)
    }

    /// A configuration with no sleeps and no cooldown, for tests.
    pub fn immediate() -> Self {
        Self {
            retry_backoff_base_ms: 0,
            retry_backoff_max_ms: 0,
            cooldown_ms: 0,
            ..Self::default()
        }
    }
}
