use std::time::Duration;

use rand::Rng;

/// Attempt budget and backoff schedule shared by the first pass and the
/// reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Give up as soon as the failover policy reports exhaustion.
    pub stop_on_exhaustion: bool,
    /// Backoff exponent is taken modulo this, if set.
    pub backoff_cycle: Option<u32>,
    /// Ratio in [0, 1]; each delay is scaled by a random factor in
    /// `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

const MAX_EXPONENT: u32 = 16;

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            stop_on_exhaustion: true,
            backoff_cycle: None,
            jitter: 0.0,
        }
    }

    pub fn with_stop_on_exhaustion(mut self, stop: bool) -> Self {
        self.stop_on_exhaustion = stop;
        self
    }

    pub fn with_backoff_cycle(mut self, cycle: u32) -> Self {
        self.backoff_cycle = (cycle > 0).then_some(cycle);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// `base_delay * 2^attempt` for the 0-based attempt that just failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = match self.backoff_cycle {
            Some(cycle) => attempt % cycle,
            None => attempt,
        }
        .min(MAX_EXPONENT);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);

        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        delay.mul_f64(factor)
    }

    /// Whether another attempt follows `attempt`.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }
}
