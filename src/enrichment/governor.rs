use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::llm::{Credential, ModelCandidate};

/// Local minimum-interval throttle per (credential, model) pair.
///
/// Purely time based. Provider rate-limit headers are never consulted;
/// quota responses are the failover policy's concern.
#[derive(Debug, Default)]
pub struct RateGovernor {
    last_call: HashMap<(Credential, String), Instant>,
    unthrottled: Option<Credential>,
}

impl RateGovernor {
    pub fn new(unthrottled: Option<Credential>) -> Self {
        Self {
            last_call: HashMap::new(),
            unthrottled,
        }
    }

    /// `60 / rpm` seconds, or `None` when the model is unthrottled.
    pub fn interval(model: &ModelCandidate) -> Option<Duration> {
        if model.rpm == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(60.0 / f64::from(model.rpm)))
    }

    pub fn is_exempt(&self, credential: &Credential) -> bool {
        self.unthrottled.as_ref() == Some(credential)
    }

    /// Sleeps until the pair may be called again, then records the call.
    /// Returns how long the caller was held.
    pub async fn wait_if_needed(&mut self, credential: &Credential, model: &ModelCandidate) -> Duration {
        if self.is_exempt(credential) {
            return Duration::ZERO;
        }
        let Some(interval) = Self::interval(model) else {
            return Duration::ZERO;
        };

        let key = (credential.clone(), model.id.clone());
        let mut waited = Duration::ZERO;
        if let Some(last) = self.last_call.get(&key) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                waited = interval - elapsed;
                tracing::debug!(
                    "Rate limiting {} on {}: sleeping {:.2}s",
                    credential,
                    model.id,
                    waited.as_secs_f64()
                );
                tokio::time::sleep(waited).await;
            }
        }
        self.last_call.insert(key, Instant::now());
        waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(label: &str) -> Credential {
        Credential::new(format!("secret-{}", label), label)
    }

    #[tokio::test(start_paused = true)]
    async fn spaces_calls_on_the_same_pair() {
        let mut governor = RateGovernor::new(None);
        let model = ModelCandidate::new("gemini-2.5-flash", 5);
        let a = key("a");

        let start = Instant::now();
        assert_eq!(governor.wait_if_needed(&a, &model).await, Duration::ZERO);
        governor.wait_if_needed(&a, &model).await;

        assert!(start.elapsed() >= Duration::from_secs(12));
        assert!(start.elapsed() < Duration::from_millis(12_100));
    }

    #[tokio::test(start_paused = true)]
    async fn only_waits_for_the_remainder_of_the_interval() {
        let mut governor = RateGovernor::new(None);
        let model = ModelCandidate::new("gemini-2.5-flash-lite", 10);
        let a = key("a");

        governor.wait_if_needed(&a, &model).await;
        tokio::time::sleep(Duration::from_secs(4)).await;
        let waited = governor.wait_if_needed(&a, &model).await;

        assert_eq!(waited, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn pairs_are_independent() {
        let mut governor = RateGovernor::new(None);
        let lite = ModelCandidate::new("lite", 5);
        let flash = ModelCandidate::new("flash", 5);
        let (a, b) = (key("a"), key("b"));

        let start = Instant::now();
        governor.wait_if_needed(&a, &lite).await;
        governor.wait_if_needed(&b, &lite).await;
        governor.wait_if_needed(&a, &flash).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unthrottled_credential_is_never_delayed() {
        let prod = key("prod");
        let mut governor = RateGovernor::new(Some(prod.clone()));
        let model = ModelCandidate::new("lite", 1);

        let start = Instant::now();
        for _ in 0..5 {
            assert_eq!(governor.wait_if_needed(&prod, &model).await, Duration::ZERO);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rpm_disables_throttling() {
        let mut governor = RateGovernor::new(None);
        let model = ModelCandidate::new("local", 0);
        let a = key("a");

        let start = Instant::now();
        governor.wait_if_needed(&a, &model).await;
        governor.wait_if_needed(&a, &model).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
