use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::failover::{FailoverPolicy, Route, Transition};
use super::governor::RateGovernor;
use super::prompt::context_prompt;
use super::reconcile;
use super::retry::RetryPolicy;
use crate::chunking::{Document, EnrichedSegment, Segment};
use crate::core::errors::ProviderError;
use crate::llm::{CompletionProvider, Credential, GenerationRequest, ModelCandidate};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    /// Reconciliation budget is `reconcile_multiplier * max_retries`.
    pub reconcile_multiplier: u32,
    pub jitter: f64,
    /// Characters of the document shown to the model.
    pub preview_chars: usize,
    /// Characters of the chunk shown to the model.
    pub chunk_prompt_chars: usize,
    /// In escalation order.
    pub models: Vec<ModelCandidate>,
    /// Model for the unthrottled credential; defaults to the first candidate.
    pub unthrottled_model: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_secs: 2.0,
            reconcile_multiplier: 2,
            jitter: 0.0,
            preview_chars: 5000,
            chunk_prompt_chars: 500,
            models: vec![
                ModelCandidate::new("gemini-2.5-flash-lite", 10),
                ModelCandidate::new("gemini-2.5-flash", 5),
            ],
            unthrottled_model: None,
        }
    }
}

impl EnrichmentConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs.max(0.0))
    }

    pub fn first_pass(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries.max(1), self.retry_delay()).with_jitter(self.jitter)
    }

    /// Exhaustion is not terminal here: quota windows reset while we back off.
    pub fn reconcile_pass(&self) -> RetryPolicy {
        let max_retries = self.max_retries.max(1);
        RetryPolicy::new(max_retries.saturating_mul(self.reconcile_multiplier), self.retry_delay())
            .with_stop_on_exhaustion(false)
            .with_backoff_cycle(max_retries)
            .with_jitter(self.jitter)
    }
}

/// Outcome of enriching one document.
#[derive(Debug, Clone)]
pub struct EnrichmentReport {
    /// One entry per input segment, in input order.
    pub segments: Vec<EnrichedSegment>,
    pub enriched: usize,
    /// Enriched only by the reconciliation pass.
    pub recovered: usize,
    pub unenriched: usize,
}

/// Why one attempt produced no note.
#[derive(Debug)]
enum AttemptError {
    Exhausted(Option<ProviderError>),
    Failed(ProviderError),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Exhausted(Some(err)) => write!(f, "routes exhausted, last error: {}", err),
            AttemptError::Exhausted(None) => f.write_str("routes exhausted"),
            AttemptError::Failed(err) => write!(f, "{}", err),
        }
    }
}

/// Generates situating notes for segments, routing every call through one
/// failover policy and one rate governor.
///
/// Both are plain owned state, mutated through `&mut self`, so one enricher
/// serves one document stream at a time.
pub struct ContextEnricher {
    provider: Arc<dyn CompletionProvider>,
    config: EnrichmentConfig,
    policy: FailoverPolicy,
    governor: RateGovernor,
}

impl ContextEnricher {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        config: EnrichmentConfig,
        credentials: Vec<Credential>,
        unthrottled: Option<Credential>,
    ) -> Self {
        let unthrottled_model = config
            .unthrottled_model
            .as_ref()
            .map(|id| ModelCandidate::new(id.clone(), 0));
        let policy = FailoverPolicy::new(
            credentials,
            config.models.clone(),
            unthrottled.clone(),
            unthrottled_model,
        );
        Self {
            provider,
            config,
            policy,
            governor: RateGovernor::new(unthrottled),
        }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    pub fn policy(&self) -> &FailoverPolicy {
        &self.policy
    }

    /// Enriches one segment with the first-pass budget. Never fails: a
    /// segment that cannot be enriched comes back with its text unchanged.
    pub async fn enrich(&mut self, segment: &Segment, document_preview: &str) -> EnrichedSegment {
        let retry = self.config.first_pass();
        self.enrich_with(segment, document_preview, &retry).await
    }

    /// First pass over every segment, then reconciliation of the failures.
    pub async fn enrich_document(&mut self, document: &Document, segments: Vec<Segment>) -> EnrichmentReport {
        let preview = document.preview(self.config.preview_chars).to_string();
        let first_pass = self.config.first_pass();

        let mut results = Vec::with_capacity(segments.len());
        for segment in &segments {
            results.push(self.enrich_with(segment, &preview, &first_pass).await);
        }

        let pending = reconcile::pending_positions(&results);
        let patches = if pending.is_empty() {
            Default::default()
        } else {
            tracing::info!(
                "Reconciling {} of {} segments for document {}",
                pending.len(),
                results.len(),
                document.id
            );
            self.reconcile(&results, &pending, &preview).await
        };
        let recovered = patches.values().filter(|s| s.is_enriched()).count();
        let segments = reconcile::merge(results, patches);

        let enriched = segments.iter().filter(|s| s.is_enriched()).count();
        let unenriched = segments.len() - enriched;
        tracing::info!(
            "Enriched {}/{} segments for document {} ({} recovered)",
            enriched,
            segments.len(),
            document.id,
            recovered
        );
        EnrichmentReport {
            segments,
            enriched,
            recovered,
            unenriched,
        }
    }

    pub(super) async fn enrich_with(
        &mut self,
        segment: &Segment,
        document_preview: &str,
        retry: &RetryPolicy,
    ) -> EnrichedSegment {
        let request = GenerationRequest::new(context_prompt(
            document_preview,
            &segment.text,
            self.config.chunk_prompt_chars,
        ));

        for attempt in 0..retry.max_attempts {
            if self.policy.is_exhausted() {
                tracing::warn!(
                    "No usable credential left; segment {} stays unenriched",
                    segment.index
                );
                break;
            }

            match self.attempt(&request).await {
                Ok(note) => return EnrichedSegment::with_context(segment.clone(), &note),
                Err(err @ AttemptError::Exhausted(_)) if retry.stop_on_exhaustion => {
                    tracing::warn!("Stopping enrichment of segment {}: {}", segment.index, err);
                    break;
                }
                Err(err) => {
                    if !retry.has_next(attempt) {
                        tracing::warn!(
                            "Giving up on segment {} after {} attempts: {}",
                            segment.index,
                            retry.max_attempts,
                            err
                        );
                        break;
                    }
                    let delay = retry.delay_for(attempt);
                    tracing::warn!(
                        "Enrichment attempt {}/{} failed for segment {}: {}. Retrying in {:.1}s",
                        attempt + 1,
                        retry.max_attempts,
                        segment.index,
                        err,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        EnrichedSegment::unenriched(segment.clone())
    }

    /// One walk over the failover routes.
    async fn attempt(&mut self, request: &GenerationRequest) -> Result<String, AttemptError> {
        self.policy.begin_attempt();
        let mut last_error = None;

        loop {
            let Some(route) = self.policy.current() else {
                return Err(AttemptError::Exhausted(last_error));
            };

            match self.call(&route, request).await {
                Ok(note) => {
                    self.policy.on_success();
                    return Ok(note);
                }
                Err(err) => match self.policy.on_failure(err.kind()) {
                    Transition::Retry => {
                        tracing::debug!(
                            "{} on {}/{}; failing over to {:?}",
                            err,
                            route.credential,
                            route.model.id,
                            self.policy.indices()
                        );
                        last_error = Some(err);
                    }
                    Transition::Exhausted => return Err(AttemptError::Exhausted(Some(err))),
                    Transition::Propagate => return Err(AttemptError::Failed(err)),
                },
            }
        }
    }

    async fn call(&mut self, route: &Route, request: &GenerationRequest) -> Result<String, ProviderError> {
        self.governor.wait_if_needed(&route.credential, &route.model).await;
        let text = self
            .provider
            .generate(&route.credential, &route.model.id, request)
            .await?;
        let note = text.trim();
        if note.is_empty() {
            return Err(ProviderError::malformed("empty context note"));
        }
        Ok(note.to_string())
    }
}
