//! LLM reranking of retrieved candidates.
//!
//! The model sees every candidate once, numbered from 1, and answers with a
//! comma-separated ordering. Anything that is not a clean list of integers
//! leaves the retriever's order in place.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::retriever::RetrievalCandidate;
use crate::chunking::types::truncate_chars;
use crate::llm::{CompletionProvider, Credential, GenerationRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    /// Defaults to the first enrichment model.
    pub model: Option<String>,
    /// Characters of each candidate shown to the model.
    pub preview_chars: usize,
    pub max_tokens: u32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            preview_chars: 300,
            max_tokens: 50,
        }
    }
}

pub struct LlmReranker {
    provider: Arc<dyn CompletionProvider>,
    credential: Option<Credential>,
    model: String,
    config: RerankConfig,
}

impl LlmReranker {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        credential: Option<Credential>,
        model: impl Into<String>,
        config: RerankConfig,
    ) -> Self {
        Self {
            provider,
            credential,
            model: model.into(),
            config,
        }
    }

    /// Reorders `candidates` and keeps the first `top_k`. Fails soft: any
    /// provider or parse failure yields the first `top_k` in input order.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalCandidate>,
        top_k: usize,
    ) -> Vec<RetrievalCandidate> {
        if candidates.is_empty() || top_k == 0 {
            return Vec::new();
        }

        match self.ranking(query, &candidates).await {
            Some(order) => {
                let mut slots: Vec<Option<RetrievalCandidate>> =
                    candidates.into_iter().map(Some).collect();
                order
                    .into_iter()
                    .take(top_k)
                    .filter_map(|idx| slots[idx].take())
                    .collect()
            }
            None => candidates.into_iter().take(top_k).collect(),
        }
    }

    async fn ranking(&self, query: &str, candidates: &[RetrievalCandidate]) -> Option<Vec<usize>> {
        let Some(credential) = &self.credential else {
            tracing::warn!("Reranking skipped: no credential configured");
            return None;
        };

        let request = GenerationRequest::new(rerank_prompt(query, candidates, self.config.preview_chars))
            .with_temperature(0.0)
            .with_max_tokens(self.config.max_tokens);

        let response = match self.provider.generate(credential, &self.model, &request).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("Reranking failed, keeping retrieval order: {}", err);
                return None;
            }
        };

        let parsed = parse_ranking(&response, candidates.len());
        if parsed.is_none() {
            tracing::warn!("Unparseable ranking {:?}, keeping retrieval order", response);
        }
        parsed
    }
}

pub fn rerank_prompt(query: &str, candidates: &[RetrievalCandidate], preview_chars: usize) -> String {
    let mut prompt = format!(
        "Query: {}\n\nRank the following passages by relevance (1=most relevant). \
         Return only numbers separated by commas.\n\n",
        query
    );
    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {}...\n\n",
            i + 1,
            truncate_chars(candidate.display_text(), preview_chars)
        ));
    }
    prompt.push_str("Rankings (comma-separated):");
    prompt
}

/// 1-based comma-separated indices to distinct in-bounds 0-based indices,
/// first occurrence wins. `None` if any token is not an integer or nothing
/// usable remains.
pub fn parse_ranking(response: &str, len: usize) -> Option<Vec<usize>> {
    let mut order = Vec::new();
    for token in response.trim().split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }
        let rank: i64 = token.parse().ok()?;
        let Some(idx) = rank.checked_sub(1).and_then(|i| usize::try_from(i).ok()) else {
            continue;
        };
        if idx < len && !order.contains(&idx) {
            order.push(idx);
        }
    }
    (!order.is_empty()).then_some(order)
}
