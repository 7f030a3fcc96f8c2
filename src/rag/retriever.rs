use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::store::{HybridStore, SearchHit};
use crate::core::errors::RagError;

pub const MIN_OVER_FETCH: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates requested per final result. Values below 2 act as 2.
    pub over_fetch: usize,
    pub top_k: usize,
    /// Share of the vector score in the fused score; the rest is lexical.
    pub vector_weight: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            over_fetch: 2,
            top_k: 5,
            vector_weight: 0.5,
        }
    }
}

impl RetrievalConfig {
    /// Always more than `top_k`: the multiplier is at least 2.
    pub fn fetch_limit(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.over_fetch.max(MIN_OVER_FETCH))
    }
}

/// A retrieved passage handed to the reranker and to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub id: String,
    pub content: String,
    pub enriched_content: Option<String>,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

impl RetrievalCandidate {
    /// The enriched text when present.
    pub fn display_text(&self) -> &str {
        self.enriched_content.as_deref().unwrap_or(&self.content)
    }
}

impl From<SearchHit> for RetrievalCandidate {
    fn from(hit: SearchHit) -> Self {
        let mut metadata = hit.metadata;
        metadata
            .entry("document_id".to_string())
            .or_insert_with(|| Value::from(hit.document_id));
        Self {
            id: hit.chunk_id,
            content: hit.content,
            enriched_content: hit.contextualized_content,
            score: hit.score,
            metadata,
        }
    }
}

/// Over-fetching front end for a `HybridStore`. Ranking is left to the
/// store and the reranker.
pub struct HybridRetriever {
    store: Arc<dyn HybridStore>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(store: Arc<dyn HybridStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Up to `top_k * over_fetch` candidates in store order.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalCandidate>, RagError> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let limit = self.config.fetch_limit(top_k);
        let mut hits = self.store.hybrid_search(query, limit).await?;
        hits.truncate(limit);
        tracing::debug!(
            "Retrieved {} candidates (requested {}) for top_k={}",
            hits.len(),
            limit,
            top_k
        );
        Ok(hits.into_iter().map(RetrievalCandidate::from).collect())
    }
}
