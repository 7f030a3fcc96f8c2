//! HybridStore trait: the storage collaborator behind retrieval.
//!
//! A store indexes enriched chunks and answers one combined
//! vector + lexical query. How either half is computed is the store's
//! business; the retriever only shapes the request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chunking::EnrichedSegment;
use crate::core::errors::RagError;

/// One chunk to index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexItem {
    pub chunk_id: String,
    pub chunk_index: usize,
    /// Original segment text.
    pub content: String,
    /// Text with the context tag, or the original when unenriched.
    pub contextualized_content: String,
    pub metadata: Map<String, Value>,
}

impl From<&EnrichedSegment> for IndexItem {
    fn from(enriched: &EnrichedSegment) -> Self {
        let mut metadata = enriched.segment.metadata.clone();
        metadata.insert("enriched".to_string(), Value::from(enriched.is_enriched()));
        Self {
            chunk_id: enriched.segment.chunk_id(),
            chunk_index: enriched.segment.index,
            content: enriched.segment.text.clone(),
            contextualized_content: enriched.text(),
            metadata,
        }
    }
}

/// A ranked result of `hybrid_search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub contextualized_content: Option<String>,
    /// Fused relevance; higher is better.
    pub score: f32,
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait HybridStore: Send + Sync {
    /// Replaces every chunk of `document_id` with `items`. Returns the
    /// number stored.
    async fn index(&self, document_id: &str, items: Vec<IndexItem>) -> Result<usize, RagError>;

    /// At most `limit` hits, best first.
    async fn hybrid_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, RagError>;

    /// Chunk count, optionally for one document.
    async fn count(&self, document_id: Option<&str>) -> Result<usize, RagError>;

    async fn delete_document(&self, document_id: &str) -> Result<usize, RagError>;
}
