//! Ingest and query orchestration.
//!
//! Ingest: segment → enrich (first pass + reconciliation) → index.
//! Query: retrieve (over-fetch) → rerank → top-k.

use std::sync::Arc;

use serde::Serialize;

use super::reranker::LlmReranker;
use super::retriever::{HybridRetriever, RetrievalCandidate};
use super::store::{HybridStore, IndexItem};
use crate::chunking::{BoundarySegmenter, Document};
use crate::core::errors::RagError;
use crate::enrichment::ContextEnricher;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub segments: usize,
    pub enriched: usize,
    pub recovered: usize,
    pub unenriched: usize,
    pub stored: usize,
}

pub struct IngestPipeline {
    segmenter: BoundarySegmenter,
    enricher: ContextEnricher,
    store: Arc<dyn HybridStore>,
}

impl IngestPipeline {
    pub fn new(segmenter: BoundarySegmenter, enricher: ContextEnricher, store: Arc<dyn HybridStore>) -> Self {
        Self {
            segmenter,
            enricher,
            store,
        }
    }

    /// Only a storage failure is an error; enrichment degrades instead.
    pub async fn ingest(&mut self, document: &Document) -> Result<IngestReport, RagError> {
        let segments = self.segmenter.segment(document).await;
        let segment_count = segments.len();
        tracing::info!("Document {} split into {} segments", document.id, segment_count);

        let report = self.enricher.enrich_document(document, segments).await;
        let items: Vec<IndexItem> = report.segments.iter().map(IndexItem::from).collect();
        let stored = self.store.index(&document.id, items).await?;

        Ok(IngestReport {
            document_id: document.id.clone(),
            segments: segment_count,
            enriched: report.enriched,
            recovered: report.recovered,
            unenriched: report.unenriched,
            stored,
        })
    }
}

pub struct QueryPipeline {
    retriever: HybridRetriever,
    reranker: Option<LlmReranker>,
}

impl QueryPipeline {
    /// Without a reranker the retriever's order is truncated to `top_k`.
    pub fn new(retriever: HybridRetriever, reranker: Option<LlmReranker>) -> Self {
        Self { retriever, reranker }
    }

    /// Never fails: a retrieval error is logged and yields no passages.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<RetrievalCandidate> {
        let candidates = match self.retriever.retrieve(query, top_k).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::error!("Retrieval failed for query: {}", err);
                return Vec::new();
            }
        };

        match &self.reranker {
            Some(reranker) => reranker.rerank(query, candidates, top_k).await,
            None => candidates.into_iter().take(top_k).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::SegmenterConfig;
    use crate::core::errors::ProviderError;
    use crate::embedding::HashingEmbedder;
    use crate::enrichment::EnrichmentConfig;
    use crate::llm::tests::ScriptedProvider;
    use crate::llm::{Credential, ModelCandidate};
    use crate::rag::reranker::RerankConfig;
    use crate::rag::retriever::RetrievalConfig;
    use crate::rag::sqlite::SqliteHybridStore;
    use crate::rag::store::SearchHit;
    use async_trait::async_trait;

    const REPORT: &str = "Inflation rose to four percent in March. Inflation is expected to ease. \
                          The football club signed a new striker. The striker scored twice.";

    fn enrichment() -> EnrichmentConfig {
        EnrichmentConfig {
            max_retries: 1,
            retry_delay_secs: 0.0,
            models: vec![ModelCandidate::new("lite", 0)],
            ..Default::default()
        }
    }

    async fn sqlite(tmp: &tempfile::TempDir) -> Arc<SqliteHybridStore> {
        Arc::new(
            SqliteHybridStore::with_path(
                tmp.path().join("knowledge.db"),
                Arc::new(HashingEmbedder::new(256)),
                0.5,
            )
            .await
            .unwrap(),
        )
    }

    fn ingest_pipeline(provider: Arc<ScriptedProvider>, store: Arc<dyn HybridStore>) -> IngestPipeline {
        let segmenter = BoundarySegmenter::new(
            SegmenterConfig {
                max_segment_chars: 80,
                ..Default::default()
            },
            Arc::new(HashingEmbedder::new(64)),
        );
        let enricher = ContextEnricher::new(
            provider,
            enrichment(),
            Credential::from_keys(["secret"]),
            None,
        );
        IngestPipeline::new(segmenter, enricher, store)
    }

    #[tokio::test]
    async fn ingest_then_search_returns_enriched_passages() {
        let tmp = tempfile::tempdir().unwrap();
        let store = sqlite(&tmp).await;
        let provider = Arc::new(ScriptedProvider::always("From a March economic bulletin."));
        let mut ingest = ingest_pipeline(provider.clone(), store.clone());

        let report = ingest.ingest(&Document::new("bulletin", REPORT)).await.unwrap();

        assert!(report.segments >= 2);
        assert_eq!(report.stored, report.segments);
        assert_eq!(report.enriched, report.segments);
        assert_eq!(store.count(Some("bulletin")).await.unwrap(), report.segments);

        let query = QueryPipeline::new(HybridRetriever::new(store, RetrievalConfig::default()), None);
        let results = query.search("inflation", 1).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("Inflation"));
        assert!(results[0]
            .display_text()
            .starts_with("[CONTEXT: From a March economic bulletin.]\n\n"));
    }

    #[tokio::test]
    async fn enrichment_collapse_still_indexes_every_segment() {
        let tmp = tempfile::tempdir().unwrap();
        let store = sqlite(&tmp).await;
        let provider = Arc::new(ScriptedProvider::new(|_, _, _| {
            Err(ProviderError::QuotaExceeded("429".to_string()))
        }));
        let mut ingest = ingest_pipeline(provider, store.clone());

        let report = ingest.ingest(&Document::new("bulletin", REPORT)).await.unwrap();

        assert_eq!(report.enriched, 0);
        assert_eq!(report.unenriched, report.segments);
        assert_eq!(store.count(None).await.unwrap(), report.segments);
    }

    struct BrokenStore;

    #[async_trait]
    impl HybridStore for BrokenStore {
        async fn index(&self, _document_id: &str, _items: Vec<IndexItem>) -> Result<usize, RagError> {
            Err(RagError::Storage("disk full".to_string()))
        }

        async fn hybrid_search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, RagError> {
            Err(RagError::Storage("disk full".to_string()))
        }

        async fn count(&self, _document_id: Option<&str>) -> Result<usize, RagError> {
            Ok(0)
        }

        async fn delete_document(&self, _document_id: &str) -> Result<usize, RagError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn storage_failure_is_the_only_ingest_error() {
        let provider = Arc::new(ScriptedProvider::always("note"));
        let mut ingest = ingest_pipeline(provider, Arc::new(BrokenStore));

        let err = ingest.ingest(&Document::new("d", REPORT)).await.unwrap_err();
        assert!(matches!(err, RagError::Storage(_)));
    }

    #[tokio::test]
    async fn query_failure_yields_no_passages() {
        let reranker_provider = Arc::new(ScriptedProvider::always("1"));
        let reranker = LlmReranker::new(
            reranker_provider.clone(),
            Some(Credential::new("secret", "key#1")),
            "lite",
            RerankConfig::default(),
        );
        let query = QueryPipeline::new(
            HybridRetriever::new(Arc::new(BrokenStore), RetrievalConfig::default()),
            Some(reranker),
        );

        assert!(query.search("anything", 3).await.is_empty());
        assert_eq!(reranker_provider.call_count(), 0);
    }

    #[tokio::test]
    async fn reranker_reorders_retrieved_passages() {
        let tmp = tempfile::tempdir().unwrap();
        let store = sqlite(&tmp).await;
        store
            .index(
                "d",
                vec![
                    IndexItem {
                        chunk_id: "a".to_string(),
                        chunk_index: 0,
                        content: "rates rates rates".to_string(),
                        contextualized_content: "rates rates rates".to_string(),
                        metadata: Default::default(),
                    },
                    IndexItem {
                        chunk_id: "b".to_string(),
                        chunk_index: 1,
                        content: "rates and football".to_string(),
                        contextualized_content: "rates and football".to_string(),
                        metadata: Default::default(),
                    },
                ],
            )
            .await
            .unwrap();

        let reranker = LlmReranker::new(
            Arc::new(ScriptedProvider::always("2,1")),
            Some(Credential::new("secret", "key#1")),
            "lite",
            RerankConfig::default(),
        );
        let query = QueryPipeline::new(
            HybridRetriever::new(store, RetrievalConfig::default()),
            Some(reranker),
        );

        let ids: Vec<String> = query.search("rates", 2).await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
