use std::sync::Arc;

use crate::chunking::BoundarySegmenter;
use crate::core::config::{AppPaths, ConfigService, PipelineSettings};
use crate::embedding::{build_embedder, Embedder};
use crate::enrichment::ContextEnricher;
use crate::llm::{build_provider, CompletionProvider};
use crate::rag::{
    HybridRetriever, HybridStore, IngestPipeline, LlmReranker, QueryPipeline, SqliteHybridStore,
};

pub mod error;

use error::InitializationError;

/// Everything the ingest and query paths share: configuration, the
/// completion provider, the embedder and the knowledge store.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: PipelineSettings,
    pub provider: Arc<dyn CompletionProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn HybridStore>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// 1. Load and validate configuration (file, secrets, environment)
    /// 2. Build the completion provider and the embedder
    /// 3. Open the SQLite knowledge store
    pub async fn initialize(config: ConfigService) -> Result<Self, InitializationError> {
        let paths = Arc::new(config.paths().clone());
        let settings = config.load_settings().map_err(InitializationError::Config)?;

        let provider = build_provider(&settings.provider);
        let embedder = build_embedder(
            &settings.embedding,
            &settings.provider,
            settings.credentials.primary(),
        )
        .map_err(InitializationError::Embedder)?;

        let store = Arc::new(
            SqliteHybridStore::new(paths.as_ref(), embedder.clone(), settings.retrieval.vector_weight)
                .await
                .map_err(InitializationError::Store)?,
        );

        if settings.credentials.credentials().is_empty() && settings.credentials.unthrottled().is_none() {
            tracing::warn!("No API keys configured; segments will be stored unenriched");
        }

        Ok(Self {
            paths,
            config,
            settings,
            provider,
            embedder,
            store,
        })
    }

    /// A fresh enricher state (indices, timestamps) per pipeline.
    pub fn ingest_pipeline(&self) -> IngestPipeline {
        let segmenter = BoundarySegmenter::new(self.settings.chunking.clone(), self.embedder.clone());
        let enricher = ContextEnricher::new(
            self.provider.clone(),
            self.settings.enrichment.clone(),
            self.settings.credentials.credentials(),
            self.settings.credentials.unthrottled(),
        );
        IngestPipeline::new(segmenter, enricher, self.store.clone())
    }

    pub fn query_pipeline(&self) -> QueryPipeline {
        let retriever = HybridRetriever::new(self.store.clone(), self.settings.retrieval.clone());
        let reranker = self.settings.rerank.enabled.then(|| {
            let model = self
                .settings
                .rerank
                .model
                .clone()
                .or_else(|| self.settings.enrichment.models.first().map(|m| m.id.clone()))
                .unwrap_or_default();
            LlmReranker::new(
                self.provider.clone(),
                self.settings.credentials.primary(),
                model,
                self.settings.rerank.clone(),
            )
        });
        QueryPipeline::new(retriever, reranker)
    }
}
