//! Hybrid retrieval.
//!
//! - `store`: `HybridStore` trait, the storage collaborator
//! - `sqlite`: SQLite implementation (FTS5 + brute-force cosine)
//! - `retriever`: over-fetching `HybridRetriever`
//! - `reranker`: `LlmReranker`
//! - `pipeline`: ingest and query orchestration

pub mod pipeline;
pub mod reranker;
pub mod retriever;
pub mod sqlite;
pub mod store;

pub use pipeline::{IngestPipeline, IngestReport, QueryPipeline};
pub use reranker::{LlmReranker, RerankConfig};
pub use retriever::{HybridRetriever, RetrievalCandidate, RetrievalConfig};
pub use sqlite::SqliteHybridStore;
pub use store::{HybridStore, IndexItem, SearchHit};
