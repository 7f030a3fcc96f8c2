//! SQLite-backed hybrid store.
//!
//! Chunks live in one table with their embedding as a little-endian `f32`
//! blob. An external-content FTS5 table over the contextualized text is kept
//! in sync by triggers. Search scores every chunk by brute-force cosine
//! similarity, scores FTS5 matches by `bm25`, and fuses the two.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{HybridStore, IndexItem, SearchHit};
use crate::core::config::AppPaths;
use crate::core::errors::RagError;
use crate::embedding::Embedder;
use crate::vector_math::cosine_similarity;

static FTS_TOKEN: OnceLock<Regex> = OnceLock::new();

pub struct SqliteHybridStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    vector_weight: f32,
    db_path: PathBuf,
}

impl SqliteHybridStore {
    pub async fn new(
        paths: &AppPaths,
        embedder: Arc<dyn Embedder>,
        vector_weight: f32,
    ) -> Result<Self, RagError> {
        Self::with_path(paths.db_path.clone(), embedder, vector_weight).await
    }

    pub async fn with_path(
        db_path: PathBuf,
        embedder: Arc<dyn Embedder>,
        vector_weight: f32,
    ) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            embedder,
            vector_weight: vector_weight.clamp(0.0, 1.0),
            db_path,
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                contextualized_content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
            "CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, chunk_index)",
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                contextualized_content,
                content='chunks',
                content_rowid='rowid'
            )",
            "CREATE TRIGGER IF NOT EXISTS chunks_fts_insert AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, contextualized_content)
                VALUES (new.rowid, new.contextualized_content);
            END",
            "CREATE TRIGGER IF NOT EXISTS chunks_fts_delete BEFORE DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, contextualized_content)
                VALUES ('delete', old.rowid, old.contextualized_content);
            END",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// `"tok1" OR "tok2" ...`, or `None` when the query has no word tokens.
    fn fts_query(query: &str) -> Option<String> {
        let token = FTS_TOKEN.get_or_init(|| Regex::new(r"\w+").expect("fts token regex is valid"));
        let terms: Vec<String> = token
            .find_iter(query)
            .map(|m| format!("\"{}\"", m.as_str().to_lowercase()))
            .collect();
        (!terms.is_empty()).then(|| terms.join(" OR "))
    }

    /// FTS5 matches normalized to (0, 1] by the best `bm25` score.
    async fn lexical_scores(&self, query: &str) -> Result<HashMap<String, f32>, RagError> {
        let Some(expr) = Self::fts_query(query) else {
            return Ok(HashMap::new());
        };

        let rows = sqlx::query(
            "SELECT c.chunk_id AS chunk_id, bm25(chunks_fts) AS rank
             FROM chunks_fts
             JOIN chunks c ON c.rowid = chunks_fts.rowid
             WHERE chunks_fts MATCH ?1",
        )
        .bind(&expr)
        .fetch_all(&self.pool)
        .await?;

        // bm25 is negative, lower is better
        let raw: Vec<(String, f64)> = rows
            .iter()
            .map(|row| (row.get::<String, _>("chunk_id"), -row.get::<f64, _>("rank")))
            .collect();
        let best = raw.iter().map(|(_, s)| *s).fold(0.0f64, f64::max);

        Ok(raw
            .into_iter()
            .map(|(id, s)| {
                let normalized = if best > 0.0 { (s / best).max(0.0) } else { 1.0 };
                (id, normalized as f32)
            })
            .collect())
    }

    fn row_to_hit(row: &sqlx::sqlite::SqliteRow, score: f32) -> SearchHit {
        let metadata_str: String = row.get("metadata");
        let metadata = serde_json::from_str::<Map<String, Value>>(&metadata_str).unwrap_or_default();
        let content: String = row.get("content");
        let contextualized: String = row.get("contextualized_content");

        SearchHit {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            contextualized_content: (contextualized != content).then_some(contextualized),
            content,
            score,
            metadata,
        }
    }
}

#[async_trait]
impl HybridStore for SqliteHybridStore {
    async fn index(&self, document_id: &str, items: Vec<IndexItem>) -> Result<usize, RagError> {
        let texts: Vec<String> = items.iter().map(|i| i.contextualized_content.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&texts).await?
        };
        if embeddings.len() != items.len() {
            return Err(RagError::Embedding(format!(
                "embedding count mismatch: {} != {}",
                embeddings.len(),
                items.len()
            )));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for (item, embedding) in items.iter().zip(&embeddings) {
            let metadata_str = serde_json::to_string(&item.metadata)?;
            sqlx::query(
                "INSERT INTO chunks
                    (chunk_id, document_id, chunk_index, content, contextualized_content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&item.chunk_id)
            .bind(document_id)
            .bind(item.chunk_index as i64)
            .bind(&item.content)
            .bind(&item.contextualized_content)
            .bind(&metadata_str)
            .bind(Self::serialize_embedding(embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("Indexed {} chunks for document {}", items.len(), document_id);
        Ok(items.len())
    }

    async fn hybrid_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, RagError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let lexical = self.lexical_scores(query).await?;

        let rows = sqlx::query(
            "SELECT chunk_id, document_id, content, contextualized_content, metadata, embedding
             FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let weight = self.vector_weight;
        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter_map(|row| {
                let bytes: Option<Vec<u8>> = row.get("embedding");
                let vector = bytes
                    .map(|b| cosine_similarity(&query_vec, &Self::deserialize_embedding(&b)).max(0.0))
                    .unwrap_or(0.0);
                let chunk_id: String = row.get("chunk_id");
                let text = lexical.get(&chunk_id).copied().unwrap_or(0.0);

                let score = weight * vector + (1.0 - weight) * text;
                (score > 0.0).then(|| Self::row_to_hit(row, score))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, document_id: Option<&str>) -> Result<usize, RagError> {
        let count: i64 = if let Some(document_id) = document_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count as usize)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, RagError> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
