//! Embedding collaborators.
//!
//! The segmenter uses embeddings as its similarity signal and the SQLite
//! store uses them for the vector half of hybrid search. How vectors are
//! produced is up to the implementation.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::core::errors::{ProviderError, RagError};
use crate::llm::gemini::{self, GeminiProvider};
use crate::llm::{Credential, ProviderSettings};
use crate::vector_math::l2_normalize;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingKind {
    #[default]
    Hashing,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub kind: EmbeddingKind,
    pub model: String,
    /// Vector size of the hashing embedder.
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            kind: EmbeddingKind::Hashing,
            model: "text-embedding-004".to_string(),
            dimensions: 384,
        }
    }
}

pub fn build_embedder(
    settings: &EmbeddingSettings,
    provider: &ProviderSettings,
    credential: Option<Credential>,
) -> Result<Arc<dyn Embedder>, RagError> {
    match settings.kind {
        EmbeddingKind::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimensions))),
        EmbeddingKind::Gemini => {
            let credential = credential.ok_or_else(|| {
                RagError::Config("gemini embeddings require at least one api key".to_string())
            })?;
            let base = provider
                .base_url
                .clone()
                .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string());
            let client = GeminiProvider::new(base, Duration::from_secs(provider.timeout_secs.max(1)));
            Ok(Arc::new(GeminiEmbedder::new(client, credential, settings.model.clone())))
        }
    }
}

static TOKEN: OnceLock<Regex> = OnceLock::new();

/// Deterministic feature-hashing bag of words.
///
/// Tokens are hashed with SHA-256 so vectors stay identical across
/// platforms and toolchains; stored embeddings never go stale on upgrade.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let token = TOKEN.get_or_init(|| Regex::new(r"\w+").expect("token regex is valid"));
        let mut vector = vec![0.0f32; self.dimensions];
        for m in token.find_iter(text) {
            let lowered = m.as_str().to_lowercase();
            let digest = Sha256::digest(lowered.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(bytes);
            let slot = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }
}

const GEMINI_BATCH_LIMIT: usize = 100;

/// Gemini `batchEmbedContents`.
pub struct GeminiEmbedder {
    client: GeminiProvider,
    credential: Credential,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(client: GeminiProvider, credential: Credential, model: String) -> Self {
        Self {
            client,
            credential,
            model,
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let model_name = format!("models/{}", self.model.trim_start_matches("models/"));
        let requests: Vec<Value> = batch
            .iter()
            .map(|text| {
                json!({
                    "model": model_name,
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();

        let res = self
            .client
            .client()
            .post(self.client.endpoint(&self.model, "batchEmbedContents"))
            .header("x-goog-api-key", self.credential.secret())
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(RagError::embedding)?;

        let status = res.status();
        let text = res.text().await.map_err(RagError::embedding)?;
        if !status.is_success() {
            let err: ProviderError = gemini::classify_error(status, &text);
            return Err(RagError::Embedding(err.to_string()));
        }

        let payload: Value = serde_json::from_str(&text).map_err(RagError::embedding)?;
        let embeddings = payload["embeddings"]
            .as_array()
            .ok_or_else(|| RagError::Embedding("response has no embeddings".to_string()))?;

        Ok(embeddings
            .iter()
            .map(|item| {
                item["values"]
                    .as_array()
                    .map(|vals| vals.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
                    .unwrap_or_default()
            })
            .collect())
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(GEMINI_BATCH_LIMIT) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        if vectors.len() != inputs.len() {
            return Err(RagError::Embedding(format!(
                "embedding count mismatch: {} != {}",
                vectors.len(),
                inputs.len()
            )));
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_math::cosine_similarity;

    #[tokio::test]
    async fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let inputs = vec!["Central banks raise rates".to_string()];
        let a = embedder.embed(&inputs).await.unwrap();
        let b = embedder.embed(&inputs).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::new(256);
        let base = embedder.embed_one("interest rates and inflation");
        let close = embedder.embed_one("Inflation pushes interest rates up");
        let far = embedder.embed_one("the cat sat on a mat");

        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn empty_text_is_the_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_one("   ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn gemini_embeddings_require_a_key() {
        let settings = EmbeddingSettings {
            kind: EmbeddingKind::Gemini,
            ..Default::default()
        };
        assert!(build_embedder(&settings, &ProviderSettings::default(), None).is_err());
    }
}
