//! Typed view over the merged configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunking::SegmenterConfig;
use crate::embedding::EmbeddingSettings;
use crate::enrichment::EnrichmentConfig;
use crate::llm::{Credential, ProviderSettings};
use crate::rag::{RerankConfig, RetrievalConfig};

pub const UNTHROTTLED_LABEL: &str = "unthrottled";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// Rotating keys, in priority order.
    pub api_keys: Vec<String>,
    /// Fallback key that bypasses local rate limiting.
    pub unthrottled_key: Option<String>,
}

impl CredentialSettings {
    /// Trimmed, non-empty keys; a repeated key keeps its first position.
    pub fn credentials(&self) -> Vec<Credential> {
        let mut seen = HashSet::new();
        Credential::from_keys(
            self.api_keys
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty() && seen.insert(*k))
                .map(str::to_string),
        )
    }

    pub fn unthrottled(&self) -> Option<Credential> {
        self.unthrottled_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| Credential::new(k, UNTHROTTLED_LABEL))
    }

    /// First usable key, for collaborators that need exactly one.
    pub fn primary(&self) -> Option<Credential> {
        self.credentials().into_iter().next().or_else(|| self.unthrottled())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub chunking: SegmenterConfig,
    pub enrichment: EnrichmentConfig,
    pub credentials: CredentialSettings,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub provider: ProviderSettings,
    pub embedding: EmbeddingSettings,
}

impl PipelineSettings {
    /// `keys` is a comma-separated list replacing `credentials.api_keys`.
    pub fn apply_env_overrides(&mut self, keys: Option<&str>, unthrottled: Option<&str>) {
        if let Some(keys) = keys {
            let parsed: Vec<String> = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
            if !parsed.is_empty() {
                self.credentials.api_keys = parsed;
            }
        }
        if let Some(key) = unthrottled.map(str::trim).filter(|k| !k.is_empty()) {
            self.credentials.unthrottled_key = Some(key.to_string());
        }
    }

    /// Defaults as a config document, secrets left empty.
    pub fn default_document() -> Value {
        serde_json::to_value(PipelineSettings::default()).unwrap_or(Value::Null)
    }
}
