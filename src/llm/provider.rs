use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use super::types::{Credential, GenerationRequest};
use crate::core::errors::ProviderError;

/// Text generation against a hosted model, keyed per call.
///
/// Implementations classify every failure into a `ProviderError` variant
/// before returning; callers never inspect message text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// return the provider name (e.g. "gemini", "openai")
    fn name(&self) -> &str;

    async fn generate(
        &self,
        credential: &Credential,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// Overrides the provider's public endpoint.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            base_url: None,
            timeout_secs: 60,
        }
    }
}

pub fn build_provider(settings: &ProviderSettings) -> Arc<dyn CompletionProvider> {
    let timeout = Duration::from_secs(settings.timeout_secs.max(1));
    match settings.kind {
        ProviderKind::Gemini => {
            let base = settings
                .base_url
                .clone()
                .unwrap_or_else(|| super::gemini::DEFAULT_BASE_URL.to_string());
            Arc::new(GeminiProvider::new(base, timeout))
        }
        ProviderKind::Openai => {
            let base = settings
                .base_url
                .clone()
                .unwrap_or_else(|| super::openai::DEFAULT_BASE_URL.to_string());
            Arc::new(OpenAiProvider::new(base, timeout))
        }
    }
}
