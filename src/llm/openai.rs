use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::provider::CompletionProvider;
use super::types::{Credential, GenerationRequest};
use crate::core::errors::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Any server speaking the OpenAI `chat/completions` protocol.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        credential: &Credential,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = request.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
        }

        let res = self
            .client
            .post(&url)
            .bearer_auth(credential.secret())
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transient)?;

        let status = res.status();
        let text = res.text().await.map_err(ProviderError::transient)?;
        if !status.is_success() {
            return Err(classify_error(status, &text));
        }

        let payload: Value = serde_json::from_str(&text).map_err(ProviderError::malformed)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if content.trim().is_empty() {
            return Err(ProviderError::malformed("empty completion"));
        }
        Ok(content)
    }
}

pub fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let payload: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = &payload["error"];
    let code = error["code"].as_str().unwrap_or_default();
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || code == "invalid_api_key"
    {
        return ProviderError::InvalidCredential(message);
    }

    if status == StatusCode::TOO_MANY_REQUESTS
        || code == "insufficient_quota"
        || code == "rate_limit_exceeded"
    {
        return ProviderError::QuotaExceeded(message);
    }

    ProviderError::Transient(message)
}
