use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::provider::CompletionProvider;
use super::types::{Credential, GenerationRequest};
use crate::core::errors::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Generative Language API (`generateContent`).
#[derive(Clone)]
pub struct GeminiProvider {
    base_url: String,
    client: Client,
}

impl GeminiProvider {
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

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.trim_start_matches("models/");
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        credential: &Credential,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<String, ProviderError> {
        let url = self.endpoint(model, "generateContent");

        let mut generation_config = serde_json::Map::new();
        if let Some(t) = request.temperature {
            generation_config.insert("temperature".to_string(), json!(t));
        }
        if let Some(t) = request.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(t));
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": Value::Object(generation_config),
        });

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.secret())
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
        extract_text(&payload)
    }
}

/// Maps a failed Gemini response onto the failure taxonomy.
///
/// Uses the HTTP status and the structured `error.status` /
/// `error.details[].reason` fields of the body.
pub fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let payload: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = &payload["error"];
    let rpc_status = error["status"].as_str().unwrap_or_default();
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let reasons: Vec<&str> = error["details"]
        .as_array()
        .map(|details| details.iter().filter_map(|d| d["reason"].as_str()).collect())
        .unwrap_or_default();

    if reasons.contains(&"API_KEY_INVALID")
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || rpc_status == "UNAUTHENTICATED"
        || rpc_status == "PERMISSION_DENIED"
    {
        return ProviderError::InvalidCredential(message);
    }

    if status == StatusCode::TOO_MANY_REQUESTS || rpc_status == "RESOURCE_EXHAUSTED" {
        return ProviderError::QuotaExceeded(message);
    }

    ProviderError::Transient(message)
}

fn extract_text(payload: &Value) -> Result<String, ProviderError> {
    let parts = payload["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| ProviderError::malformed("response has no candidate parts"))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(ProviderError::malformed("empty completion"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_key_reason_is_invalid_credential() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT",
            "details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#;
        let err = classify_error(StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, ProviderError::InvalidCredential(ref m) if m == "API key not valid."));
    }

    #[test]
    fn resource_exhausted_is_quota() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, body),
            ProviderError::QuotaExceeded(_)
        ));
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(matches!(
            classify_error(StatusCode::SERVICE_UNAVAILABLE, "upstream down"),
            ProviderError::Transient(ref m) if m == "HTTP 503"
        ));
    }

    #[test]
    fn extract_text_joins_parts() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Part " }, { "text": "two" }] } }]
        });
        assert_eq!(extract_text(&payload).unwrap(), "Part two");
    }

    #[test]
    fn extract_text_rejects_blocked_response() {
        let payload = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(extract_text(&payload), Err(ProviderError::MalformedOutput(_))));
    }

    #[test]
    fn endpoint_accepts_prefixed_model_names() {
        let provider = GeminiProvider::new(
            "https://example.test/".to_string(),
            Duration::from_secs(5),
        );
        assert_eq!(
            provider.endpoint("models/text-embedding-004", "embedContent"),
            "https://example.test/v1beta/models/text-embedding-004:embedContent"
        );
    }
}
