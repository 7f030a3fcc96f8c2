use serde_json::{Map, Value};

use crate::core::errors::RagError;

pub fn validate_config(config: &Value) -> Result<(), RagError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(
            chunking,
            "chunking.max_segment_chars",
            "max_segment_chars",
            16,
            1_000_000,
        )?;
        validate_f64_field(
            chunking,
            "chunking.similarity_threshold",
            "similarity_threshold",
            0.0,
            1.0,
        )?;
        validate_u64_field(chunking, "chunking.overlap_units", "overlap_units", 0, 64)?;
    }

    if let Some(enrichment) = expect_optional_object(root, "enrichment")? {
        validate_u64_field(enrichment, "enrichment.max_retries", "max_retries", 1, 100)?;
        validate_f64_field(
            enrichment,
            "enrichment.retry_delay_secs",
            "retry_delay_secs",
            0.0,
            3_600.0,
        )?;
        validate_u64_field(
            enrichment,
            "enrichment.reconcile_multiplier",
            "reconcile_multiplier",
            0,
            20,
        )?;
        validate_f64_field(enrichment, "enrichment.jitter", "jitter", 0.0, 1.0)?;
        validate_u64_field(
            enrichment,
            "enrichment.preview_chars",
            "preview_chars",
            1,
            1_000_000,
        )?;
        validate_u64_field(
            enrichment,
            "enrichment.chunk_prompt_chars",
            "chunk_prompt_chars",
            1,
            1_000_000,
        )?;
        validate_optional_string_field(
            enrichment,
            "enrichment.unthrottled_model",
            "unthrottled_model",
        )?;
        if let Some(models) = enrichment.get("models") {
            let items = models
                .as_array()
                .ok_or_else(|| config_type_error("enrichment.models", "array"))?;
            if items.is_empty() {
                return Err(RagError::Config(
                    "Invalid config at 'enrichment.models': at least one model is required"
                        .to_string(),
                ));
            }
            for (index, item) in items.iter().enumerate() {
                let path_prefix = format!("enrichment.models[{}]", index);
                let entry = item
                    .as_object()
                    .ok_or_else(|| config_type_error(&path_prefix, "object"))?;
                validate_required_string_field(entry, &format!("{}.id", path_prefix), "id")?;
                validate_u64_field(entry, &format!("{}.rpm", path_prefix), "rpm", 0, 1_000_000)?;
            }
        }
    }

    if let Some(credentials) = expect_optional_object(root, "credentials")? {
        validate_string_array_field(credentials, "credentials.api_keys", "api_keys")?;
        validate_optional_string_field(
            credentials,
            "credentials.unthrottled_key",
            "unthrottled_key",
        )?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.over_fetch", "over_fetch", 2, 100)?;
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 1_000)?;
        validate_f64_field(retrieval, "retrieval.vector_weight", "vector_weight", 0.0, 1.0)?;
    }

    if let Some(rerank) = expect_optional_object(root, "rerank")? {
        validate_bool_field(rerank, "rerank.enabled", "enabled")?;
        validate_optional_string_field(rerank, "rerank.model", "model")?;
        validate_u64_field(rerank, "rerank.preview_chars", "preview_chars", 1, 100_000)?;
        validate_u64_field(rerank, "rerank.max_tokens", "max_tokens", 1, 100_000)?;
    }

    if let Some(provider) = expect_optional_object(root, "provider")? {
        validate_enum_field(provider, "provider.kind", "kind", &["gemini", "openai"])?;
        validate_optional_string_field(provider, "provider.base_url", "base_url")?;
        validate_u64_field(provider, "provider.timeout_secs", "timeout_secs", 1, 3_600)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_enum_field(embedding, "embedding.kind", "kind", &["hashing", "gemini"])?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimensions", "dimensions", 8, 65_536)?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, RagError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !(min..=max).contains(&number) {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !allowed.contains(&text) {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': expected one of {}",
            path,
            allowed.join(", ")
        )));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let value = section.get(key).ok_or_else(|| {
        RagError::Config(format!("Invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(RagError::Config(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> RagError {
    RagError::Config(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_and_full_configs() {
        assert!(validate_config(&json!({})).is_ok());
        assert!(validate_config(&json!({
            "chunking": { "max_segment_chars": 800, "similarity_threshold": 0.4 },
            "enrichment": {
                "max_retries": 3,
                "retry_delay_secs": 1.5,
                "models": [{ "id": "gemini-2.5-flash", "rpm": 5 }]
            },
            "credentials": { "api_keys": ["a", "b"], "unthrottled_key": null },
            "retrieval": { "over_fetch": 2, "vector_weight": 0.5 },
            "provider": { "kind": "gemini" }
        }))
        .is_ok());
    }

    #[test]
    fn over_fetch_must_request_more_than_top_k() {
        let err = validate_config(&json!({ "retrieval": { "over_fetch": 1 } })).unwrap_err();
        assert!(err.to_string().contains("retrieval.over_fetch"));
        assert!(validate_config(&json!({ "retrieval": { "over_fetch": 2 } })).is_ok());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let err = validate_config(&json!({ "chunking": { "similarity_threshold": 1.5 } }))
            .unwrap_err();
        assert!(err.to_string().contains("chunking.similarity_threshold"));
    }

    #[test]
    fn rejects_model_without_id() {
        let err = validate_config(&json!({ "enrichment": { "models": [{ "rpm": 5 }] } }))
            .unwrap_err();
        assert!(err.to_string().contains("enrichment.models[0].id"));
    }

    #[test]
    fn rejects_empty_model_list_and_blank_keys() {
        assert!(validate_config(&json!({ "enrichment": { "models": [] } })).is_err());
        assert!(validate_config(&json!({ "credentials": { "api_keys": ["ok", " "] } })).is_err());
    }

    #[test]
    fn rejects_unknown_provider_kind() {
        let err = validate_config(&json!({ "provider": { "kind": "bard" } })).unwrap_err();
        assert!(err.to_string().contains("gemini, openai"));
    }
}
