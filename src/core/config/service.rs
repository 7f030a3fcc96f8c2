use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::PipelineSettings;
use super::validation::validate_config;
use crate::core::errors::RagError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 9] = [
    "api_key",
    "unthrottled_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "access_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 3] = ["max_tokens", "token_count", "tokens"];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
    config_override: Option<PathBuf>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self {
            paths,
            config_override: None,
        }
    }

    /// Reads the public config from `path` instead of the discovered location.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_override = Some(path);
        self
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config_override {
            return path.clone();
        }
        if let Ok(path) = env::var("CTXRAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn config_write_path(&self) -> PathBuf {
        if let Some(path) = &self.config_override {
            return path.clone();
        }
        if let Ok(path) = env::var("CTXRAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        self.paths.user_data_dir.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Public config deep-merged with secrets; secrets win.
    pub fn load_config(&self) -> Result<Value, RagError> {
        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        Ok(deep_merge(&public_config, &secrets_config))
    }

    /// Loads, validates and types the configuration, then applies
    /// `CTXRAG_API_KEYS` / `CTXRAG_UNTHROTTLED_KEY` environment overrides.
    pub fn load_settings(&self) -> Result<PipelineSettings, RagError> {
        let raw = self.load_config()?;
        validate_config(&raw)?;
        let mut settings: PipelineSettings = serde_json::from_value(raw)
            .map_err(|e| RagError::Config(format!("invalid configuration: {}", e)))?;
        settings.apply_env_overrides(
            env::var("CTXRAG_API_KEYS").ok().as_deref(),
            env::var("CTXRAG_UNTHROTTLED_KEY").ok().as_deref(),
        );
        Ok(settings)
    }

    /// Writes `config` split into the public file and the secrets file.
    pub fn save_config(&self, config: &Value) -> Result<(), RagError> {
        validate_config(config)?;
        save_config_files(self, config)
    }

    /// Writes `config` to whichever of the public and secrets files is
    /// missing. Returns whether the public file was written.
    pub fn init_config(&self, config: &Value) -> Result<bool, RagError> {
        validate_config(config)?;
        let (public_config, secrets_config) = split_config(config);

        let secrets_path = self.secrets_path();
        if !secrets_path.exists() {
            write_yaml(&secrets_path, &secrets_config)?;
        }

        let config_path = self.config_write_path();
        if config_path.exists() {
            return Ok(false);
        }
        write_yaml(&config_path, &public_config)?;
        Ok(true)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, RagError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let value = serde_yaml::from_str::<Value>(&contents)
        .map_err(|e| RagError::Config(format!("{}: {}", path.display(), e)))?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(RagError::Config(format!(
            "{}: top level must be a mapping",
            path.display()
        ))),
    }
}

fn save_config_files(service: &ConfigService, config: &Value) -> Result<(), RagError> {
    let (public_config, secrets_config) = split_config(config);

    write_yaml(&service.config_write_path(), &public_config)?;
    write_yaml(&service.secrets_path(), &secrets_config)
}

fn write_yaml(path: &Path, value: &Value) -> Result<(), RagError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let yaml = serde_yaml::to_string(value).map_err(RagError::config)?;
    fs::write(path, yaml)?;
    Ok(())
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn split_config(config: &Value) -> (Value, Value) {
    match config {
        Value::Object(map) => {
            let mut public_map = Map::new();
            let mut secret_map = Map::new();

            for (key, value) in map {
                match value {
                    Value::Object(_) => {
                        let (public_sub, secret_sub) = split_config(value);
                        if !is_empty_object(&public_sub) {
                            public_map.insert(key.clone(), public_sub);
                        }
                        if !is_empty_object(&secret_sub) {
                            secret_map.insert(key.clone(), secret_sub);
                        }
                    }
                    _ => {
                        if is_sensitive_key(key) && !value.is_null() {
                            secret_map.insert(key.clone(), value.clone());
                        } else {
                            public_map.insert(key.clone(), value.clone());
                        }
                    }
                }
            }

            (Value::Object(public_map), Value::Object(secret_map))
        }
        _ => (config.clone(), Value::Object(Map::new())),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    let masked = match val {
                        Value::Array(items) => Value::Array(
                            items
                                .iter()
                                .map(|_| Value::String(REDACT_PLACEHOLDER.to_string()))
                                .collect(),
                        ),
                        _ => Value::String(REDACT_PLACEHOLDER.to_string()),
                    };
                    redacted.insert(key.clone(), masked);
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service_in(dir: &Path) -> ConfigService {
        let paths = AppPaths::from_dirs(dir.to_path_buf(), dir.join("data"));
        ConfigService::new(Arc::new(paths)).with_config_path(dir.join("config.yml"))
    }

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "a": 1,
            "b": { "c": 2, "d": 3 },
            "arr": [1, 2]
        });
        let override_value = json!({
            "b": { "c": 99 },
            "arr": [3],
            "e": "x"
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "a": 1,
                "b": { "c": 99, "d": 3 },
                "arr": [3],
                "e": "x"
            })
        );
    }

    #[test]
    fn split_config_moves_api_keys_to_secrets() {
        let input = json!({
            "credentials": {
                "api_keys": ["k1", "k2"],
                "unthrottled_key": "prod"
            },
            "rerank": { "max_tokens": 50, "model": "m" }
        });

        let (public_config, secret_config) = split_config(&input);

        assert_eq!(public_config, json!({ "rerank": { "max_tokens": 50, "model": "m" } }));
        assert_eq!(
            secret_config,
            json!({ "credentials": { "api_keys": ["k1", "k2"], "unthrottled_key": "prod" } })
        );
    }

    #[test]
    fn redact_masks_every_key_in_a_list() {
        let input = json!({
            "credentials": { "api_keys": ["k1", "k2"], "unthrottled_key": "prod" },
            "enrichment": { "max_retries": 5 }
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "credentials": { "api_keys": ["****", "****"], "unthrottled_key": "****" },
                "enrichment": { "max_retries": 5 }
            })
        );
    }

    #[test]
    fn save_then_load_round_trips_through_both_files() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service_in(tmp.path());
        let config = json!({
            "credentials": { "api_keys": ["k1"] },
            "enrichment": { "max_retries": 3 }
        });

        service.save_config(&config).unwrap();

        let public = fs::read_to_string(tmp.path().join("config.yml")).unwrap();
        assert!(!public.contains("k1"));
        let secrets = fs::read_to_string(service.secrets_path()).unwrap();
        assert!(secrets.contains("k1"));

        assert_eq!(service.load_config().unwrap(), config);
    }

    #[test]
    fn load_settings_reads_yaml_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service_in(tmp.path());
        fs::write(
            tmp.path().join("config.yml"),
            "enrichment:\n  max_retries: 2\nretrieval:\n  over_fetch: 3\n",
        )
        .unwrap();

        let settings = service.load_settings().unwrap();

        assert_eq!(settings.enrichment.max_retries, 2);
        assert_eq!(settings.retrieval.over_fetch, 3);
        assert_eq!(settings.chunking.max_segment_chars, 1000);
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service_in(tmp.path());
        fs::write(tmp.path().join("config.yml"), "enrichment: [unclosed").unwrap();

        assert!(matches!(service.load_config(), Err(RagError::Config(_))));
    }

    #[test]
    fn init_leaves_existing_secrets_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service_in(tmp.path());
        fs::write(service.secrets_path(), "credentials:\n  api_keys: [kept]\n").unwrap();

        assert!(service.init_config(&PipelineSettings::default_document()).unwrap());
        assert!(!service.init_config(&PipelineSettings::default_document()).unwrap());

        let secrets = fs::read_to_string(service.secrets_path()).unwrap();
        assert!(secrets.contains("kept"));
        let settings = service.load_settings().unwrap();
        assert_eq!(settings.enrichment.max_retries, 5);
    }
}
