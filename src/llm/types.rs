use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// An opaque provider API key.
///
/// `Debug` and `Display` only ever show the label, so a credential can be
/// logged freely. Equality and hashing use the key alone.
#[derive(Clone)]
pub struct Credential {
    key: String,
    label: String,
}

impl Credential {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }

    /// Labels keys `key#1`, `key#2`, ... in priority order.
    pub fn from_keys<I, S>(keys: I) -> Vec<Credential>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keys.into_iter()
            .enumerate()
            .map(|(idx, key)| Credential::new(key, format!("key#{}", idx + 1)))
            .collect()
    }

    pub fn secret(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Credential {}

impl Hash for Credential {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.label).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// A model identifier with its requests-per-minute budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub id: String,
    /// Requests per minute; `0` disables local throttling for this model.
    pub rpm: u32,
}

impl ModelCandidate {
    pub fn new(id: impl Into<String>, rpm: u32) -> Self {
        Self { id: id.into(), rpm }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}
