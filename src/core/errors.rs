use thiserror::Error;

/// Coarse failure classes for a single provider call.
///
/// Internal logic only ever matches on this; the raw provider message is
/// carried for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidCredential,
    QuotaExceeded,
    MalformedOutput,
    Transient,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("malformed provider output: {0}")]
    MalformedOutput(String),
    #[error("transient provider error: {0}")]
    Transient(String),
}

impl ProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::InvalidCredential(_) => FailureKind::InvalidCredential,
            ProviderError::QuotaExceeded(_) => FailureKind::QuotaExceeded,
            ProviderError::MalformedOutput(_) => FailureKind::MalformedOutput,
            ProviderError::Transient(_) => FailureKind::Transient,
        }
    }

    pub fn transient<E: std::fmt::Display>(err: E) -> Self {
        ProviderError::Transient(err.to_string())
    }

    pub fn malformed<E: std::fmt::Display>(err: E) -> Self {
        ProviderError::MalformedOutput(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("document source error: {0}")]
    Source(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }

    pub fn config<E: std::fmt::Display>(err: E) -> Self {
        RagError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Storage(format!("serialization: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_kind_matches_variant() {
        assert_eq!(
            ProviderError::InvalidCredential("k".into()).kind(),
            FailureKind::InvalidCredential
        );
        assert_eq!(
            ProviderError::QuotaExceeded("q".into()).kind(),
            FailureKind::QuotaExceeded
        );
        assert_eq!(ProviderError::transient("t").kind(), FailureKind::Transient);
        assert_eq!(ProviderError::malformed("m").kind(), FailureKind::MalformedOutput);
    }

    #[test]
    fn provider_error_converts_into_rag_error() {
        let err: RagError = ProviderError::QuotaExceeded("429".into()).into();
        assert!(matches!(err, RagError::Provider(ProviderError::QuotaExceeded(_))));
        assert_eq!(err.to_string(), "quota exceeded: 429");
    }
}
