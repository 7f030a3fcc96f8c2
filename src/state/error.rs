use thiserror::Error;

use crate::core::errors::RagError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] RagError),

    #[error("Failed to initialize embedder: {0}")]
    Embedder(#[source] RagError),

    #[error("Failed to initialize knowledge store: {0}")]
    Store(#[source] RagError),
}
