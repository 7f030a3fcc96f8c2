pub mod gemini;
pub mod openai;
pub mod provider;
pub mod types;


pub use provider::{build_provider, CompletionProvider, ProviderKind, ProviderSettings};
pub use types::{Credential, GenerationRequest, ModelCandidate};
