pub mod chunking;
pub mod core;
pub mod embedding;
pub mod enrichment;
pub mod llm;
pub mod rag;
pub mod state;
pub mod vector_math;
