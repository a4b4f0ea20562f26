//! # notegraph-inference
//!
//! Generation and embedding backends for notegraph.
//!
//! The default backend talks to a local Ollama server. The `mock` feature adds
//! deterministic in-process backends for tests.

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(any(test, feature = "mock"))]
pub use mock::{HashingEmbedder, ScriptedGenerator};

// Re-export core traits for convenience
pub use notegraph_core::{EmbeddingBackend, GenerationBackend};
