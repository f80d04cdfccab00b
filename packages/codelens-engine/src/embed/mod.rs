//! Embedding stage: runtime port, deterministic local runtime, and the
//! batching embedder with retry and back-pressure.

pub mod embedder;
pub mod runtime;

pub use embedder::Embedder;
pub use runtime::{EmbeddingRuntime, HashingRuntime};
