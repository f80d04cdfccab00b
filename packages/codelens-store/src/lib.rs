//! codelens-store
//!
//! Persistence layer of the codelens engine: the workspace data
//! directory, advisory locking, the fragment and embedding stores, the
//! HNSW vector index, the query log, and the [`Store`] facade that owns
//! them all.

pub mod embeddings;
pub mod error;
pub mod fragments;
pub mod hnsw;
pub mod layout;
pub mod lock;
pub mod query_log;
pub mod store;

pub use embeddings::EmbeddingStore;
pub use error::{Result, StoreError};
pub use fragments::{FragmentStore, HydratedFragment};
pub use hnsw::{HnswParams, VectorIndex};
pub use layout::{WorkspaceLayout, DATA_DIR_NAME};
pub use lock::{LockGuard, LockMode, WorkspaceLock};
pub use query_log::{FrequentQuery, QueryLog, QueryLogEntry};
pub use store::{Store, StoreStats};
