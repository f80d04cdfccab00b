use codelens_core::{EngineError, ErrorKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store corrupt: {0}")]
    Corrupt(String),

    #[error("vector index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("lock timeout after {waited_ms}ms for {op}")]
    LockTimeout { op: String, waited_ms: u64 },

    #[error("vector index error: {0}")]
    Hnsw(String),

    #[error("fragment not found: {0}")]
    FragmentNotFound(String),

    #[error("workspace not initialized: {0}")]
    WorkspaceNotInitialized(String),
}

impl StoreError {
    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::Database(_) | StoreError::Serialization(_) => ErrorKind::Storage,
            StoreError::Io(_) => ErrorKind::Io,
            StoreError::Corrupt(_) => ErrorKind::StoreCorrupt,
            StoreError::IndexCorrupt(_) => ErrorKind::IndexCorrupt,
            StoreError::LockTimeout { .. } => ErrorKind::LockTimeout,
            StoreError::Hnsw(_) => ErrorKind::HnswFailed,
            StoreError::FragmentNotFound(_) => ErrorKind::Storage,
            StoreError::WorkspaceNotInitialized(_) => ErrorKind::WorkspaceNotInitialized,
        };
        let mut engine_err = EngineError::new(kind, err.to_string()).with_source(err);
        if kind == ErrorKind::StoreCorrupt {
            engine_err = engine_err.with_remediation("rebuild the workspace index from source");
        }
        engine_err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: EngineError = StoreError::Corrupt("bad page".into()).into();
        assert_eq!(err.kind, ErrorKind::StoreCorrupt);
        assert!(err.remediation.is_some());

        let err: EngineError = StoreError::LockTimeout {
            op: "upsert".into(),
            waited_ms: 30_000,
        }
        .into();
        assert_eq!(err.kind, ErrorKind::LockTimeout);
    }
}
