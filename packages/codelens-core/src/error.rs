//! Error types shared across the engine
//!
//! One kinded error struct for the whole pipeline:
//! - Categorized kinds matching the ingestion/retrieval stages
//! - Optional offending path and remediation hint
//! - Source error chaining

use std::fmt;
use std::path::Path;

/// Error kind categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or query input
    ConfigurationInvalid,
    /// Workspace data directory missing or unreadable
    WorkspaceNotInitialized,
    /// Revision-control oracle unavailable
    VcsUnavailable,
    /// Grammar failed to load for a language
    GrammarUnavailable,
    /// Embedding model runtime unavailable
    ModelUnavailable,
    /// Syntactic error or skipped file
    Parse,
    /// Relational store corruption
    StoreCorrupt,
    /// Vector index corruption
    IndexCorrupt,
    /// Vector index rebuild in progress
    IndexRebuilding,
    /// Writer/reader lease acquisition timed out
    LockTimeout,
    /// Operation exceeded its soft deadline
    Timeout,
    /// Retrieval dependencies down (embedder, empty runtime)
    ServiceUnavailable,
    /// Embedding batch failed after retries
    EmbedFailed,
    /// Vector index operation failed
    HnswFailed,
    /// IO errors
    Io,
    /// Database errors
    Storage,
    /// Internal errors (bugs)
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationInvalid => "configuration-invalid",
            ErrorKind::WorkspaceNotInitialized => "workspace-not-initialized",
            ErrorKind::VcsUnavailable => "vcs-unavailable",
            ErrorKind::GrammarUnavailable => "grammar-unavailable",
            ErrorKind::ModelUnavailable => "model-unavailable",
            ErrorKind::Parse => "parse-error",
            ErrorKind::StoreCorrupt => "store-corrupt",
            ErrorKind::IndexCorrupt => "index-corrupt",
            ErrorKind::IndexRebuilding => "index-rebuilding",
            ErrorKind::LockTimeout => "lock-timeout",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServiceUnavailable => "service-unavailable",
            ErrorKind::EmbedFailed => "embed-failed",
            ErrorKind::HnswFailed => "hnsw-failed",
            ErrorKind::Io => "io",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether a caller may retry the failed operation as-is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::LockTimeout | ErrorKind::Timeout | ErrorKind::IndexRebuilding
        )
    }
}

/// Unified error type
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    pub path: Option<String>,
    pub remediation: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            remediation: None,
            source: None,
        }
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().display().to_string());
        self
    }

    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation = Some(hint.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationInvalid, message)
    }

    pub fn workspace(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WorkspaceNotInitialized, message)
    }

    pub fn vcs(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::VcsUnavailable, message)
            .with_remediation("re-run with the glob or force-all selector")
    }

    pub fn grammar(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GrammarUnavailable, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn store_corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreCorrupt, message)
            .with_remediation("rebuild the workspace index from source")
    }

    pub fn index_corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IndexCorrupt, message)
    }

    pub fn index_rebuilding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IndexRebuilding, message)
            .with_remediation("retry once the background rebuild completes")
    }

    pub fn lock_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LockTimeout, message).with_remediation("retry; another writer holds the workspace lock")
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    pub fn embed_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmbedFailed, message)
    }

    pub fn hnsw(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HnswFailed, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " in {}", path)?;
        }
        if let Some(ref hint) = self.remediation {
            write!(f, " ({})", hint)?;
        }
        Ok(())
    }
}

impl fmt::Debug for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)?;
        if let Some(ref source) = self.source {
            write!(f, "\ncaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::new(ErrorKind::Io, format!("IO error: {}", err)).with_source(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::storage(format!("JSON serialization error: {}", err)).with_source(err)
    }
}

impl From<git2::Error> for EngineError {
    fn from(err: git2::Error) -> Self {
        EngineError::vcs(format!("git error: {}", err)).with_source(err)
    }
}
