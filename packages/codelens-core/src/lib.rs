//! codelens-core
//!
//! Domain layer of the codelens code-intelligence engine: data model,
//! error taxonomy, configuration, language descriptors, the fragment
//! parser, the annotator, and change detection. Persistence lives in
//! `codelens-store`; orchestration and retrieval in `codelens-engine`.

pub mod annotate;
pub mod changes;
pub mod config;
pub mod error;
pub mod lang;
pub mod model;
pub mod parser;

pub use config::EngineConfig;
pub use error::{EngineError, ErrorKind, Result};
pub use lang::Language;
pub use model::{
    Annotation, EmbeddingRecord, FileRecord, Fragment, FragmentKind, OutputFormat, QueryOptions,
    ResultRecord, Span,
};
