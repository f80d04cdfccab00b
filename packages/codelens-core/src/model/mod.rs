//! Domain models: fragments, annotations, embeddings, queries

pub mod annotation;
pub mod embedding;
pub mod file_record;
pub mod fragment;
pub mod query;
pub mod span;

pub use annotation::{Annotation, SNIPPET_SENTINEL};
pub use embedding::{blob_to_vector, vector_to_blob, EmbeddingRecord};
pub use file_record::FileRecord;
pub use fragment::{content_hash, fragment_id, Fragment, FragmentKind, FRAGMENT_ID_WIDTH};
pub use query::{render_results, OutputFormat, QueryOptions, ResultRecord};
pub use span::Span;
