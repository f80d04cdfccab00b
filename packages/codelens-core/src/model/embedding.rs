//! Embedding row and vector blob codec
//!
//! Vectors are persisted as little-endian f32 blobs of length `D * 4`.
//! `D` is fixed for the lifetime of the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub fragment_id: String,
    pub vector: Vec<f32>,
    pub model_id: String,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn new(
        fragment_id: impl Into<String>,
        vector: Vec<f32>,
        model_id: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            fragment_id: fragment_id.into(),
            vector,
            model_id: model_id.into(),
            model_version: model_version.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Encode a vector as a little-endian f32 blob.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a little-endian f32 blob, checking the expected dimension.
pub fn blob_to_vector(blob: &[u8], dimension: usize) -> Result<Vec<f32>> {
    if blob.len() != dimension * 4 {
        return Err(EngineError::store_corrupt(format!(
            "embedding blob has {} bytes, expected {} (dimension {})",
            blob.len(),
            dimension * 4,
            dimension
        )));
    }
    let mut vector = Vec::with_capacity(dimension);
    for chunk in blob.chunks_exact(4) {
        vector.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip() {
        let vector = vec![0.25f32, -1.5, 3.0, f32::MIN_POSITIVE];
        let blob = vector_to_blob(&vector);
        assert_eq!(blob.len(), 16);
        let decoded = blob_to_vector(&blob, 4).unwrap();
        assert_eq!(decoded, vector);
    }

    #[test]
    fn test_blob_dimension_mismatch() {
        let blob = vector_to_blob(&[1.0, 2.0]);
        let err = blob_to_vector(&blob, 3).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::StoreCorrupt);
    }
}
