//! Embedding runtime port
//!
//! The model runtime is an external pooled resource loaded once per
//! process; this crate only fixes its contract: deterministic for a given
//! model id, fixed dimension `D`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use codelens_core::{EngineError, Result};

#[async_trait]
pub trait EmbeddingRuntime: Send + Sync {
    fn model_id(&self) -> &str;
    fn model_version(&self) -> &str;
    fn dimension(&self) -> usize;

    /// One vector per input text, each of length [`Self::dimension`].
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Deterministic token-hashing embedder
///
/// Feature-hashes subtokens (split on non-alphanumerics and camelCase
/// boundaries) into a signed bag-of-words vector, L2-normalized. Useful
/// for local development and tests: identical text always embeds
/// identically, and texts sharing subtokens land near each other under
/// cosine distance. Not a substitute for a learned model.
pub struct HashingRuntime {
    dimension: usize,
}

impl HashingRuntime {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in subtokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes(digest[..8].try_into().expect("8 bytes"));
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[(bucket % self.dimension as u64) as usize] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingRuntime for HashingRuntime {
    fn model_id(&self) -> &str {
        "hashing-v1"
    }

    fn model_version(&self) -> &str {
        "1"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.dimension == 0 {
            return Err(EngineError::configuration("embedding dimension is zero"));
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Lowercased subtokens: split on non-alphanumerics, then on camelCase
/// boundaries, dropping single characters.
fn subtokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut current = String::new();
        let mut prev_lower = false;
        for c in word.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                push_token(&mut out, &mut current);
            }
            prev_lower = c.is_lowercase() || c.is_numeric();
            current.extend(c.to_lowercase());
        }
        push_token(&mut out, &mut current);
    }
    out
}

fn push_token(out: &mut Vec<String>, current: &mut String) {
    if current.len() >= 2 {
        out.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_subtokens_camel_case() {
        assert_eq!(subtokens("calcTax"), vec!["calc", "tax"]);
        assert_eq!(subtokens("tax calculation"), vec!["tax", "calculation"]);
        assert_eq!(
            subtokens("Function calcTax with 2 parameters"),
            vec!["function", "calc", "tax", "with", "parameters"]
        );
    }

    #[tokio::test]
    async fn test_deterministic() {
        let runtime = HashingRuntime::new(64);
        let a = runtime
            .embed_batch(&["tax calculation".to_string()])
            .await
            .unwrap();
        let b = runtime
            .embed_batch(&["tax calculation".to_string()])
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_dimension_and_norm() {
        let runtime = HashingRuntime::new(32);
        let vectors = runtime
            .embed_batch(&["Function calcTax with 2 parameters".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors[0].len(), 32);
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_shared_subtokens_score_higher() {
        let runtime = HashingRuntime::new(256);
        let vectors = runtime
            .embed_batch(&[
                "Function calcTax with 2 parameters".to_string(),
                "tax calculation".to_string(),
                "websocket connection pool".to_string(),
            ])
            .await
            .unwrap();

        let related = cosine(&vectors[0], &vectors[1]);
        let unrelated = cosine(&vectors[0], &vectors[2]);
        assert!(
            related > unrelated,
            "related {related} should beat unrelated {unrelated}"
        );
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let runtime = HashingRuntime::new(16);
        let vectors = runtime.embed_batch(&["".to_string()]).await.unwrap();
        assert!(vectors[0].iter().all(|x| *x == 0.0));
    }
}
