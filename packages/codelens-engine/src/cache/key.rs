//! Cache keys
//!
//! `blake3(query_text ‖ canonical_options)`, hex. The canonical options
//! string makes logically equal option sets collide onto one key.

use codelens_core::QueryOptions;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(query_text: &str, options: &QueryOptions) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(query_text.as_bytes());
        hasher.update(b"\0");
        hasher.update(options.canonical().as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-char shard prefix for the L2 directory fan-out.
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
