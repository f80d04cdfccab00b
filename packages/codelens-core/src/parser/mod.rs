//! Parser: source files → normalized fragment streams

pub mod pool;
pub mod walker;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::ParseConfig;
use crate::error::{EngineError, Result};
use crate::lang::Language;
use crate::model::fragment::content_hash;

pub use pool::{GrammarProvider, ParserPool};
pub use walker::{extract_fragments, ExtractedFragment};

/// One parsed file: the fragment stream plus the tree the annotator walks
#[derive(Debug)]
pub struct ParsedFile {
    pub language: Language,
    /// Workspace-relative, normalized path
    pub file_path: String,
    pub source: String,
    pub content_hash: String,
    pub tree: tree_sitter::Tree,
    pub fragments: Vec<ExtractedFragment>,
}

/// Fragment parser with per-language pooled parser instances
pub struct FragmentParser {
    config: ParseConfig,
    provider: GrammarProvider,
    pools: RwLock<HashMap<Language, Arc<ParserPool>>>,
}

impl FragmentParser {
    pub fn new(config: ParseConfig) -> Self {
        Self {
            config,
            provider: GrammarProvider::new(),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Parse one file from disk. Returns `Ok(None)` for unsupported
    /// languages; size and syntax problems are parse errors.
    pub fn parse_file(&self, abs_path: &Path, rel_path: &str) -> Result<Option<ParsedFile>> {
        let language = match Language::from_file_path(rel_path) {
            Some(language) => language,
            None => return Ok(None),
        };

        let meta = std::fs::metadata(abs_path).map_err(|e| {
            EngineError::parse(format!("cannot stat file: {}", e)).with_path(abs_path)
        })?;
        if meta.len() > self.config.max_file_bytes {
            return Err(EngineError::parse(format!(
                "too-large: {} bytes exceeds limit {}",
                meta.len(),
                self.config.max_file_bytes
            ))
            .with_path(abs_path)
            .with_remediation("raise parse.max_file_bytes or exclude the file"));
        }

        let source = std::fs::read_to_string(abs_path).map_err(|e| {
            EngineError::parse(format!("cannot read file: {}", e)).with_path(abs_path)
        })?;

        self.parse_source(language, rel_path, source).map(Some)
    }

    /// Parse in-memory source for one language.
    pub fn parse_source(
        &self,
        language: Language,
        rel_path: &str,
        source: String,
    ) -> Result<ParsedFile> {
        let tree = {
            let mut lease = self.lease(language)?;
            lease.parse(&source).ok_or_else(|| {
                EngineError::parse("parser returned no tree").with_path(rel_path)
            })?
        };

        if tree.root_node().has_error() {
            return Err(EngineError::parse("syntax error")
                .with_path(rel_path)
                .with_remediation("fix the syntax error; the file keeps its previous index state"));
        }

        let descriptor = language.descriptor();
        let fragments = extract_fragments(descriptor, &tree, &source, rel_path);
        debug!(
            file = rel_path,
            language = language.name(),
            fragments = fragments.len(),
            "parsed file"
        );

        Ok(ParsedFile {
            language,
            file_path: rel_path.to_string(),
            content_hash: content_hash(source.as_bytes()),
            source,
            tree,
            fragments,
        })
    }

    /// Whether a language's grammar is usable; failures are logged once
    /// and the language is skipped for the rest of the batch.
    pub fn language_available(&self, language: Language) -> bool {
        match self.lease(language) {
            Ok(_) => true,
            Err(e) => {
                warn!(language = language.name(), error = %e, "grammar unavailable, skipping language");
                false
            }
        }
    }

    fn lease(&self, language: Language) -> Result<pool::PooledParser> {
        if let Some(pool) = self.pools.read().get(&language) {
            return pool.lease();
        }

        let pool = {
            let mut pools = self.pools.write();
            if let Some(pool) = pools.get(&language) {
                Arc::clone(pool)
            } else {
                let pool = Arc::new(ParserPool::new(language, &self.provider)?);
                pools.insert(language, Arc::clone(&pool));
                pool
            }
        };
        pool.lease()
    }
}
