//! Per-language parser pooling
//!
//! Grammar setup is not free; workers lease a configured parser instead of
//! building one per file. Leases return to the pool on drop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::lang::Language;

/// Hands out `tree_sitter::Language` values and remembers which languages
/// failed to load so the failure stays isolated to that language.
#[derive(Default)]
pub struct GrammarProvider {
    failed: Mutex<HashMap<Language, String>>,
}

impl GrammarProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_grammar(&self, language: Language) -> Result<tree_sitter::Language> {
        if let Some(reason) = self.failed.lock().get(&language) {
            return Err(EngineError::grammar(format!(
                "grammar for {} previously failed: {}",
                language.name(),
                reason
            )));
        }
        Ok((language.descriptor().grammar)())
    }

    pub(crate) fn mark_failed(&self, language: Language, reason: impl Into<String>) {
        self.failed.lock().insert(language, reason.into());
    }
}

/// Pool of configured parsers for one language
pub struct ParserPool {
    language: Language,
    parsers: Mutex<Vec<tree_sitter::Parser>>,
    grammar: tree_sitter::Language,
}

impl ParserPool {
    pub fn new(language: Language, provider: &GrammarProvider) -> Result<Self> {
        let grammar = provider.load_grammar(language)?;

        // Configure one parser eagerly so a grammar/runtime version
        // mismatch surfaces at pool construction, not mid-batch.
        let mut probe = tree_sitter::Parser::new();
        if let Err(e) = probe.set_language(&grammar) {
            provider.mark_failed(language, e.to_string());
            return Err(EngineError::grammar(format!(
                "cannot configure {} parser: {}",
                language.name(),
                e
            )));
        }

        Ok(Self {
            language,
            parsers: Mutex::new(vec![probe]),
            grammar,
        })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Lease a parser; a new one is configured when the pool is empty.
    /// The lease keeps the pool alive and returns the parser on drop.
    pub fn lease(self: &Arc<Self>) -> Result<PooledParser> {
        let parser = match self.parsers.lock().pop() {
            Some(parser) => parser,
            None => {
                let mut parser = tree_sitter::Parser::new();
                parser.set_language(&self.grammar).map_err(|e| {
                    EngineError::grammar(format!(
                        "cannot configure {} parser: {}",
                        self.language.name(),
                        e
                    ))
                })?;
                parser
            }
        };
        Ok(PooledParser {
            pool: Arc::clone(self),
            parser: Some(parser),
        })
    }

    fn give_back(&self, parser: tree_sitter::Parser) {
        self.parsers.lock().push(parser);
    }
}

/// Parser lease; returns to its pool on drop
pub struct PooledParser {
    pool: Arc<ParserPool>,
    parser: Option<tree_sitter::Parser>,
}

impl PooledParser {
    pub fn parse(&mut self, source: &str) -> Option<tree_sitter::Tree> {
        self.parser
            .as_mut()
            .expect("parser present until drop")
            .parse(source, None)
    }
}

impl Drop for PooledParser {
    fn drop(&mut self) {
        if let Some(parser) = self.parser.take() {
            self.pool.give_back(parser);
        }
    }
}
