//! Retriever: query string → ranked, hydrated result records
//!
//! Embeds the query with the ingestion runtime, searches the vector
//! index with oversampling to absorb post-filtering, hydrates hits
//! through the store's join, ranks with deterministic tie-breaks, and
//! keeps the query cache and query log current.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use codelens_core::model::query::ordered_score::OrderedScore;
use codelens_core::{EngineError, QueryOptions, Result, ResultRecord};
use codelens_store::{QueryLogEntry, Store};

use crate::cache::{CacheKey, CacheTier, CachedResult, QueryCache};
use crate::embed::Embedder;

/// Post-filter head-room added on top of `k × oversample`
const OVERSAMPLE_MARGIN: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResponse {
    pub records: Vec<ResultRecord>,
    /// Which tier served the result; `None` means a full computation
    pub cache_tier: Option<CacheTier>,
    pub index_version: i64,
    pub duration_ms: u64,
}

impl RetrievalResponse {
    pub fn cache_hit(&self) -> bool {
        self.cache_tier.is_some()
    }
}

pub struct Retriever {
    store: Arc<Store>,
    embedder: Arc<Embedder>,
    cache: Arc<QueryCache>,
}

impl Retriever {
    pub fn new(store: Arc<Store>, embedder: Arc<Embedder>, cache: Arc<QueryCache>) -> Self {
        Self {
            store,
            embedder,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Serve one query under the configured soft deadline. A deadline
    /// expiry abandons the in-flight work and returns *timeout* without
    /// poisoning the cache.
    pub async fn query(&self, text: &str, options: &QueryOptions) -> Result<RetrievalResponse> {
        if text.trim().is_empty() {
            return Err(EngineError::configuration("query text is empty"));
        }
        options.validate()?;

        let deadline = Duration::from_millis(self.store.config().query.deadline_ms);
        match tokio::time::timeout(deadline, self.query_inner(text, options)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::timeout(format!(
                "query exceeded {}ms deadline",
                deadline.as_millis()
            ))),
        }
    }

    async fn query_inner(&self, text: &str, options: &QueryOptions) -> Result<RetrievalResponse> {
        let started = Instant::now();
        let version = self.store.current_index_version()?;
        let key = CacheKey::compute(text, options);

        if let Some((records, tier)) = self.cache.lookup(&key, version) {
            let duration_ms = started.elapsed().as_millis() as u64;
            self.log_query(text, options, records.len(), duration_ms, true, version);
            return Ok(RetrievalResponse {
                records,
                cache_tier: Some(tier),
                index_version: version,
                duration_ms,
            });
        }

        if self.store.needs_rebuild() {
            if self.store.try_begin_rebuild() {
                let store = Arc::clone(&self.store);
                info!("vector index corrupt; starting background rebuild");
                tokio::spawn(async move {
                    match tokio::task::spawn_blocking(move || store.rebuild_index()).await {
                        Ok(Ok(())) => info!("vector index rebuild complete"),
                        Ok(Err(e)) => warn!(error = %e, "vector index rebuild failed"),
                        Err(e) => warn!(error = %e, "rebuild task panicked"),
                    }
                });
            }
            return Err(EngineError::index_rebuilding(
                "vector index is being rebuilt from the embedding table",
            ));
        }

        let query_vec = self.embedder.embed_query(text).await.map_err(|e| {
            if e.kind == codelens_core::ErrorKind::ConfigurationInvalid {
                e
            } else {
                EngineError::service_unavailable(format!("embedding runtime failed: {e}"))
                    .with_source(e)
            }
        })?;

        let overfetch = (options.k * self.store.config().query.oversample)
            .max(options.k + OVERSAMPLE_MARGIN);

        let store = &self.store;
        let (hits, hydrated) = store.with_shared_lock("query", || {
            let hits = store.hnsw_search(&query_vec, overfetch)?;
            let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
            let hydrated = store.fetch_hydration(&ids)?;
            Ok((hits, hydrated))
        })?;

        let mut by_id: HashMap<String, codelens_store::HydratedFragment> = hydrated
            .into_iter()
            .map(|h| (h.fragment.id.clone(), h))
            .collect();

        let mut records: Vec<ResultRecord> = hits
            .into_iter()
            .filter_map(|(id, score)| {
                by_id.remove(&id).map(|h| ResultRecord {
                    fragment_id: h.fragment.id,
                    kind: h.fragment.kind,
                    name: h.fragment.name,
                    file_path: h.fragment.file_path,
                    signature: h.annotation.signature,
                    summary: h.annotation.summary,
                    complexity: h.annotation.complexity,
                    dependencies: h.annotation.dependencies,
                    snippet: h.annotation.snippet,
                    score,
                    start_line: h.fragment.span.start_line,
                })
            })
            .collect();

        // filters, then deterministic ranking, then truncation to k
        if let Some(min_score) = options.min_score {
            records.retain(|r| r.score >= min_score);
        }
        if let Some(filter) = &options.file_filter {
            records.retain(|r| r.file_path.contains(filter.as_str()));
        }
        if let Some(kind) = options.kind_filter {
            records.retain(|r| r.kind == kind);
        }
        records.sort_by(|a, b| {
            OrderedScore(b.score)
                .cmp(&OrderedScore(a.score))
                .then_with(|| a.file_path.cmp(&b.file_path))
                .then_with(|| a.start_line.cmp(&b.start_line))
        });
        records.truncate(options.k);

        let duration_ms = started.elapsed().as_millis() as u64;
        self.log_query(text, options, records.len(), duration_ms, false, version);

        self.cache.insert(
            &key,
            CachedResult {
                index_version: version,
                records: records.clone(),
            },
        )?;

        Ok(RetrievalResponse {
            records,
            cache_tier: None,
            index_version: version,
            duration_ms,
        })
    }

    fn log_query(
        &self,
        text: &str,
        options: &QueryOptions,
        result_count: usize,
        duration_ms: u64,
        cache_hit: bool,
        index_version: i64,
    ) {
        let entry = QueryLogEntry {
            query_text: text.to_string(),
            query_hash: CacheKey::compute(text, options).as_str().to_string(),
            options: serde_json::to_string(options).unwrap_or_default(),
            result_count,
            duration_ms,
            cache_hit,
            index_version,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.store.query_log().append(&entry) {
            warn!(error = %e, "query log append failed");
        }
    }

    /// Re-execute the `top_n` most frequent logged queries to pre-warm
    /// the tiers. Returns how many were executed.
    pub async fn warm(&self, top_n: usize) -> Result<usize> {
        let top = self
            .store
            .query_log()
            .top_queries(top_n)
            .map_err(EngineError::from)?;

        let mut warmed = 0;
        for frequent in top {
            let options: QueryOptions =
                serde_json::from_str(&frequent.options).unwrap_or_default();
            match self.query(&frequent.query_text, &options).await {
                Ok(_) => warmed += 1,
                Err(e) => warn!(query = frequent.query_text.as_str(), error = %e, "warm query failed"),
            }
        }
        Ok(warmed)
    }
}
