//! codelens-engine
//!
//! Orchestration layer of the codelens code-intelligence engine: the
//! embedder, the retriever, the three-tier query cache, the ingestion
//! pipeline, and the filesystem watcher, assembled over a workspace by
//! [`Engine`].

pub mod cache;
pub mod embed;
pub mod pipeline;
pub mod retrieve;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use codelens_core::changes::FileSelector;
use codelens_core::{EngineError, QueryOptions, Result};
use codelens_store::Store;

pub use cache::{CacheAnalytics, CacheTier, QueryCache};
pub use embed::{Embedder, EmbeddingRuntime, HashingRuntime};
pub use pipeline::{IngestPipeline, IngestReport};
pub use retrieve::{RetrievalResponse, Retriever};
pub use watch::{BatchSink, WorkspaceWatcher};

/// One assembled engine over one workspace
pub struct Engine {
    store: Arc<Store>,
    pipeline: Arc<IngestPipeline>,
    retriever: Retriever,
    cache: Arc<QueryCache>,
    cancel: CancellationToken,
}

impl Engine {
    /// Open the workspace store and wire every component to it. Must be
    /// called within a tokio runtime (the cache spawns its background
    /// writer there).
    pub fn open(workspace_root: &Path, runtime: Arc<dyn EmbeddingRuntime>) -> Result<Self> {
        let store = Store::open(workspace_root)?;
        let config = store.config().clone();

        if runtime.dimension() != config.embedding.dimension {
            return Err(EngineError::configuration(format!(
                "runtime dimension {} does not match configured dimension {}",
                runtime.dimension(),
                config.embedding.dimension
            ))
            .with_remediation("changing the dimension requires a full rebuild"));
        }

        let embedder = Arc::new(Embedder::new(
            runtime,
            config.embedding.max_in_flight,
            config.embedding.retry_attempts,
        ));
        let cache = Arc::new(QueryCache::open(store.layout(), &config.cache, true)?);
        let pipeline = Arc::new(IngestPipeline::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
        )?);
        let retriever = Retriever::new(Arc::clone(&store), embedder, Arc::clone(&cache));

        Ok(Self {
            store,
            pipeline,
            retriever,
            cache,
            cancel: CancellationToken::new(),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run one ingestion pass for the selector.
    pub async fn ingest(&self, selector: &FileSelector) -> Result<IngestReport> {
        self.pipeline.run(selector, &self.cancel).await
    }

    /// Serve one query.
    pub async fn query(&self, text: &str, options: &QueryOptions) -> Result<RetrievalResponse> {
        self.retriever.query(text, options).await
    }

    /// Pre-populate the cache from the query log.
    pub async fn warm_cache(&self, top_n: usize) -> Result<usize> {
        self.retriever.warm(top_n).await
    }

    pub fn clear_cache(&self, tier: Option<CacheTier>) -> Result<()> {
        self.cache.clear(tier)
    }

    /// Prune cache entries older than `retention` (`<integer><d|h|m>`),
    /// and the query log past its configured retention window.
    pub fn prune_cache(&self, retention: &str, tier: Option<CacheTier>) -> Result<usize> {
        let age = cache::parse_retention(retention)?;
        let removed = self.cache.prune(age, tier)?;

        let log_cutoff = chrono::Utc::now()
            - chrono::Duration::days(self.store.config().log_retention_days as i64);
        if let Err(e) = self.store.query_log().prune_older_than(log_cutoff) {
            warn!(error = %e, "query log prune failed");
        }
        Ok(removed)
    }

    pub fn analyze_cache(&self) -> Result<CacheAnalytics> {
        cache::analytics::analyze(&self.cache, self.store.query_log(), 10)
    }

    /// Build a watcher that drives incremental ingestion for this
    /// workspace. Call [`WorkspaceWatcher::start`] on the result.
    pub fn watcher(&self) -> WorkspaceWatcher {
        let sink = Arc::new(PipelineSink {
            pipeline: Arc::clone(&self.pipeline),
            handle: tokio::runtime::Handle::current(),
            cancel: self.cancel.clone(),
        });
        WorkspaceWatcher::new(
            self.store.layout().workspace_root(),
            self.store.config().watch.clone(),
            sink,
        )
    }
}

/// Sink adapter: watcher drains run the pipeline on the engine runtime.
struct PipelineSink {
    pipeline: Arc<IngestPipeline>,
    handle: tokio::runtime::Handle,
    cancel: CancellationToken,
}

impl BatchSink for PipelineSink {
    fn handle_batch(&self, paths: Vec<PathBuf>) {
        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.cancel.clone();
        let outcome = self
            .handle
            .block_on(async move { pipeline.ingest_paths(&paths, &cancel).await });
        if let Err(e) = outcome {
            warn!(error = %e, "watch-driven ingestion failed");
        }
    }
}

/// Install a tracing subscriber honoring `RUST_LOG`; repeated calls are
/// no-ops. Embedding hosts usually install their own.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
