//! Embedder: annotated fragments → embedding records
//!
//! Calls the runtime in batches with bounded retry and exposes
//! back-pressure through a semaphore on in-flight batches; producers
//! await a permit when saturated.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use codelens_core::model::EmbeddingRecord;
use codelens_core::{EngineError, Result};

use crate::embed::runtime::EmbeddingRuntime;

pub struct Embedder {
    runtime: Arc<dyn EmbeddingRuntime>,
    in_flight: Arc<Semaphore>,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

impl Embedder {
    pub fn new(runtime: Arc<dyn EmbeddingRuntime>, max_in_flight: usize, retry_attempts: u32) -> Self {
        Self {
            runtime,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
            retry_attempts: retry_attempts.max(1),
            retry_base_delay: Duration::from_millis(100),
        }
    }

    /// Shrink the backoff base (tests exercising the retry path).
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn runtime(&self) -> &Arc<dyn EmbeddingRuntime> {
        &self.runtime
    }

    pub fn dimension(&self) -> usize {
        self.runtime.dimension()
    }

    /// Embed one batch of `(fragment_id, text)` pairs.
    ///
    /// Retries with exponential backoff; permanent failure logs the
    /// affected fragment IDs and surfaces *embed-failed* so the caller
    /// can withhold the file's upsert.
    pub async fn embed_fragments(
        &self,
        batch: &[(String, String)],
    ) -> Result<Vec<EmbeddingRecord>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| EngineError::internal("embedder semaphore closed"))?;

        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let vectors = self.call_with_retry(&texts).await.map_err(|e| {
            let ids: Vec<&str> = batch.iter().map(|(id, _)| id.as_str()).collect();
            warn!(fragments = ?ids, "embedding batch failed permanently");
            EngineError::embed_failed(format!(
                "batch of {} fragments failed: {}",
                batch.len(),
                e
            ))
            .with_source(e)
        })?;

        if vectors.len() != batch.len() {
            return Err(EngineError::embed_failed(format!(
                "runtime returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }

        let dimension = self.runtime.dimension();
        let mut records = Vec::with_capacity(batch.len());
        for ((fragment_id, _), vector) in batch.iter().zip(vectors) {
            if vector.len() != dimension {
                return Err(EngineError::embed_failed(format!(
                    "vector for {} has dimension {}, expected {}",
                    fragment_id,
                    vector.len(),
                    dimension
                )));
            }
            records.push(EmbeddingRecord::new(
                fragment_id.clone(),
                vector,
                self.runtime.model_id(),
                self.runtime.model_version(),
            ));
        }
        Ok(records)
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.call_with_retry(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EngineError::service_unavailable("runtime returned no vector"))
    }

    async fn call_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut delay = self.retry_base_delay;
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            match self.runtime.embed_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    debug!(attempt, error = %e, "embed attempt failed");
                    last_error = Some(e);
                    if attempt < self.retry_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| EngineError::service_unavailable("embedding runtime unreachable")))
    }
}
