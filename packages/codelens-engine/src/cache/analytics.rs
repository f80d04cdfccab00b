//! Cache maintenance helpers: retention parsing and the analyze report

use std::time::Duration;

use codelens_core::{EngineError, Result};
use codelens_store::{FrequentQuery, QueryLog};

use crate::cache::QueryCache;

/// Per-tier hit/miss snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct TierReport {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

impl TierReport {
    fn new(hits: u64, misses: u64, entries: usize) -> Self {
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        Self {
            hits,
            misses,
            entries,
            hit_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheAnalytics {
    pub l1: TierReport,
    pub l2: TierReport,
    pub l3: TierReport,
    pub top_queries: Vec<FrequentQuery>,
    pub recommendations: Vec<String>,
}

/// Parse `<integer><d|h|m>` retention syntax (e.g. `7d`, `12h`, `30m`).
pub fn parse_retention(text: &str) -> Result<Duration> {
    let text = text.trim();
    if text.len() < 2 {
        return Err(bad_retention(text));
    }
    let (number, unit) = text.split_at(text.len() - 1);
    let amount: u64 = number.parse().map_err(|_| bad_retention(text))?;
    let seconds = match unit {
        "d" => amount * 24 * 60 * 60,
        "h" => amount * 60 * 60,
        "m" => amount * 60,
        _ => return Err(bad_retention(text)),
    };
    Ok(Duration::from_secs(seconds))
}

fn bad_retention(text: &str) -> EngineError {
    EngineError::configuration(format!(
        "invalid retention '{text}'; expected <integer><d|h|m>"
    ))
}

/// Hit rates per tier, the most frequent queries, and tuning hints.
pub fn analyze(cache: &QueryCache, query_log: &QueryLog, top_n: usize) -> Result<CacheAnalytics> {
    let l1 = TierReport::new(
        cache.l1().hit_count(),
        cache.l1().miss_count(),
        cache.l1().len(),
    );
    let l2 = TierReport::new(
        cache.l2().hit_count(),
        cache.l2().miss_count(),
        cache.l2().len(),
    );
    let l3 = TierReport::new(
        cache.l3().hit_count(),
        cache.l3().miss_count(),
        cache.l3().len().map_err(|e| {
            EngineError::storage(format!("l3 stats: {e}"))
        })?,
    );

    let top_queries = query_log.top_queries(top_n).map_err(EngineError::from)?;

    let mut recommendations = Vec::new();
    let (log_hits, log_total) = query_log.hit_stats().map_err(EngineError::from)?;
    if log_total >= 50 && (log_hits as f64) < 0.2 * log_total as f64 {
        recommendations.push(
            "overall cache hit rate is below 20%; warm the cache from the query log".to_string(),
        );
    }
    let l2_bytes = cache.l2().total_bytes();
    if l2_bytes > cache.l2().max_bytes() / 10 * 9 {
        recommendations.push(format!(
            "L2 tier is at {l2_bytes} of {} bytes; prune old entries",
            cache.l2().max_bytes()
        ));
    }
    if l1.hit_rate < 0.3 && l1.hits + l1.misses >= 100 {
        recommendations
            .push("L1 hit rate is low; consider raising cache.l1.max_entries".to_string());
    }

    Ok(CacheAnalytics {
        l1,
        l2,
        l3,
        top_queries,
        recommendations,
    })
}
