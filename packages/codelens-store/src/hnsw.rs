//! HNSW vector index
//!
//! Wraps `hnsw_rs` with the handle↔fragment-id mapping, tombstoned
//! deletes, and checksummed persistence. The graph itself cannot remove
//! nodes in place, so removals tombstone a handle and compaction rebuilds
//! the graph without them.
//!
//! On disk: `hnsw.bin` holds the per-handle vector slots (bincode),
//! `hnsw.meta` holds the handle↔id map, the graph parameters, the
//! mirrored index version, and a blake3 checksum of `hnsw.bin`. Both are
//! written new-then-rename at batch boundaries.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, StoreError};

/// Maximum layers in the graph
const MAX_LAYER: usize = 16;

/// Tombstone share that triggers compaction at save time
const COMPACT_RATIO: f64 = 0.2;

/// Graph parameters, fixed for the lifetime of the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    pub dimension: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub metric: String,
}

impl HnswParams {
    pub fn cosine(dimension: usize, m: usize, ef_construction: usize, ef_search: usize) -> Self {
        Self {
            dimension,
            m,
            ef_construction,
            ef_search,
            metric: "cosine".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IndexMeta {
    #[serde(flatten)]
    params: HnswParams,
    index_version: i64,
    /// blake3 of hnsw.bin
    checksum: String,
    /// handle → fragment id; `None` marks a tombstone
    id_map: Vec<Option<String>>,
}

pub struct VectorIndex {
    params: HnswParams,
    /// Slot per handle; `None` marks a tombstone
    vectors: Vec<Option<Vec<f32>>>,
    id_map: Vec<Option<String>>,
    handle_of: HashMap<String, usize>,
    graph: Option<Hnsw<'static, f32, DistCosine>>,
    graph_capacity: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("params", &self.params)
            .field("vectors", &self.vectors)
            .field("id_map", &self.id_map)
            .field("handle_of", &self.handle_of)
            .field("graph", &self.graph.is_some())
            .field("graph_capacity", &self.graph_capacity)
            .finish()
    }
}

impl VectorIndex {
    pub fn new(params: HnswParams) -> Self {
        Self {
            params,
            vectors: Vec::new(),
            id_map: Vec::new(),
            handle_of: HashMap::new(),
            graph: None,
            graph_capacity: 0,
        }
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Live (non-tombstoned) entry count
    pub fn len(&self) -> usize {
        self.handle_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handle_of.is_empty()
    }

    pub fn tombstone_count(&self) -> usize {
        self.id_map.len() - self.handle_of.len()
    }

    pub fn live_ids(&self) -> HashSet<String> {
        self.handle_of.keys().cloned().collect()
    }

    pub fn contains(&self, fragment_id: &str) -> bool {
        self.handle_of.contains_key(fragment_id)
    }

    /// Insert or replace one vector. A replaced vector's old handle is
    /// tombstoned before the new handle goes live, so the id↔handle
    /// bijection holds at every step.
    pub fn upsert(&mut self, fragment_id: &str, vector: Vec<f32>) -> Result<()> {
        self.check_dimension(vector.len())?;

        if let Some(old_handle) = self.handle_of.remove(fragment_id) {
            self.vectors[old_handle] = None;
            self.id_map[old_handle] = None;
        }

        let handle = self.id_map.len();
        if handle >= self.graph_capacity {
            // Graph outgrew its declared capacity; rebuild lazily.
            self.graph = None;
        }
        if let Some(graph) = &self.graph {
            graph.insert((&vector, handle));
        }

        self.id_map.push(Some(fragment_id.to_string()));
        self.vectors.push(Some(vector));
        self.handle_of.insert(fragment_id.to_string(), handle);
        Ok(())
    }

    /// Tombstone a fragment's handle. Returns whether it was present.
    pub fn remove(&mut self, fragment_id: &str) -> bool {
        match self.handle_of.remove(fragment_id) {
            Some(handle) => {
                self.vectors[handle] = None;
                self.id_map[handle] = None;
                true
            }
            None => false,
        }
    }

    /// Approximate nearest neighbours as `(fragment_id, score)` with
    /// score = cosine similarity, best first. Tombstones are filtered
    /// by oversampling internally.
    pub fn search(&mut self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        self.check_dimension(query.len())?;
        if self.handle_of.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        self.ensure_graph();
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| StoreError::Hnsw("graph build failed".to_string()))?;

        let want = (k + self.tombstone_count()).min(self.id_map.len());
        let ef = self.params.ef_search.max(want);
        let neighbours = graph.search(query, want, ef);

        let mut out = Vec::with_capacity(k);
        for neighbour in neighbours {
            if let Some(Some(id)) = self.id_map.get(neighbour.d_id) {
                out.push((id.clone(), 1.0 - neighbour.distance));
                if out.len() == k {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Replace the whole index content (rebuild from the embedding table).
    pub fn rebuild_from(&mut self, entries: Vec<(String, Vec<f32>)>) -> Result<()> {
        for (_, vector) in &entries {
            self.check_dimension(vector.len())?;
        }

        self.vectors = Vec::with_capacity(entries.len());
        self.id_map = Vec::with_capacity(entries.len());
        self.handle_of = HashMap::with_capacity(entries.len());
        self.graph = None;

        for (id, vector) in entries {
            let handle = self.id_map.len();
            self.handle_of.insert(id.clone(), handle);
            self.id_map.push(Some(id));
            self.vectors.push(Some(vector));
        }
        info!(entries = self.id_map.len(), "vector index rebuilt");
        Ok(())
    }

    /// Drop tombstoned slots and renumber handles.
    pub fn compact(&mut self) {
        let before = self.id_map.len();
        let mut vectors = Vec::with_capacity(self.handle_of.len());
        let mut id_map = Vec::with_capacity(self.handle_of.len());
        let mut handle_of = HashMap::with_capacity(self.handle_of.len());

        for (slot, id) in self.id_map.iter().enumerate() {
            if let (Some(id), Some(vector)) = (id, &self.vectors[slot]) {
                let handle = id_map.len();
                handle_of.insert(id.clone(), handle);
                id_map.push(Some(id.clone()));
                vectors.push(Some(vector.clone()));
            }
        }

        self.vectors = vectors;
        self.id_map = id_map;
        self.handle_of = handle_of;
        self.graph = None;
        info!(
            before,
            after = self.id_map.len(),
            "vector index compacted"
        );
    }

    fn needs_compaction(&self) -> bool {
        let total = self.id_map.len();
        total > 0 && (self.tombstone_count() as f64) / (total as f64) > COMPACT_RATIO
    }

    fn ensure_graph(&mut self) {
        if self.graph.is_some() {
            return;
        }
        let capacity = (self.id_map.len() * 2).max(1024);
        let mut graph = Hnsw::<f32, DistCosine>::new(
            self.params.m,
            capacity,
            MAX_LAYER,
            self.params.ef_construction,
            DistCosine {},
        );

        let data: Vec<(&Vec<f32>, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .filter_map(|(handle, slot)| slot.as_ref().map(|v| (v, handle)))
            .collect();
        graph.parallel_insert_data(&data);

        self.graph = Some(graph);
        self.graph_capacity = capacity;
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.params.dimension {
            return Err(StoreError::Hnsw(format!(
                "dimension mismatch: expected {}, got {}",
                self.params.dimension, actual
            )));
        }
        Ok(())
    }

    // ── persistence ────────────────────────────────────────────────────

    /// Persist both files write-new-then-rename. Compacts first when the
    /// tombstone share warrants it.
    pub fn save(&mut self, bin_path: &Path, meta_path: &Path, index_version: i64) -> Result<()> {
        if self.needs_compaction() {
            self.compact();
        }

        let bin = bincode::serialize(&self.vectors)?;
        let checksum = blake3::hash(&bin).to_hex().to_string();
        let meta = IndexMeta {
            params: self.params.clone(),
            index_version,
            checksum,
            id_map: self.id_map.clone(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)?;

        write_atomic(bin_path, &bin)?;
        write_atomic(meta_path, &meta_json)?;
        Ok(())
    }

    /// Load both files, verifying the checksum and the internal handle
    /// map. A missing pair yields an empty index; a damaged pair is
    /// *index-corrupt* and the caller schedules a rebuild.
    pub fn load(params: HnswParams, bin_path: &Path, meta_path: &Path) -> Result<(Self, i64)> {
        if !bin_path.exists() && !meta_path.exists() {
            return Ok((Self::new(params), 0));
        }

        let meta_bytes = std::fs::read(meta_path)
            .map_err(|e| StoreError::IndexCorrupt(format!("cannot read hnsw.meta: {e}")))?;
        let meta: IndexMeta = serde_json::from_slice(&meta_bytes)
            .map_err(|e| StoreError::IndexCorrupt(format!("bad hnsw.meta: {e}")))?;

        if meta.params != params {
            return Err(StoreError::IndexCorrupt(format!(
                "graph parameters changed (stored {:?}); rebuild required",
                meta.params
            )));
        }

        let bin = std::fs::read(bin_path)
            .map_err(|e| StoreError::IndexCorrupt(format!("cannot read hnsw.bin: {e}")))?;
        let checksum = blake3::hash(&bin).to_hex().to_string();
        if checksum != meta.checksum {
            warn!("hnsw.bin checksum mismatch; index marked for rebuild");
            return Err(StoreError::IndexCorrupt(
                "hnsw.bin checksum mismatch".to_string(),
            ));
        }

        let vectors: Vec<Option<Vec<f32>>> = bincode::deserialize(&bin)
            .map_err(|e| StoreError::IndexCorrupt(format!("bad hnsw.bin: {e}")))?;
        if vectors.len() != meta.id_map.len() {
            return Err(StoreError::IndexCorrupt(format!(
                "handle map has {} slots, vector file has {}",
                meta.id_map.len(),
                vectors.len()
            )));
        }

        let mut handle_of = HashMap::new();
        for (handle, slot) in meta.id_map.iter().enumerate() {
            match (slot, &vectors[handle]) {
                (Some(id), Some(vector)) => {
                    if vector.len() != params.dimension {
                        return Err(StoreError::IndexCorrupt(format!(
                            "vector for {} has dimension {}",
                            id,
                            vector.len()
                        )));
                    }
                    if handle_of.insert(id.clone(), handle).is_some() {
                        return Err(StoreError::IndexCorrupt(format!(
                            "duplicate live handle for {id}"
                        )));
                    }
                }
                (None, None) => {}
                _ => {
                    return Err(StoreError::IndexCorrupt(format!(
                        "handle {handle} tombstoned on one side only"
                    )))
                }
            }
        }

        Ok((
            Self {
                params,
                vectors,
                id_map: meta.id_map,
                handle_of,
                graph: None,
                graph_capacity: 0,
            },
            meta.index_version,
        ))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
