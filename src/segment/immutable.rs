//! The frozen, HNSW-indexed tier a promoted [`super::active::ActiveSegment`]
//! becomes: one native HNSW graph per named vector, plus the ordered point-id
//! table that maps graph node ids back to external identifiers.

use crate::distance::MetricDistance;
use crate::error::{Error, Result};
use crate::index::hnsw::{HnswSnapshot, NativeHnsw};
use crate::point::{Point, PointId, Vector, VectorName};
use crate::query::{QueryBatchResult, ScoredPoint};
use crate::schema::CollectionInfo;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

/// One named vector's HNSW graph, plus the mapping from the graph's own
/// sequential node ids back to positions in [`ImmutableSegment::point_ids`].
///
/// Not every point carries every name, so a named index's node ids are dense
/// only over the points that *do* carry that name — `local_to_point` recovers
/// the external id for a given graph hit.
struct NamedIndex {
    graph: NativeHnsw<MetricDistance>,
    local_to_point: Vec<PointId>,
}

/// A promoted, read-only segment: immutable point data indexed for
/// approximate nearest-neighbor search.
pub struct ImmutableSegment {
    point_ids: Vec<PointId>,
    vector_dims: HashMap<VectorName, usize>,
    indexes: HashMap<VectorName, NamedIndex>,
    info: CollectionInfo,
    /// Ids superseded by a later upsert that landed in the active segment
    /// (or a newer immutable segment) after this one was frozen. Filtered
    /// out of every read path; never written back to the pool it no longer
    /// belongs to.
    tombstones: RwLock<HashSet<PointId>>,
}

/// On-disk contents of one named vector's `index_<name>.faiss` file: the
/// index's own native (bincode) serialization, plus the node-id → `PointId`
/// table needed to resolve a hit back to an external id (not every point
/// carries every name, so this table is private to each named index).
#[derive(Serialize, Deserialize)]
struct IndexFile {
    local_to_point: Vec<PointId>,
    snapshot: HnswSnapshot,
}

impl ImmutableSegment {
    /// Builds an immutable segment from a snapshot of live points, grounding
    /// one HNSW graph per distinct vector name present in the input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if `points` is empty.
    pub fn build(points: &[Point], info: &CollectionInfo) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::Internal("no points to index".to_string()));
        }

        let point_ids: Vec<PointId> = points.iter().map(|p| p.id.clone()).collect();
        let mut vector_dims: HashMap<VectorName, usize> = HashMap::new();
        let mut per_name: HashMap<VectorName, Vec<(PointId, Vector)>> = HashMap::new();

        for point in points {
            for (name, vector) in point.all_vectors() {
                vector_dims.entry(name.clone()).or_insert(vector.len());
                per_name
                    .entry(name.clone())
                    .or_default()
                    .push((point.id.clone(), vector.clone()));
            }
        }

        let spec = info.index_spec;
        let mut indexes = HashMap::with_capacity(per_name.len());
        for (name, entries) in per_name {
            let Some(vector_spec) = info.vector_spec(&name) else {
                return Err(Error::UnknownVectorName(name));
            };
            let metric = vector_spec.metric;
            let graph = NativeHnsw::with_alpha(
                MetricDistance(metric),
                spec.m_edges,
                spec.ef_construction,
                entries.len(),
                spec.alpha,
            );
            let mut local_to_point = Vec::with_capacity(entries.len());
            for (point_id, mut vector) in entries {
                metric.normalize_if_cosine(&mut vector);
                graph.insert(vector);
                local_to_point.push(point_id);
            }
            indexes.insert(name, NamedIndex { graph, local_to_point });
        }

        Ok(Self {
            point_ids,
            vector_dims,
            indexes,
            info: info.clone(),
            tombstones: RwLock::new(HashSet::new()),
        })
    }

    /// Number of live (non-tombstoned) points held by this segment.
    #[must_use]
    pub fn point_count(&self) -> usize {
        if self.tombstones.read().is_empty() {
            return self.point_ids.len();
        }
        self.point_ids.iter().filter(|id| !self.is_tombstoned(id)).count()
    }

    /// The authoritative external identifiers for every point in this segment,
    /// including any since superseded elsewhere (use [`ImmutableSegment::contains_point`]
    /// to check current liveness).
    #[must_use]
    pub fn point_ids(&self) -> &[PointId] {
        &self.point_ids
    }

    /// Best-effort membership check via a scan of the point-id table; ids
    /// superseded by a later upsert are reported absent.
    #[must_use]
    pub fn contains_point(&self, id: &PointId) -> bool {
        self.point_ids.contains(id) && !self.is_tombstoned(id)
    }

    fn is_tombstoned(&self, id: &PointId) -> bool {
        self.tombstones.read().contains(id)
    }

    /// Marks `id` as superseded: its vectors stay on disk and in the HNSW
    /// graph, but it is excluded from search results, `point_count`, and
    /// `contains_point` from now on.
    pub fn tombstone(&self, id: &PointId) {
        self.tombstones.write().insert(id.clone());
    }

    /// The declared dimension of each named vector carried by this segment.
    #[must_use]
    pub fn vector_dimensions(&self) -> &HashMap<VectorName, usize> {
        &self.vector_dims
    }

    /// True once a segment has drifted far enough from its original size
    /// (through future deletes/tombstoning) to be worth merging.
    #[must_use]
    pub fn should_merge(&self, index_threshold: usize) -> bool {
        self.point_ids.len() < index_threshold * 2
    }

    /// Top-k search against one named vector's HNSW index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVectorName`] if no index exists for `vector_name`,
    /// or [`Error::DimensionMismatch`] if `query`'s length disagrees with the schema.
    pub fn search(&self, vector_name: &str, query: &Vector, k: usize) -> Result<QueryBatchResult> {
        let Some(spec) = self.info.vector_spec(vector_name) else {
            return Err(Error::UnknownVectorName(vector_name.to_string()));
        };
        if query.len() != spec.dim {
            return Err(Error::DimensionMismatch {
                name: vector_name.to_string(),
                expected: spec.dim,
                actual: query.len(),
            });
        }
        let Some(index) = self.indexes.get(vector_name) else {
            return Ok(QueryBatchResult::default());
        };

        let mut query = query.clone();
        spec.metric.normalize_if_cosine(&mut query);
        let ef_search = self.info.index_spec.ef_search.max(k);
        let hits = index.graph.search(&query, k, ef_search);

        let mut batch = QueryBatchResult {
            hits: hits
                .into_iter()
                .map(|(local_id, distance)| ScoredPoint {
                    point_id: index.local_to_point[local_id].clone(),
                    score: -distance,
                })
                .filter(|hit| !self.is_tombstoned(&hit.point_id))
                .collect(),
        };
        batch.sort_and_truncate(k);
        Ok(batch)
    }

    /// Fans out [`ImmutableSegment::search`] across several named vectors and
    /// merges the results, keeping the higher score for any point that hits
    /// under more than one name.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered across the fanned-out searches.
    pub fn search_multi(
        &self,
        queries: &[(VectorName, Vector)],
        k: usize,
    ) -> Result<QueryBatchResult> {
        let mut merged = QueryBatchResult::default();
        for (name, query) in queries {
            let batch = self.search(name, query, k)?;
            merged.merge(batch, k);
        }
        Ok(merged)
    }

    /// Serializes the segment into `dir` (created if absent) as four files:
    /// `metadata.txt`, `point_ids.bin`, `vector_dims.bin`, and one
    /// `index_<name>.faiss` per named index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] or [`Error::Io`] on failure.
    pub fn write_to_disk(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.write_metadata(dir)?;
        self.write_point_ids(dir)?;
        self.write_vector_dims(dir)?;
        for (name, index) in &self.indexes {
            self.write_index_file(dir, name, index)?;
        }
        Ok(())
    }

    fn write_metadata(&self, dir: &Path) -> Result<()> {
        let spec = self.info.index_spec;
        let mut text = String::new();
        text.push_str(&format!("point_count: {}\n", self.point_ids.len()));
        text.push_str(&format!("tinymap_capacity: {}\n", crate::point::MAX_NAMED_VECTORS));
        text.push_str(&format!("m_edges: {}\n", spec.m_edges));
        text.push_str(&format!("ef_construction: {}\n", spec.ef_construction));
        text.push_str(&format!("ef_search: {}\n", spec.ef_search));
        text.push_str(&format!("index_threshold: {}\n", spec.index_threshold));
        text.push_str(&format!("alpha: {}\n", spec.alpha));
        std::fs::write(dir.join("metadata.txt"), text)?;
        Ok(())
    }

    fn write_point_ids(&self, dir: &Path) -> Result<()> {
        let mut buf = Vec::new();
        for id in &self.point_ids {
            write_len_prefixed(&mut buf, &id.to_bytes());
        }
        std::fs::write(dir.join("point_ids.bin"), buf)?;
        Ok(())
    }

    fn write_vector_dims(&self, dir: &Path) -> Result<()> {
        let mut buf = Vec::new();
        for (name, dim) in &self.vector_dims {
            write_len_prefixed_u64(&mut buf, name.as_bytes());
            buf.extend_from_slice(&(*dim as u64).to_le_bytes());
        }
        std::fs::write(dir.join("vector_dims.bin"), buf)?;
        Ok(())
    }

    fn write_index_file(&self, dir: &Path, name: &str, index: &NamedIndex) -> Result<()> {
        let file = IndexFile {
            local_to_point: index.local_to_point.clone(),
            snapshot: index.graph.snapshot(),
        };
        let bytes = bincode::serialize(&file).map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(dir.join(format!("index_{name}.faiss")), bytes)?;
        Ok(())
    }

    /// Rebuilds an [`ImmutableSegment`] previously written by
    /// [`ImmutableSegment::write_to_disk`]. `info` supplies the schema
    /// (vector names, metrics, `IndexSpec`) the same way [`ImmutableSegment::build`]
    /// does; it is never re-derived from the on-disk files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a file cannot be read, or [`Error::Corrupt`]
    /// if `point_ids.bin`/`vector_dims.bin` or an index file fails to parse.
    pub fn read_from_disk(dir: &Path, info: &CollectionInfo) -> Result<Self> {
        let point_ids = read_point_ids(dir)?;
        let vector_dims = read_vector_dims(dir)?;

        let mut indexes = HashMap::with_capacity(vector_dims.len());
        for (name, _dim) in &vector_dims {
            let metric = info
                .vector_spec(name)
                .ok_or_else(|| Error::UnknownVectorName(name.clone()))?
                .metric;
            let bytes = std::fs::read(dir.join(format!("index_{name}.faiss")))?;
            let file: IndexFile =
                bincode::deserialize(&bytes).map_err(|e| Error::Corrupt(e.to_string()))?;
            let graph = NativeHnsw::from_snapshot(MetricDistance(metric), file.snapshot);
            indexes.insert(name.clone(), NamedIndex { graph, local_to_point: file.local_to_point });
        }

        Ok(Self {
            point_ids,
            vector_dims: vector_dims.into_iter().collect(),
            indexes,
            info: info.clone(),
            tombstones: RwLock::new(HashSet::new()),
        })
    }
}

fn write_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn write_len_prefixed_u64(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_point_ids(dir: &Path) -> Result<Vec<PointId>> {
    let bytes = std::fs::read(dir.join("point_ids.bin"))?;
    let mut cursor = &bytes[..];
    let mut ids = Vec::new();
    while !cursor.is_empty() {
        let mut len_buf = [0u8; 4];
        cursor.read_exact(&mut len_buf).map_err(|_| Error::Corrupt("truncated point_ids.bin".to_string()))?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if cursor.len() < len {
            return Err(Error::Corrupt("truncated point_ids.bin entry".to_string()));
        }
        let (entry, rest) = cursor.split_at(len);
        let id = PointId::from_bytes(entry)
            .ok_or_else(|| Error::Corrupt("invalid point id in point_ids.bin".to_string()))?;
        ids.push(id);
        cursor = rest;
    }
    Ok(ids)
}

fn read_vector_dims(dir: &Path) -> Result<Vec<(VectorName, usize)>> {
    let bytes = std::fs::read(dir.join("vector_dims.bin"))?;
    let mut cursor = &bytes[..];
    let mut dims = Vec::new();
    while !cursor.is_empty() {
        let mut len_buf = [0u8; 8];
        cursor.read_exact(&mut len_buf).map_err(|_| Error::Corrupt("truncated vector_dims.bin".to_string()))?;
        let name_len = u64::from_le_bytes(len_buf) as usize;
        if cursor.len() < name_len {
            return Err(Error::Corrupt("truncated vector_dims.bin name".to_string()));
        }
        let (name_bytes, rest) = cursor.split_at(name_len);
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|e| Error::Corrupt(format!("invalid utf-8 in vector_dims.bin: {e}")))?;
        cursor = rest;

        let mut dim_buf = [0u8; 8];
        cursor.read_exact(&mut dim_buf).map_err(|_| Error::Corrupt("truncated vector_dims.bin dim".to_string()))?;
        dims.push((name, u64::from_le_bytes(dim_buf) as usize));
    }
    Ok(dims)
}
