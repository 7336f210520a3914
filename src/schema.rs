//! Collection schema: named-vector specs, index parameters, and segment ids.

use crate::config::Config;
use crate::distance::DistanceMetric;
use crate::point::{TinyMap, VectorName, MAX_NAMED_VECTORS};
use serde::{Deserialize, Serialize};

/// Per-name vector schema: dimension and distance metric, fixed at collection
/// creation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorSpec {
    /// Declared dimension; every vector stored under this name must match it.
    pub dim: usize,
    /// Distance metric used to score this named vector.
    pub metric: DistanceMetric,
}

/// HNSW build/search parameters for one named vector's index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Bidirectional edges per node (M).
    pub m_edges: usize,
    /// Candidate pool size at construction time.
    pub ef_construction: usize,
    /// Candidate pool size at query time.
    pub ef_search: usize,
    /// Point count at which an `ActiveSegment` becomes eligible for promotion.
    pub index_threshold: usize,
    /// VAMANA-style diversification parameter.
    pub alpha: f32,
}

impl From<&Config> for IndexSpec {
    fn from(config: &Config) -> Self {
        Self {
            m_edges: config.hnsw.m_edges,
            ef_construction: config.hnsw.ef_construction,
            ef_search: config.hnsw.ef_search,
            index_threshold: config.segment.index_threshold,
            alpha: config.hnsw.alpha,
        }
    }
}

/// Opaque label identifying one frozen `ImmutableSegment` within a collection.
pub type SegmentId = String;

/// Generates a fresh, collision-resistant segment id.
#[must_use]
pub fn generate_segment_id() -> SegmentId {
    format!("segment_{}", uuid::Uuid::new_v4())
}

/// The schema of a collection: its named vector specs and whether it is
/// persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Per-name vector schema (at most [`MAX_NAMED_VECTORS`] entries).
    pub vec_specs: TinyMap<VectorName, VectorSpec, MAX_NAMED_VECTORS>,
    /// Whether segments of this collection are flushed to disk.
    pub on_disk: bool,
    /// HNSW parameters applied when promoting a segment of this collection.
    pub index_spec: IndexSpec,
}

impl CollectionInfo {
    /// Creates a new schema with no vector names registered yet.
    #[must_use]
    pub fn new(name: impl Into<String>, index_spec: IndexSpec) -> Self {
        Self {
            name: name.into(),
            vec_specs: TinyMap::new(),
            on_disk: false,
            index_spec,
        }
    }

    /// Registers a named vector's schema.
    ///
    /// Returns `false` if the name is new and the schema is already at the
    /// TinyMap bound.
    pub fn add_vector_spec(&mut self, name: VectorName, spec: VectorSpec) -> bool {
        self.vec_specs.insert(name, spec)
    }

    /// Returns the schema for a named vector, if registered.
    #[must_use]
    pub fn vector_spec(&self, name: &str) -> Option<&VectorSpec> {
        self.vec_specs.get(&name.to_string())
    }
}
