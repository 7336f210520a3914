//! The mutable write-path tier: a pool-backed, brute-force-searchable
//! landing zone for not-yet-indexed points.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::point::{Point, PointId, Vector, VectorName, DEFAULT_VECTOR_NAME};
use crate::pool::PointMemoryPool;
use crate::query::{QueryBatchResult, QueryResult, ScoredPoint};
use crate::schema::CollectionInfo;
use crate::segment::immutable::ImmutableSegment;
use parking_lot::Mutex;
use std::sync::Arc;

/// The mutable, not-yet-indexed tier of a collection's segment set.
///
/// A single mutex serializes insert and search within one segment: correctness
/// over the pool (no torn reads of a point mid-insert) matters more here than
/// read parallelism, which instead comes from fanning out across segments.
pub struct ActiveSegment {
    pool: PointMemoryPool,
    info: Arc<CollectionInfo>,
    max_capacity: usize,
    mutex: Mutex<()>,
}

impl ActiveSegment {
    /// Creates an empty segment with room for `max_capacity` points, scoped
    /// to the given collection schema.
    #[must_use]
    pub fn new(max_capacity: usize, info: Arc<CollectionInfo>) -> Self {
        Self {
            pool: PointMemoryPool::new(max_capacity),
            info,
            max_capacity,
            mutex: Mutex::new(()),
        }
    }

    /// Inserts a point with a single, unnamed vector under
    /// [`DEFAULT_VECTOR_NAME`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::SegmentFull`], [`Error::UnknownVectorName`], or
    /// [`Error::DimensionMismatch`].
    pub fn insert_point(&self, id: PointId, vector: Vector) -> Result<()> {
        self.insert_point_named(id, vec![(DEFAULT_VECTOR_NAME.to_string(), vector)])
    }

    /// Inserts a point with one or more named vectors, overwriting in place if
    /// `id` already names a live point in this segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SegmentFull`] if the pool has no free slots for a new
    /// point, [`Error::UnknownVectorName`]/[`Error::DimensionMismatch`] if a
    /// vector does not match the collection schema, or
    /// [`Error::TinyMapCapacityExceeded`] if too many distinct names are
    /// supplied. On any failure the point is not left allocated (an existing
    /// point with the same id, if any, is untouched).
    pub fn insert_point_named(
        &self,
        id: PointId,
        named_vectors: Vec<(VectorName, Vector)>,
    ) -> Result<()> {
        let _guard = self.mutex.lock();

        for (name, vector) in &named_vectors {
            let spec = self
                .info
                .vector_spec(name)
                .ok_or_else(|| Error::UnknownVectorName(name.clone()))?;
            if vector.len() != spec.dim {
                return Err(Error::DimensionMismatch {
                    name: name.clone(),
                    expected: spec.dim,
                    actual: vector.len(),
                });
            }
        }

        // An upsert overwrites in place: free the id's existing slot (if any)
        // before allocating, so the same id never occupies two slots at once.
        if let Some(existing) = self.pool.find_slot(&id) {
            self.pool.deallocate(existing);
        }

        let Some(slot) = self.pool.allocate(id) else {
            return Err(Error::SegmentFull(self.max_capacity));
        };

        for (name, mut vector) in named_vectors {
            let spec = *self.info.vector_spec(&name).expect("validated above");
            spec.metric.normalize_if_cosine(&mut vector);
            let added = self
                .pool
                .with_point(slot, |point| point.add_vector(name, vector))
                .unwrap_or(false);
            if !added {
                self.pool.deallocate(slot);
                return Err(Error::TinyMapCapacityExceeded(crate::point::MAX_NAMED_VECTORS));
            }
        }

        Ok(())
    }

    /// True once the segment holds enough points to warrant promotion.
    #[must_use]
    pub fn should_index(&self, index_threshold: usize) -> bool {
        self.point_count() >= index_threshold
    }

    /// True once the pool has no free slots left.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.point_count() >= self.max_capacity
    }

    /// Number of live points currently held.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.pool.total_allocated()
    }

    /// Returns the segment's fixed capacity.
    #[must_use]
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Best-effort membership check via a full scan of live points.
    #[must_use]
    pub fn contains_point(&self, id: &PointId) -> bool {
        let _guard = self.mutex.lock();
        self.pool.all_points().iter().any(|(_, point)| &point.id == id)
    }

    /// Snapshots every live point, builds a fresh [`ImmutableSegment`] from
    /// them, and clears the pool. Leaves the pool untouched on failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is empty, or if index construction fails.
    pub fn convert_to_immutable(&self) -> Result<ImmutableSegment> {
        let _guard = self.mutex.lock();

        let points = self.pool.all_points();
        if points.is_empty() {
            return Err(Error::Internal("no points to convert".to_string()));
        }

        let owned: Vec<Point> = points.into_iter().map(|(_, point)| point).collect();
        let segment = ImmutableSegment::build(&owned, &self.info)?;
        self.pool.clear();
        Ok(segment)
    }

    /// Brute-force top-k search over every live point carrying `vector_name`.
    ///
    /// Scores follow the higher-is-better convention (L2 distances are
    /// negated); ties are broken by ascending `PointId`.
    pub fn search_top_k(&self, vector_name: &str, queries: &[Vector], k: usize) -> QueryResult {
        let _guard = self.mutex.lock();
        let start = std::time::Instant::now();

        let Some(spec) = self.info.vector_spec(vector_name) else {
            let err = Error::UnknownVectorName(vector_name.to_string());
            return QueryResult::empty(queries.len(), Err(err));
        };
        let metric: DistanceMetric = spec.metric;
        let expected_dim = spec.dim;

        for query in queries {
            if query.len() != expected_dim {
                let err = Error::DimensionMismatch {
                    name: vector_name.to_string(),
                    expected: expected_dim,
                    actual: query.len(),
                };
                return QueryResult::empty(queries.len(), Err(err));
            }
        }

        let live_points = self.pool.all_points();
        let candidates: Vec<(&PointId, &Vector)> = live_points
            .iter()
            .filter_map(|(_, point)| point.get_vector(vector_name).map(|v| (&point.id, v)))
            .collect();

        let results = queries
            .iter()
            .map(|query| {
                let mut query = query.clone();
                metric.normalize_if_cosine(&mut query);
                let mut batch = QueryBatchResult {
                    hits: candidates
                        .iter()
                        .map(|(id, vec)| ScoredPoint {
                            point_id: (*id).clone(),
                            score: metric.to_score(metric.simd(&query, vec)),
                        })
                        .collect(),
                };
                batch.sort_and_truncate(k);
                batch
            })
            .collect();

        QueryResult {
            status: Ok(()),
            time_seconds: start.elapsed().as_secs_f64(),
            results,
        }
    }
}
