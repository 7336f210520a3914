//! Owns a collection's segment set and coordinates the write → promote →
//! read lifecycle.

use crate::error::{Error, Result};
use crate::point::{PointId, Vector, VectorName, DEFAULT_VECTOR_NAME};
use crate::query::{QueryBatchResult, QueryResult};
use crate::schema::CollectionInfo;
use crate::segment::{ActiveSegment, ImmutableSegment};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Coordinates one collection's `ActiveSegment` plus its accumulated
/// `ImmutableSegment`s, handling promotion under a dedicated lifecycle lock
/// distinct from any single segment's own mutex.
pub struct SegmentHolder {
    info: Arc<CollectionInfo>,
    active: RwLock<Arc<ActiveSegment>>,
    immutable: RwLock<Vec<Arc<ImmutableSegment>>>,
    lifecycle: Mutex<()>,
    segment_capacity: usize,
}

impl SegmentHolder {
    /// Creates a holder with a single, empty `ActiveSegment`.
    #[must_use]
    pub fn new(info: Arc<CollectionInfo>, segment_capacity: usize) -> Self {
        let active = ActiveSegment::new(segment_capacity, info.clone());
        Self {
            info,
            active: RwLock::new(Arc::new(active)),
            immutable: RwLock::new(Vec::new()),
            lifecycle: Mutex::new(()),
            segment_capacity,
        }
    }

    /// Inserts a single, unnamed vector under [`DEFAULT_VECTOR_NAME`].
    ///
    /// # Errors
    ///
    /// See [`SegmentHolder::insert_point_named`].
    pub fn insert_point(&self, id: PointId, vector: Vector) -> Result<()> {
        self.insert_point_named(id, vec![(DEFAULT_VECTOR_NAME.to_string(), vector)])
    }

    /// Inserts a point into the current `ActiveSegment`, triggering promotion
    /// if it has become eligible.
    ///
    /// Upserts overwrite in place: `ActiveSegment::insert_point_named` already
    /// handles a same-segment id collision, so this only needs to tombstone a
    /// stale copy sitting in an already-frozen `ImmutableSegment` before the
    /// fresh write lands in the active one — otherwise the id would briefly
    /// exist twice (once frozen, once live) until the active segment's own
    /// promotion retires the older copy's segment, which never happens while
    /// that segment is still reachable.
    ///
    /// # Errors
    ///
    /// Returns whatever [`ActiveSegment::insert_point_named`] returns, or a
    /// promotion failure if the segment was full and promotion failed.
    pub fn insert_point_named(
        &self,
        id: PointId,
        named_vectors: Vec<(VectorName, Vector)>,
    ) -> Result<()> {
        for segment in self.immutable.read().iter() {
            if segment.contains_point(&id) {
                segment.tombstone(&id);
            }
        }

        let current = self.active.read().clone();
        current.insert_point_named(id, named_vectors)?;

        if current.should_index(self.info.index_spec.index_threshold) || current.is_full() {
            self.promote()?;
        }
        Ok(())
    }

    /// Freezes the current `ActiveSegment` into an `ImmutableSegment` and
    /// installs a fresh one in its place. A no-op if another thread already
    /// promoted past the eligibility check under the lifecycle lock.
    fn promote(&self) -> Result<()> {
        let _guard = self.lifecycle.lock();

        let current = self.active.read().clone();
        let threshold = self.info.index_spec.index_threshold;
        if !current.should_index(threshold) && !current.is_full() {
            return Ok(());
        }

        debug!(collection = %self.info.name, points = current.point_count(), "promoting active segment");
        let promoted = current.convert_to_immutable()?;
        let fresh = ActiveSegment::new(self.segment_capacity, self.info.clone());

        self.immutable.write().push(Arc::new(promoted));
        *self.active.write() = Arc::new(fresh);
        info!(collection = %self.info.name, segment_count = self.immutable.read().len(), "segment promoted");
        Ok(())
    }

    /// Fans a batch of queries out across the active segment and every
    /// immutable segment, merging into one `(score desc, point_id asc)`
    /// top-k list per input query.
    ///
    /// Schema errors (unknown vector name, wrong dimension) are detected once
    /// up front and short-circuit the whole call before any segment is
    /// touched.
    #[must_use]
    pub fn search_top_k(&self, vector_name: &str, queries: &[Vector], k: usize) -> QueryResult {
        let start = Instant::now();

        let Some(spec) = self.info.vector_spec(vector_name) else {
            let err = Error::UnknownVectorName(vector_name.to_string());
            return QueryResult::empty(queries.len(), Err(err));
        };
        for query in queries {
            if query.len() != spec.dim {
                let err = Error::DimensionMismatch {
                    name: vector_name.to_string(),
                    expected: spec.dim,
                    actual: query.len(),
                };
                return QueryResult::empty(queries.len(), Err(err));
            }
        }

        let active = self.active.read().clone();
        let immutable = self.immutable.read().clone();

        let mut merged: Vec<QueryBatchResult> = (0..queries.len())
            .map(|_| QueryBatchResult::default())
            .collect();
        let mut status = Ok(());

        let active_result = active.search_top_k(vector_name, queries, k);
        if status.is_ok() && active_result.status.is_err() {
            status = active_result.status;
        }
        for (batch, slot) in active_result.results.into_iter().zip(merged.iter_mut()) {
            slot.merge(batch, k);
        }

        // Each immutable segment's fan-out runs on its own thread; per-query
        // merging happens sequentially afterward so the result is independent
        // of scheduling order (ties are still broken by point_id).
        let per_segment: Vec<Vec<Result<QueryBatchResult>>> = immutable
            .par_iter()
            .map(|segment| {
                queries
                    .iter()
                    .map(|query| segment.search(vector_name, query, k))
                    .collect()
            })
            .collect();

        for segment_results in per_segment {
            for (result, slot) in segment_results.into_iter().zip(merged.iter_mut()) {
                match result {
                    Ok(batch) => slot.merge(batch, k),
                    Err(e) => {
                        if status.is_ok() {
                            status = Err(e);
                        }
                    }
                }
            }
        }

        QueryResult {
            status,
            time_seconds: start.elapsed().as_secs_f64(),
            results: merged,
        }
    }

    /// Best-effort existence check across the active segment and every
    /// immutable segment.
    #[must_use]
    pub fn point_exists(&self, id: &PointId) -> bool {
        if self.active.read().contains_point(id) {
            return true;
        }
        self.immutable.read().iter().any(|seg| seg.contains_point(id))
    }

    /// Number of frozen immutable segments accumulated so far.
    #[must_use]
    pub fn immutable_segment_count(&self) -> usize {
        self.immutable.read().len()
    }
}
