//! Query result aggregation shared by segments, the segment holder, and the
//! DB façade.

use crate::error::Error;
use crate::point::PointId;

/// One scored hit: a point id and its higher-is-better score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    /// The matched point's id.
    pub point_id: PointId,
    /// Higher-is-better score (L2 distances are pre-negated).
    pub score: f32,
}

/// The ordered hit list for one input query vector.
#[derive(Debug, Clone, Default)]
pub struct QueryBatchResult {
    /// Hits, best first, length at most the requested `k`.
    pub hits: Vec<ScoredPoint>,
}

impl QueryBatchResult {
    /// Sorts `hits` best-first (`score` descending, `point_id` ascending on
    /// ties) and truncates to `k`.
    pub fn sort_and_truncate(&mut self, k: usize) {
        self.hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.point_id.cmp(&b.point_id))
        });
        self.hits.truncate(k);
    }

    /// Merges another batch's hits into this one, re-sorting and truncating
    /// to `k`. Duplicate point ids keep the higher of the two scores.
    pub fn merge(&mut self, other: Self, k: usize) {
        for hit in other.hits {
            if let Some(existing) = self.hits.iter_mut().find(|h| h.point_id == hit.point_id) {
                if hit.score > existing.score {
                    existing.score = hit.score;
                }
            } else {
                self.hits.push(hit);
            }
        }
        self.sort_and_truncate(k);
    }
}

/// The result of a top-k search, possibly spanning several input queries.
#[derive(Debug)]
pub struct QueryResult {
    /// `Ok(())`, or the first error encountered while searching.
    pub status: Result<(), Error>,
    /// Wall-clock query duration.
    pub time_seconds: f64,
    /// One batch result per input query vector, in order.
    pub results: Vec<QueryBatchResult>,
}

impl Default for QueryResult {
    fn default() -> Self {
        Self {
            status: Ok(()),
            time_seconds: 0.0,
            results: Vec::new(),
        }
    }
}

impl QueryResult {
    /// Builds an all-empty result of the given query count, useful as the
    /// zero value before a schema error short-circuits search.
    #[must_use]
    pub fn empty(query_count: usize, status: Result<(), Error>) -> Self {
        Self {
            status,
            time_seconds: 0.0,
            results: (0..query_count).map(|_| QueryBatchResult::default()).collect(),
        }
    }
}
