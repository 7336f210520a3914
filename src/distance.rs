//! Distance metrics: scalar reference kernels plus an 8-lane SIMD fast path.
//!
//! Three metrics are supported: `L2` (squared Euclidean, lower is closer),
//! `Dot` (inner product, higher is closer) and `Cosine` (inner product on
//! normalized vectors, higher is closer). The search layer applies a single
//! higher-is-better convention by negating `L2` distances.

use serde::{Deserialize, Serialize};
use wide::f32x8;

/// Distance metric used by a named vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance. Lower is closer.
    L2,
    /// Inner product. Higher is closer.
    Dot,
    /// Inner product on L2-normalized vectors. Higher is closer.
    Cosine,
}

impl DistanceMetric {
    /// Returns true when a higher raw metric value means "more similar".
    #[must_use]
    pub const fn higher_is_better(self) -> bool {
        !matches!(self, Self::L2)
    }

    /// Converts a raw metric value into the search layer's higher-is-better score.
    #[must_use]
    pub fn to_score(self, raw: f32) -> f32 {
        match self {
            Self::L2 => -raw,
            Self::Dot | Self::Cosine => raw,
        }
    }

    /// Computes the metric between `a` and `b` using the scalar reference kernel.
    ///
    /// # Panics
    ///
    /// Panics if `a.len() != b.len()`.
    #[must_use]
    pub fn scalar(self, a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(a.len(), b.len(), "vector dimensions must match");
        match self {
            Self::L2 => scalar_l2(a, b),
            Self::Dot => scalar_dot(a, b) as f32,
            Self::Cosine => scalar_cosine(a, b),
        }
    }

    /// Computes the metric between `a` and `b` using the SIMD fast path,
    /// falling back to the scalar tail for the remainder.
    ///
    /// # Panics
    ///
    /// Panics if `a.len() != b.len()`.
    #[must_use]
    pub fn simd(self, a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(a.len(), b.len(), "vector dimensions must match");
        match self {
            Self::L2 => simd_l2(a, b),
            Self::Dot => simd_dot(a, b),
            Self::Cosine => simd_cosine(a, b),
        }
    }

    /// Normalizes `v` in place to unit L2 norm; a no-op on the zero vector.
    ///
    /// Used for `Cosine` at both index-build time and query time so the
    /// metric can share the `Dot` inner-product kernel.
    pub fn normalize_if_cosine(self, v: &mut [f32]) {
        if self == Self::Cosine {
            normalize(v);
        }
    }
}

/// Normalizes `v` in place to unit L2 norm; a no-op on the zero vector.
pub fn normalize(v: &mut [f32]) {
    let norm = scalar_dot(v, v).sqrt();
    if norm > 0.0 {
        let inv = (1.0 / norm) as f32;
        for x in v.iter_mut() {
            *x *= inv;
        }
    }
}

/// f64 accumulation keeps rounding error bounded over long vectors; the
/// result is narrowed back to f32 only at the end.
fn scalar_dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

fn scalar_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum::<f64>() as f32
}

fn scalar_cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot = scalar_dot(a, b);
    let norm_a = scalar_dot(a, a).sqrt();
    let norm_b = scalar_dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f32
}

fn simd_dot(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 8;
    let mut acc = f32x8::ZERO;
    for i in 0..chunks {
        let va = f32x8::from(<[f32; 8]>::try_from(&a[i * 8..i * 8 + 8]).unwrap());
        let vb = f32x8::from(<[f32; 8]>::try_from(&b[i * 8..i * 8 + 8]).unwrap());
        acc += va * vb;
    }
    let mut sum = acc.reduce_add();
    let tail_start = chunks * 8;
    if tail_start < a.len() {
        sum += scalar_dot(&a[tail_start..], &b[tail_start..]) as f32;
    }
    sum
}

fn simd_l2(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 8;
    let mut acc = f32x8::ZERO;
    for i in 0..chunks {
        let va = f32x8::from(<[f32; 8]>::try_from(&a[i * 8..i * 8 + 8]).unwrap());
        let vb = f32x8::from(<[f32; 8]>::try_from(&b[i * 8..i * 8 + 8]).unwrap());
        let d = va - vb;
        acc += d * d;
    }
    let mut sum = acc.reduce_add();
    let tail_start = chunks * 8;
    if tail_start < a.len() {
        sum += scalar_l2(&a[tail_start..], &b[tail_start..]);
    }
    sum
}

fn simd_cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot = simd_dot(a, b);
    let norm_a = simd_dot(a, a).sqrt();
    let norm_b = simd_dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Abstraction over "compute a distance between two equal-length vectors",
/// so the native HNSW graph is agnostic to which metric/backend it scores with.
pub trait DistanceEngine: Send + Sync {
    /// Returns the raw metric value (not yet converted to a higher-is-better score).
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;
}

/// SIMD-backed distance engine for one metric, used inside a per-vector-name
/// HNSW index.
#[derive(Debug, Clone, Copy)]
pub struct MetricDistance(pub DistanceMetric);

impl DistanceEngine for MetricDistance {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        // HNSW graph construction/search always wants "lower is closer" internally;
        // L2 is natively so, Dot/Cosine are negated for the duration of the search
        // and the wrapper re-negates when converting to the public higher-is-better score.
        match self.0 {
            DistanceMetric::L2 => self.0.simd(a, b),
            DistanceMetric::Dot | DistanceMetric::Cosine => -self.0.simd(a, b),
        }
    }
}
