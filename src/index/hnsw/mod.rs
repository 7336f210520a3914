//! Native HNSW (Hierarchical Navigable Small World) graph index.
//!
//! One [`native::NativeHnsw`] is built per named vector within an
//! [`crate::segment::immutable::ImmutableSegment`] at promotion time; its node
//! ids are positions into the segment's `PointId[]` array.

pub mod native;

pub use native::{HnswSnapshot, NativeHnsw, NodeId};
