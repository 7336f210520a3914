//! Custom HNSW implementation: hierarchical layers, VAMANA-style neighbor
//! diversification, and a pluggable [`crate::distance::DistanceEngine`].
//!
//! # References
//!
//! - Paper: "Efficient and robust approximate nearest neighbor search
//!   using Hierarchical Navigable Small World graphs" (Malkov & Yashunin, 2016)

mod graph;
mod layer;
mod ordered_float;

pub use graph::{HnswSnapshot, NativeHnsw};
pub use layer::NodeId;

#[cfg(test)]
mod tests;
