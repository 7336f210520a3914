//! Approximate nearest-neighbor indexing.

pub mod hnsw;
