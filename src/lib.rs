//! # `StratumDB` Core
//!
//! Storage-and-indexing engine for an in-process vector database: a tiered
//! segment lifecycle (mutable `ActiveSegment` → HNSW-indexed
//! `ImmutableSegment`), a slab-allocated point pool, a durable payload store,
//! and a crash-safe WAL, bound together by a `Collection`/`DB` façade.
//!
//! This crate has no network layer; the out-of-scope HTTP surface a server
//! would expose maps directly onto [`DB`]'s methods.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stratumdb_core::{Config, DistanceMetric, DB};
//! use stratumdb_core::db::UpsertPoint;
//! use stratumdb_core::point::PointId;
//!
//! let db = DB::open(Config::default());
//! db.create_collection("documents", 768, DistanceMetric::Cosine)?;
//!
//! db.upsert("documents", vec![UpsertPoint {
//!     id: PointId::from(1u64),
//!     named_vectors: vec![("default".to_string(), vec![0.1, 0.2 /* .. */])],
//!     payload: Some(serde_json::json!({"title": "Hello World"})),
//! }])?;
//!
//! let results = db.query("documents", None, &[vec![0.1, 0.2 /* .. */]], 10)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collection;
pub mod config;
pub mod db;
pub mod distance;
pub mod error;
pub mod index;
pub mod point;
pub mod pool;
pub mod query;
pub mod schema;
pub mod segment;
pub mod storage;
pub mod wal;

pub use collection::Collection;
pub use config::Config;
pub use db::{CollectionContainer, DB};
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use point::{Point, PointId};
