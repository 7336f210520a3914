//! `CollectionContainer` (the name → collection registry) and the `DB` façade
//! that validates requests against a collection's schema before routing them.

use crate::collection::Collection;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::point::{PointId, Vector, VectorName, DEFAULT_VECTOR_NAME, MAX_NAMED_VECTORS};
use crate::query::QueryResult;
use crate::schema::{CollectionInfo, IndexSpec, VectorSpec};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// The name → `Collection` registry: a global lock over the map, plus a
/// per-collection RW lock admitting readers vs. a writer to that collection.
pub struct CollectionContainer {
    data_dir: PathBuf,
    config: Config,
    collections: RwLock<HashMap<String, Arc<RwLock<Collection>>>>,
}

impl CollectionContainer {
    /// Opens a container rooted at `config.storage.data_dir`, with no
    /// collections loaded yet (the DB façade discovers existing collections
    /// by directory scan at a higher level, if at all; this crate's scope
    /// ends at serving already-known collections).
    #[must_use]
    pub fn new(config: Config) -> Self {
        let data_dir = PathBuf::from(&config.storage.data_dir);
        Self {
            data_dir,
            config,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a new, empty collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionExists`] if `name` is already registered,
    /// or [`Error::Capacity`] if the container is at its configured limit.
    pub fn create_collection(&self, name: &str, info: CollectionInfo) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(Error::CollectionExists(name.to_string()));
        }
        if collections.len() >= self.config.limits.max_collections {
            return Err(Error::Capacity(format!(
                "collection limit ({}) reached",
                self.config.limits.max_collections
            )));
        }
        let dir = self.data_dir.join(name);
        let collection = Collection::create(dir, info, &self.config)?;
        collections.insert(name.to_string(), Arc::new(RwLock::new(collection)));
        Ok(())
    }

    /// Removes a collection and its on-disk state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if `name` is not registered.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.remove(name).is_none() {
            return Err(Error::CollectionNotFound(name.to_string()));
        }
        let dir = self.data_dir.join(name);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// Lists every registered collection's name and schema.
    #[must_use]
    pub fn list_collections(&self) -> Vec<(String, CollectionInfo)> {
        self.collections
            .read()
            .iter()
            .map(|(name, collection)| (name.clone(), collection.read().info().clone()))
            .collect()
    }

    /// Returns a handle to the named collection, if registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RwLock<Collection>>> {
        self.collections.read().get(name).cloned()
    }
}

/// Validated input for one upsert request: a point id, its named vectors,
/// and an optional JSON payload.
#[derive(Debug, Clone)]
pub struct UpsertPoint {
    /// The point's external identifier.
    pub id: PointId,
    /// One or more named vectors carried by this point.
    pub named_vectors: Vec<(VectorName, Vector)>,
    /// An optional JSON payload to store alongside the point.
    pub payload: Option<Value>,
}

/// The Rust-API equivalent of the out-of-scope HTTP surface (§6): schema
/// validation plus routing to the named collection, with no network layer.
pub struct DB {
    container: CollectionContainer,
}

impl DB {
    /// Opens (or creates) a database rooted at `config.storage.data_dir`.
    #[must_use]
    pub fn open(config: Config) -> Self {
        Self { container: CollectionContainer::new(config) }
    }

    /// Creates a collection with a single, default-named vector spec.
    ///
    /// # Errors
    ///
    /// See [`CollectionContainer::create_collection`].
    pub fn create_collection(&self, name: &str, dim: usize, metric: crate::distance::DistanceMetric) -> Result<()> {
        let index_spec = IndexSpec::from(self.container.config());
        let mut info = CollectionInfo::new(name, index_spec);
        info.add_vector_spec(DEFAULT_VECTOR_NAME.to_string(), VectorSpec { dim, metric });
        self.container.create_collection(name, info)
    }

    /// Creates a collection with an arbitrary set of named vector specs
    /// (at most [`MAX_NAMED_VECTORS`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TinyMapCapacityExceeded`] if `vector_specs` exceeds
    /// the named-vector bound, or whatever
    /// [`CollectionContainer::create_collection`] returns.
    pub fn create_collection_with_vectors(
        &self,
        name: &str,
        vector_specs: Vec<(VectorName, VectorSpec)>,
    ) -> Result<()> {
        if vector_specs.len() > MAX_NAMED_VECTORS {
            return Err(Error::TinyMapCapacityExceeded(MAX_NAMED_VECTORS));
        }
        let index_spec = IndexSpec::from(self.container.config());
        let mut info = CollectionInfo::new(name, index_spec);
        for (vector_name, spec) in vector_specs {
            if !info.add_vector_spec(vector_name, spec) {
                return Err(Error::TinyMapCapacityExceeded(MAX_NAMED_VECTORS));
            }
        }
        self.container.create_collection(name, info)
    }

    /// Deletes a collection.
    ///
    /// # Errors
    ///
    /// See [`CollectionContainer::delete_collection`].
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.container.delete_collection(name)
    }

    /// Lists every collection's name and schema.
    #[must_use]
    pub fn list_collections(&self) -> Vec<(String, CollectionInfo)> {
        self.container.list_collections()
    }

    /// Validates and inserts a batch of points into `collection_name`.
    ///
    /// Every point's named vectors are checked against the schema (name
    /// exists, dimension matches, named-vector count within bound) before
    /// any point in the batch is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if the collection is unknown,
    /// a schema error if any point fails validation, or
    /// [`Error::Capacity`] if `points.len()` exceeds the configured request
    /// limit.
    pub fn upsert(&self, collection_name: &str, points: Vec<UpsertPoint>) -> Result<()> {
        let max = self.container.config().limits.max_points_per_request;
        if points.len() > max {
            return Err(Error::Capacity(format!("request carries {} points, limit is {max}", points.len())));
        }

        let handle = self
            .container
            .get(collection_name)
            .ok_or_else(|| Error::CollectionNotFound(collection_name.to_string()))?;
        let collection = handle.write();

        for point in &points {
            if point.named_vectors.len() > MAX_NAMED_VECTORS {
                warn!(collection = collection_name, point = %point.id, "named vector count exceeds bound");
                return Err(Error::TinyMapCapacityExceeded(MAX_NAMED_VECTORS));
            }
            for (name, vector) in &point.named_vectors {
                let spec = collection.info().vector_spec(name).ok_or_else(|| {
                    warn!(collection = collection_name, vector_name = name, "unknown vector name in upsert");
                    Error::UnknownVectorName(name.clone())
                })?;
                if vector.len() != spec.dim {
                    warn!(
                        collection = collection_name,
                        vector_name = name,
                        expected = spec.dim,
                        actual = vector.len(),
                        "dimension mismatch in upsert"
                    );
                    return Err(Error::DimensionMismatch {
                        name: name.clone(),
                        expected: spec.dim,
                        actual: vector.len(),
                    });
                }
            }
        }

        for point in points {
            collection.insert_point_named(point.id, point.named_vectors, point.payload)?;
        }
        Ok(())
    }

    /// Validates and runs a top-k query against `collection_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if the collection is unknown.
    /// Schema errors surface inside the returned [`QueryResult::status`]
    /// rather than as an `Err`, matching [`crate::segment::SegmentHolder::search_top_k`].
    pub fn query(
        &self,
        collection_name: &str,
        using: Option<&str>,
        query_vectors: &[Vector],
        top_k: usize,
    ) -> Result<QueryResult> {
        let handle = self
            .container
            .get(collection_name)
            .ok_or_else(|| Error::CollectionNotFound(collection_name.to_string()))?;
        let collection = handle.read();
        let vector_name = using.unwrap_or(DEFAULT_VECTOR_NAME);
        Ok(collection.search_top_k(vector_name, query_vectors, top_k))
    }

    /// Full scan for payloads matching `field_name = value` in `collection_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if the collection is unknown, or
    /// an error from the payload store scan.
    pub fn filter_payloads(
        &self,
        collection_name: &str,
        field_name: &str,
        value: &Value,
    ) -> Result<Vec<(PointId, Value)>> {
        let handle = self
            .container
            .get(collection_name)
            .ok_or_else(|| Error::CollectionNotFound(collection_name.to_string()))?;
        let collection = handle.read();
        collection.filter_payloads(field_name, value)
    }
}

impl CollectionContainer {
    fn config(&self) -> &Config {
        &self.config
    }
}
