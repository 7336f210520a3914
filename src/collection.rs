//! Binds a collection's schema, segment set, payload store, and WAL together.

use crate::config::Config;
use crate::error::Result;
use crate::point::{PointId, Vector, VectorName, DEFAULT_VECTOR_NAME};
use crate::query::QueryResult;
use crate::schema::CollectionInfo;
use crate::segment::SegmentHolder;
use crate::storage::PayloadStore;
use crate::wal::{Wal, WalEntry, WalEntryKind};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// A named collection: schema, segment holder, payload store, and WAL bound
/// together under one root directory.
pub struct Collection {
    info: Arc<CollectionInfo>,
    holder: SegmentHolder,
    payload: PayloadStore,
    wal: Wal,
}

impl Collection {
    /// Creates a fresh collection rooted at `dir`, opening empty segment,
    /// payload, and WAL state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::error::Error::Io) if `dir` cannot be created.
    pub fn create(dir: PathBuf, info: CollectionInfo, config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Self::open(dir, info, config)
    }

    /// Opens a collection rooted at `dir`, replaying any unreplayed WAL
    /// entries into the segment holder.
    ///
    /// # Errors
    ///
    /// Returns an error if the WAL, payload store, or segment replay fails.
    pub fn open(dir: PathBuf, info: CollectionInfo, config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let info = Arc::new(info);
        let holder = SegmentHolder::new(info.clone(), config.segment.pool_capacity);
        let payload = PayloadStore::open(
            dir.join(format!("payload_{}", info.name)),
            config.payload.snapshot_threshold_bytes,
        )?;
        let wal = Wal::open(dir.join("wal.log"))?;

        for entry in wal.replay()? {
            if entry.collection_name != info.name {
                continue;
            }
            match entry.kind {
                WalEntryKind::Insert | WalEntryKind::Update => {
                    holder.insert_point_named(entry.point_id, entry.named_vectors)?;
                }
                WalEntryKind::Delete => {}
            }
        }

        Ok(Self { info, holder, payload, wal })
    }

    /// This collection's schema.
    #[must_use]
    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    /// Inserts a single, unnamed vector with an optional JSON payload.
    ///
    /// # Errors
    ///
    /// See [`Collection::insert_point_named`].
    pub fn insert_point(&self, id: PointId, vector: Vector, payload: Option<Value>) -> Result<()> {
        self.insert_point_named(id, vec![(DEFAULT_VECTOR_NAME.to_string(), vector)], payload)
    }

    /// Inserts a point, first appending a WAL entry, then writing into the
    /// segment holder, and finally (only on segment-holder success, and only
    /// if a payload was supplied) writing the payload store.
    ///
    /// A payload-store failure is surfaced to the caller but does not roll
    /// back the already-applied segment insert.
    ///
    /// # Errors
    ///
    /// Returns the first failure among the WAL append, segment insert, or
    /// (if present) payload write.
    pub fn insert_point_named(
        &self,
        id: PointId,
        named_vectors: Vec<(VectorName, Vector)>,
        payload: Option<Value>,
    ) -> Result<()> {
        self.wal.append(&WalEntry {
            kind: WalEntryKind::Insert,
            collection_name: self.info.name.clone(),
            point_id: id.clone(),
            named_vectors: named_vectors.clone(),
        })?;

        let segments_before = self.holder.immutable_segment_count();
        self.holder.insert_point_named(id.clone(), named_vectors)?;

        if self.holder.immutable_segment_count() > segments_before {
            self.wal.truncate(crate::config::WalTruncation::Full, 0)?;
        }

        if let Some(payload) = payload {
            self.payload.put(&id, &payload)?;
        }
        Ok(())
    }

    /// Fans a batch of queries out across this collection's segments.
    #[must_use]
    pub fn search_top_k(&self, vector_name: &str, queries: &[Vector], k: usize) -> QueryResult {
        self.holder.search_top_k(vector_name, queries, k)
    }

    /// Returns the payload stored for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload store read fails.
    pub fn get_payload(&self, id: &PointId) -> Result<Option<Value>> {
        self.payload.get(id)
    }

    /// Full scan for payloads whose `field_name` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload store scan fails.
    pub fn filter_payloads(&self, field_name: &str, value: &Value) -> Result<Vec<(PointId, Value)>> {
        self.payload.filter(field_name, value)
    }

    /// Best-effort existence check across all segments.
    #[must_use]
    pub fn point_exists(&self, id: &PointId) -> bool {
        self.holder.point_exists(id)
    }
}
