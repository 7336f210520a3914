//! Error types for the storage-and-indexing engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the engine.
///
/// Each variant carries a short machine-readable code (`STRATUM-XXX`) alongside
/// a human-readable message.
#[derive(Error, Debug)]
pub enum Error {
    /// Collection already exists (STRATUM-001).
    #[error("[STRATUM-001] Collection '{0}' already exists")]
    CollectionExists(String),

    /// Collection not found (STRATUM-002).
    #[error("[STRATUM-002] Collection '{0}' not found")]
    CollectionNotFound(String),

    /// Point not found (STRATUM-003).
    #[error("[STRATUM-003] Point '{0}' not found")]
    PointNotFound(String),

    /// Vector dimension mismatch (STRATUM-004).
    #[error("[STRATUM-004] Vector dimension mismatch for '{name}': expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Vector name.
        name: String,
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Vector name is not part of the collection schema (STRATUM-005).
    #[error("[STRATUM-005] Unknown vector name '{0}' for this collection")]
    UnknownVectorName(String),

    /// Too many named vectors on a single point, or too many named vectors in a schema (STRATUM-006).
    #[error("[STRATUM-006] TinyMap capacity ({0}) exceeded")]
    TinyMapCapacityExceeded(usize),

    /// The active segment's pool has no free slots (STRATUM-007).
    #[error("[STRATUM-007] Segment is full (capacity {0})")]
    SegmentFull(usize),

    /// Storage/IO failure (STRATUM-008).
    #[error("[STRATUM-008] Storage error: {0}")]
    Storage(String),

    /// HNSW index failure (STRATUM-009).
    #[error("[STRATUM-009] Index error: {0}")]
    Index(String),

    /// On-disk segment or WAL data failed integrity checks (STRATUM-010).
    #[error("[STRATUM-010] Corrupt data: {0}")]
    Corrupt(String),

    /// Configuration error (STRATUM-011).
    #[error("[STRATUM-011] Configuration error: {0}")]
    Config(String),

    /// IO error (STRATUM-012).
    #[error("[STRATUM-012] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error (STRATUM-013).
    #[error("[STRATUM-013] Serialization error: {0}")]
    Serialization(String),

    /// Internal invariant violation (STRATUM-014).
    #[error("[STRATUM-014] Internal error: {0}")]
    Internal(String),

    /// Request payload failed schema validation (STRATUM-015).
    #[error("[STRATUM-015] Schema validation error: {0}")]
    SchemaValidation(String),

    /// Too many collections, too many points per request, etc (STRATUM-016).
    #[error("[STRATUM-016] Capacity limit exceeded: {0}")]
    Capacity(String),
}

impl Error {
    /// Returns the error code (e.g., `"STRATUM-001"`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CollectionExists(_) => "STRATUM-001",
            Self::CollectionNotFound(_) => "STRATUM-002",
            Self::PointNotFound(_) => "STRATUM-003",
            Self::DimensionMismatch { .. } => "STRATUM-004",
            Self::UnknownVectorName(_) => "STRATUM-005",
            Self::TinyMapCapacityExceeded(_) => "STRATUM-006",
            Self::SegmentFull(_) => "STRATUM-007",
            Self::Storage(_) => "STRATUM-008",
            Self::Index(_) => "STRATUM-009",
            Self::Corrupt(_) => "STRATUM-010",
            Self::Config(_) => "STRATUM-011",
            Self::Io(_) => "STRATUM-012",
            Self::Serialization(_) => "STRATUM-013",
            Self::Internal(_) => "STRATUM-014",
            Self::SchemaValidation(_) => "STRATUM-015",
            Self::Capacity(_) => "STRATUM-016",
        }
    }

    /// Returns true if a client could plausibly retry after fixing their input.
    ///
    /// Corruption and internal errors are not recoverable by the caller.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Corrupt(_) | Self::Internal(_))
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
