//! Configuration for the storage-and-indexing engine.
//!
//! Provides layered configuration: compiled-in defaults, an optional TOML file,
//! environment variables, and explicit runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (passed to `DB::open`)
//! 2. Environment variables (`STRATUMDB_*`)
//! 3. Configuration file (`stratumdb.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration from its sources.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A configuration value failed validation.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// `PointMemoryPool` / `ActiveSegment` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Capacity of a single `PointMemoryPool` (`MAX_MEMORYPOOL_POINTS`).
    pub pool_capacity: usize,
    /// Point count at which `ActiveSegment::should_index()` becomes true.
    pub index_threshold: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 10_000,
            index_threshold: 10_000,
        }
    }
}

/// HNSW index configuration section (`IndexSpec` in the component design).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Number of bidirectional edges per node (M parameter).
    pub m_edges: usize,
    /// Candidate pool size used during index construction.
    pub ef_construction: usize,
    /// Candidate pool size used at query time.
    pub ef_search: usize,
    /// VAMANA-style diversification parameter (1.0 = standard HNSW).
    pub alpha: f32,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m_edges: 16,
            ef_construction: 128,
            ef_search: 64,
            alpha: 1.0,
        }
    }
}

/// Limits configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum named vectors per point / per collection schema (the `TinyMap` bound).
    pub max_entries_tinymap: usize,
    /// Maximum points accepted in a single upsert call.
    pub max_points_per_request: usize,
    /// Maximum size of a single JSON request body, in bytes.
    pub max_json_request_size: usize,
    /// Maximum number of collections a single `CollectionContainer` will hold.
    pub max_collections: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_entries_tinymap: 8,
            max_points_per_request: 1000,
            max_json_request_size: 32 * 1024 * 1024,
            max_collections: 1000,
        }
    }
}

/// Payload store configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Size of the block cache in bytes (0 disables the cache).
    pub cache_bytes: usize,
    /// WAL bytes written since the last snapshot that trigger a new one.
    pub snapshot_threshold_bytes: u64,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            cache_bytes: 128 * 1024 * 1024,
            snapshot_threshold_bytes: 10 * 1024 * 1024,
        }
    }
}

/// WAL truncation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalTruncation {
    /// Discard the promoted portion of the log after a successful promotion.
    Full,
    /// Retain the most recent N entries regardless of promotion, for debugging.
    KeepLastN,
}

impl Default for WalTruncation {
    fn default() -> Self {
        Self::Full
    }
}

/// WAL configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Truncation policy applied after a successful promotion.
    pub truncation: WalTruncation,
    /// Entries retained under `KeepLastN`.
    pub keep_last_n: usize,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            truncation: WalTruncation::Full,
            keep_last_n: 10_000,
        }
    }
}

/// Storage paths configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root data directory under which collections are stored.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./VectorDB".to_string(),
        }
    }
}

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Segment sizing.
    pub segment: SegmentConfig,
    /// HNSW build/search parameters.
    pub hnsw: HnswConfig,
    /// Capacity limits.
    pub limits: LimitsConfig,
    /// Payload store settings.
    pub payload: PayloadConfig,
    /// WAL settings.
    pub wal: WalConfig,
    /// Storage paths.
    pub storage: StorageConfig,
}

impl Config {
    /// Loads configuration from the default path (`stratumdb.toml`, if present)
    /// merged with environment variables and compiled-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but fails to parse, or if the
    /// resulting configuration fails validation.
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from_path("stratumdb.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file fails to parse, or if the resulting
    /// configuration fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("STRATUMDB_").split("_").lowercase(false));

        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, rejecting values that would make the
    /// engine misbehave rather than deferring the failure to first use.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field found.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.limits.max_entries_tinymap == 0 || self.limits.max_entries_tinymap > 8 {
            return Err(ConfigError::InvalidValue {
                key: "limits.max_entries_tinymap".to_string(),
                message: "must be in [1, 8]".to_string(),
            });
        }
        if self.segment.pool_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "segment.pool_capacity".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if self.segment.index_threshold > self.segment.pool_capacity {
            return Err(ConfigError::InvalidValue {
                key: "segment.index_threshold".to_string(),
                message: "must not exceed segment.pool_capacity".to_string(),
            });
        }
        if self.hnsw.m_edges == 0 {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.m_edges".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if self.hnsw.ef_search == 0 {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.ef_search".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}
