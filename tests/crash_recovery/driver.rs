//! Deterministic test driver for crash recovery testing.
//!
//! This module provides a driver that performs deterministic operations on a
//! collection, enabling reproducible crash recovery tests.

use std::path::PathBuf;
use stratumdb_core::distance::DistanceMetric;
use stratumdb_core::point::PointId;
use stratumdb_core::schema::{CollectionInfo, IndexSpec, VectorSpec};
use stratumdb_core::{Collection, Config, Result};

/// Configuration for the crash test driver.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Directory for test data.
    pub data_dir: PathBuf,
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Number of operations to perform.
    pub count: usize,
    /// Vector dimension.
    pub dimension: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("./crash_test_data"), seed: 42, count: 1000, dimension: 128 }
    }
}

/// Crash test driver for deterministic operations.
pub struct CrashTestDriver {
    config: DriverConfig,
}

impl CrashTestDriver {
    /// Creates a new crash test driver with the given configuration.
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Logs reproduction information for debugging.
    pub fn log_reproduction_info(&self) {
        eprintln!("=== REPRODUCTION INFO ===");
        eprintln!("Seed: {}", self.config.seed);
        eprintln!("Count: {}", self.config.count);
        eprintln!("Dimension: {}", self.config.dimension);
        eprintln!("Data dir: {}", self.config.data_dir.display());
        eprintln!("=========================");
    }

    /// Schema used by every run: a single `"default"` vector under cosine
    /// distance, with promotion disabled so recovery only ever depends on
    /// the WAL.
    fn info(&self) -> CollectionInfo {
        let spec = IndexSpec {
            m_edges: 16,
            ef_construction: 100,
            ef_search: 50,
            index_threshold: self.config.count.max(1) * 10,
            alpha: 1.0,
        };
        let mut info = CollectionInfo::new("crash", spec);
        info.add_vector_spec(
            "default".to_string(),
            VectorSpec { dim: self.config.dimension, metric: DistanceMetric::Cosine },
        );
        info
    }

    fn engine_config(&self) -> Config {
        let mut config = Config::default();
        config.segment.pool_capacity = self.config.count.max(1) * 10;
        config.segment.index_threshold = config.segment.pool_capacity;
        config
    }

    fn collection_dir(&self) -> PathBuf {
        self.config.data_dir.join("crash")
    }

    /// Runs insert operations with deterministic data.
    ///
    /// Returns the number of successfully inserted vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if collection operations fail.
    pub fn run_insert(&self) -> Result<usize> {
        self.log_reproduction_info();

        let collection = Collection::open(self.collection_dir(), self.info(), &self.engine_config())?;

        let mut inserted = 0;
        for i in 0..self.config.count as u64 {
            let vector = generate_vector(self.config.dimension, self.config.seed.wrapping_add(i));
            let payload = serde_json::json!({
                "id": i,
                "seed": self.config.seed,
                "checksum": compute_checksum(&vector),
            });
            collection.insert_point(PointId::from(i), vector, Some(payload))?;
            inserted += 1;
        }

        eprintln!("Completed: {inserted} vectors inserted");
        Ok(inserted)
    }

    /// Reopens the collection, replaying its WAL, and returns how many of
    /// the originally inserted ids are present afterward.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection fails to open.
    pub fn run_recover(&self) -> Result<usize> {
        let collection = Collection::open(self.collection_dir(), self.info(), &self.engine_config())?;
        let present =
            (0..self.config.count as u64).filter(|&i| collection.point_exists(&PointId::from(i))).count();
        eprintln!("Recovered: {present}/{} vectors present", self.config.count);
        Ok(present)
    }

    /// Path to this run's WAL file, for tests that corrupt it directly.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.collection_dir().join("wal.log")
    }
}

/// Deterministic xorshift-style vector generator, in the same style the
/// stress tests use, so crash-recovery runs are reproducible from a seed
/// without pulling in a dedicated RNG crate.
#[allow(clippy::cast_precision_loss)]
pub fn generate_vector(dimension: usize, seed: u64) -> Vec<f32> {
    let mut v = Vec::with_capacity(dimension);
    let mut x = seed;
    for _ in 0..dimension {
        x = x.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        v.push((x as f32 / u64::MAX as f32) * 2.0 - 1.0);
    }
    v
}

/// Computes a simple checksum for a vector.
#[allow(clippy::cast_precision_loss)]
pub fn compute_checksum(vector: &[f32]) -> u64 {
    let mut sum: f64 = 0.0;
    for (i, &v) in vector.iter().enumerate() {
        sum += f64::from(v) * (i as f64 + 1.0);
    }
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let checksum = (sum.abs() * 1_000_000.0) as u64;
    checksum
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_driver_insert() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let config =
            DriverConfig { data_dir: temp.path().to_path_buf(), seed: 42, count: 100, dimension: 64 };

        let driver = CrashTestDriver::new(config);

        let inserted = driver.run_insert().expect("Insert failed");
        assert_eq!(inserted, 100);

        let present = driver.run_recover().expect("Recover failed");
        assert_eq!(present, 100);
    }

    #[test]
    fn test_driver_deterministic() {
        let temp1 = TempDir::new().expect("Failed to create temp dir");
        let temp2 = TempDir::new().expect("Failed to create temp dir");

        let config1 =
            DriverConfig { data_dir: temp1.path().to_path_buf(), seed: 12345, count: 50, dimension: 32 };
        let config2 =
            DriverConfig { data_dir: temp2.path().to_path_buf(), seed: 12345, count: 50, dimension: 32 };

        let driver1 = CrashTestDriver::new(config1);
        let driver2 = CrashTestDriver::new(config2);

        let inserted1 = driver1.run_insert().expect("Insert 1 failed");
        let inserted2 = driver2.run_insert().expect("Insert 2 failed");

        assert_eq!(inserted1, inserted2);
        assert_eq!(driver1.run_recover().unwrap(), driver2.run_recover().unwrap());
    }
}
