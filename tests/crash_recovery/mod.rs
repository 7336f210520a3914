//! Crash recovery test harness.
//!
//! This module provides automated crash recovery testing to prove that the
//! storage engine survives abrupt shutdowns without logical corruption.
//!
//! # Architecture
//!
//! The harness consists of:
//! - `driver`: deterministic test operations (insert, recover)
//! - `corruption`: controlled file mutation for fault injection
//! - `validator`: post-crash integrity verification

mod corruption;
mod driver;
mod validator;

pub use driver::{generate_vector, CrashTestDriver, DriverConfig};
pub use validator::{IntegrityReport, IntegrityValidator};

#[cfg(test)]
mod tests {
    use super::*;
    use stratumdb_core::distance::DistanceMetric;
    use stratumdb_core::point::PointId;
    use stratumdb_core::schema::{CollectionInfo, IndexSpec, VectorSpec};
    use stratumdb_core::Config;
    use tempfile::TempDir;

    fn info(dimension: usize) -> CollectionInfo {
        let mut info = CollectionInfo::new(
            "crash",
            IndexSpec { m_edges: 16, ef_construction: 100, ef_search: 50, index_threshold: 10_000, alpha: 1.0 },
        );
        info.add_vector_spec("default".to_string(), VectorSpec { dim: dimension, metric: DistanceMetric::Cosine });
        info
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.segment.pool_capacity = 10_000;
        config.segment.index_threshold = 10_000;
        config
    }

    /// Basic crash recovery test: insert, reopen, verify recovery.
    #[test]
    fn test_crash_recovery_insert_scenario() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let driver_config =
            DriverConfig { data_dir: temp.path().to_path_buf(), seed: 42, count: 1000, dimension: 128 };

        let driver = CrashTestDriver::new(driver_config);
        let inserted = driver.run_insert().expect("Insert failed");
        assert!(inserted > 0, "Should have inserted some data");

        let ids: Vec<PointId> = (0..inserted as u64).map(PointId::from).collect();
        let validator =
            IntegrityValidator::new(temp.path().join("crash"), info(128), config(), ids);
        let report = validator.validate().expect("Validation failed");

        assert!(report.is_valid, "Collection should be valid after recovery");
        assert_eq!(report.recovered_count, inserted, "Should have recovered every inserted point");
    }

    /// Test that a reopened collection recovers every previously inserted
    /// point and nothing more.
    #[test]
    fn test_partial_write_recovery() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let driver_config =
            DriverConfig { data_dir: temp.path().to_path_buf(), seed: 123, count: 500, dimension: 64 };

        let driver = CrashTestDriver::new(driver_config);
        let inserted = driver.run_insert().expect("Insert failed");

        let ids: Vec<PointId> = (0..inserted as u64).map(PointId::from).collect();
        let validator = IntegrityValidator::new(temp.path().join("crash"), info(64), config(), ids);
        let report = validator.validate().expect("Validation failed");

        assert!(report.is_valid);
        assert_eq!(report.recovered_count, inserted);
    }

    /// Repeated reopens must always recover the same set of points.
    #[test]
    fn test_repeated_reopen_recovery() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let driver_config =
            DriverConfig { data_dir: temp.path().to_path_buf(), seed: 456, count: 200, dimension: 32 };

        let driver = CrashTestDriver::new(driver_config);
        let inserted = driver.run_insert().expect("Insert failed");

        assert_eq!(driver.run_recover().expect("recover 1 failed"), inserted);
        assert_eq!(driver.run_recover().expect("recover 2 failed"), inserted);
    }
}
