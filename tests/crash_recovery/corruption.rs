//! Corruption tests for on-disk storage.
//!
//! These tests verify that corrupted files are handled gracefully, returning
//! explicit errors instead of panicking or entering undefined behavior.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use stratumdb_core::distance::DistanceMetric;
use stratumdb_core::point::PointId;
use stratumdb_core::schema::{CollectionInfo, IndexSpec, VectorSpec};
use stratumdb_core::{Collection, Config};
use tempfile::TempDir;

/// File mutator for controlled corruption testing.
///
/// Provides deterministic corruption operations using a seed for reproducibility.
pub struct FileMutator {
    path: PathBuf,
    seed: u64,
}

impl FileMutator {
    /// Creates a new file mutator for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, seed: u64) -> Self {
        Self { path: path.into(), seed }
    }

    /// Truncates file to given percentage of original size.
    ///
    /// # Errors
    ///
    /// Returns an error if file operations fail.
    pub fn truncate_to_percent(&self, percent: f64) -> std::io::Result<u64> {
        let metadata = std::fs::metadata(&self.path)?;
        let original_size = metadata.len();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let new_size = (original_size as f64 * percent / 100.0) as u64;

        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(new_size)?;

        Ok(new_size)
    }

    /// Flips random bits in file at given offset range.
    ///
    /// # Errors
    ///
    /// Returns an error if file operations fail.
    pub fn bitflip_at(&self, offset: u64, count: usize) -> std::io::Result<()> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; count];
        file.read_exact(&mut buffer)?;

        for byte in &mut buffer {
            let bit_pos = rng.gen_range(0..8);
            *byte ^= 1 << bit_pos;
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&buffer)?;
        file.sync_all()?;

        Ok(())
    }

    /// Flips bits in header (first N bytes).
    ///
    /// # Errors
    ///
    /// Returns an error if file operations fail.
    pub fn corrupt_header(&self, header_size: usize) -> std::io::Result<()> {
        self.bitflip_at(0, header_size.min(16))
    }

    /// Overwrites file with zeros at given offset.
    ///
    /// # Errors
    ///
    /// Returns an error if file operations fail.
    #[allow(dead_code)]
    pub fn zero_out(&self, offset: u64, count: usize) -> std::io::Result<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        file.seek(SeekFrom::Start(offset))?;
        let zeros = vec![0u8; count];
        file.write_all(&zeros)?;
        file.sync_all()?;

        Ok(())
    }
}

fn info(dimension: usize) -> CollectionInfo {
    let mut info = CollectionInfo::new(
        "crash",
        IndexSpec { m_edges: 16, ef_construction: 100, ef_search: 50, index_threshold: 100_000, alpha: 1.0 },
    );
    info.add_vector_spec("default".to_string(), VectorSpec { dim: dimension, metric: DistanceMetric::Cosine });
    info
}

fn engine_config() -> Config {
    let mut config = Config::default();
    config.segment.pool_capacity = 100_000;
    config.segment.index_threshold = 100_000;
    config
}

/// Helper to create a test collection with data, rooted at `dir/crash`.
fn create_test_collection(dir: &Path, count: usize, dimension: usize) -> Collection {
    let collection = Collection::create(dir.join("crash"), info(dimension), &engine_config()).unwrap();

    for i in 0..count as u64 {
        #[allow(clippy::cast_precision_loss)]
        let vector: Vec<f32> =
            (0..dimension).map(|j| ((i as usize * dimension + j) % 1000) as f32 / 1000.0).collect();
        let payload = serde_json::json!({"id": i, "test": true});
        collection.insert_point(PointId::from(i), vector, Some(payload)).unwrap();
    }

    collection
}

// =============================================================================
// WAL truncation tests
// =============================================================================

#[test]
fn test_truncation_50_percent_wal() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let collection = create_test_collection(temp.path(), 100, 64);
    drop(collection);

    let wal_file = temp.path().join("crash").join("wal.log");
    let mutator = FileMutator::new(&wal_file, 42);
    let new_size = mutator.truncate_to_percent(50.0).expect("Truncate failed");
    eprintln!("Truncated wal.log to {new_size} bytes");

    // A truncated tail frame is silently dropped by replay, never a hard
    // error, so reopening must always succeed with a partial point count.
    let result = Collection::open(temp.path().join("crash"), info(64), &engine_config());
    let reopened = result.expect("reopen must tolerate a truncated wal tail");
    let present = (0..100u64).filter(|i| reopened.point_exists(&PointId::from(*i))).count();
    assert!(present < 100, "should have fewer points after truncation, got {present}");
}

#[test]
fn test_truncation_to_zero() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let collection = create_test_collection(temp.path(), 50, 32);
    drop(collection);

    let wal_file = temp.path().join("crash").join("wal.log");
    let mutator = FileMutator::new(&wal_file, 42);
    mutator.truncate_to_percent(0.0).expect("Truncate failed");

    let result = Collection::open(temp.path().join("crash"), info(32), &engine_config());
    let reopened = result.expect("reopen of an empty wal must succeed with an empty collection");
    assert!(!reopened.point_exists(&PointId::from(0u64)));
}

// =============================================================================
// WAL bitflip tests
// =============================================================================

#[test]
fn test_bitflip_in_complete_wal_frame() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let collection = create_test_collection(temp.path(), 50, 64);
    drop(collection);

    let wal_file = temp.path().join("crash").join("wal.log");
    let mutator = FileMutator::new(&wal_file, 42);
    // Corrupt a byte well inside the file so it lands inside a complete,
    // checksummed frame rather than the truncated tail.
    mutator.bitflip_at(4, 8).expect("Corrupt failed");

    let result = Collection::open(temp.path().join("crash"), info(64), &engine_config());
    match result {
        Ok(_) => panic!("a corrupted complete frame must be reported, not silently accepted"),
        Err(e) => {
            let msg = e.to_string();
            eprintln!("Got expected error: {msg}");
            assert!(!msg.contains("panic") && !msg.contains("unwrap"), "error should be graceful: {msg}");
        }
    }
}

// =============================================================================
// Payload-log corruption tests
// =============================================================================

#[test]
fn test_truncation_payloads_log() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let collection = create_test_collection(temp.path(), 100, 64);
    drop(collection);

    let payloads_file = temp.path().join("crash").join("payload_crash").join("payloads.log");
    assert!(payloads_file.exists(), "payloads.log should exist after inserts with payloads");

    let mutator = FileMutator::new(&payloads_file, 42);
    let new_size = mutator.truncate_to_percent(50.0).expect("Truncate failed");
    eprintln!("Truncated payloads.log to {new_size} bytes");

    let result = Collection::open(temp.path().join("crash"), info(64), &engine_config());
    match result {
        Ok(coll) => {
            // Points themselves still recover from the WAL; only some
            // payloads may now be missing or fail to parse on lookup.
            let present = (0..100u64).filter(|i| coll.point_exists(&PointId::from(*i))).count();
            assert_eq!(present, 100, "vector recovery does not depend on the payload log");
        }
        Err(e) => {
            let msg = e.to_string();
            eprintln!("Got expected error: {msg}");
            assert!(!msg.contains("panic"), "error should be graceful, not a panic: {msg}");
        }
    }
}

#[test]
fn test_bitflip_in_payload_log() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let collection = create_test_collection(temp.path(), 50, 32);
    drop(collection);

    let payloads_file = temp.path().join("crash").join("payload_crash").join("payloads.log");
    let metadata = std::fs::metadata(&payloads_file).unwrap();
    let middle = metadata.len() / 2;

    let mutator = FileMutator::new(&payloads_file, 42);
    mutator.bitflip_at(middle, 8).expect("Corrupt failed");

    // Collection::open does not read the payload log at all (only the
    // segment holder replays the wal); corruption there must not block
    // opening the collection.
    let result = Collection::open(temp.path().join("crash"), info(32), &engine_config());
    assert!(result.is_ok(), "payload log corruption must not prevent reopening the collection");
}

// =============================================================================
// Stress tests
// =============================================================================

#[test]
fn test_multiple_corruptions_never_panics() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let collection = create_test_collection(temp.path(), 50, 32);
    drop(collection);

    let crash_dir = temp.path().join("crash");
    let files_to_corrupt = [crash_dir.join("wal.log"), crash_dir.join("payload_crash").join("payloads.log")];

    for (i, file_path) in files_to_corrupt.iter().enumerate() {
        if file_path.exists() {
            let mutator = FileMutator::new(file_path, 42 + i as u64);
            let _ = mutator.bitflip_at(0, 4);
        }
    }

    let result = Collection::open(crash_dir, info(32), &engine_config());

    // Any result is acceptable as long as it is a typed error, not a panic.
    match result {
        Ok(coll) => {
            let present = (0..50u64).filter(|i| coll.point_exists(&PointId::from(*i))).count();
            eprintln!("Opened with {present} points");
        }
        Err(e) => eprintln!("Got error: {e}"),
    }
}
