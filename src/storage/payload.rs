//! Durable `PointId -> JSON payload` mapping: an append-only log with an
//! in-memory index, plus a periodic checksummed snapshot so cold start does
//! not require replaying the whole log.
//!
//! ## Files
//!
//! - `payloads.log` — append-only write-ahead log
//! - `payloads.snapshot` — binary snapshot of the index, written atomically
//!   via a temp file + rename

use crate::error::{Error, Result};
use crate::point::PointId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_MAGIC: &[u8; 4] = b"STPS";
const SNAPSHOT_VERSION: u8 = 1;
const DEFAULT_SNAPSHOT_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Log-structured, durable store mapping point ids to JSON payloads.
pub struct PayloadStore {
    path: PathBuf,
    index: RwLock<FxHashMap<PointId, u64>>,
    wal: RwLock<BufWriter<File>>,
    reader: RwLock<File>,
    last_snapshot_wal_pos: RwLock<u64>,
    snapshot_threshold_bytes: u64,
}

impl PayloadStore {
    /// Opens (or creates) a payload store rooted at `dir`, replaying from the
    /// newest valid snapshot plus any WAL entries written after it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory or log files cannot be opened.
    pub fn open<P: AsRef<Path>>(dir: P, snapshot_threshold_bytes: u64) -> Result<Self> {
        let path = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        let log_path = path.join("payloads.log");
        let snapshot_path = path.join("payloads.snapshot");

        let writer_file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        let wal = BufWriter::new(writer_file);

        if !log_path.exists() {
            File::create(&log_path)?;
        }
        let reader = File::open(&log_path)?;
        let wal_len = reader.metadata()?.len();

        let (index, last_snapshot_wal_pos) = match load_snapshot(&snapshot_path) {
            Ok((snapshot_index, snapshot_wal_pos)) => {
                let index = replay_from(&log_path, snapshot_index, snapshot_wal_pos, wal_len)?;
                (index, snapshot_wal_pos)
            }
            Err(_) => {
                let index = replay_from(&log_path, FxHashMap::default(), 0, wal_len)?;
                (index, 0)
            }
        };

        Ok(Self {
            path,
            index: RwLock::new(index),
            wal: RwLock::new(wal),
            reader: RwLock::new(reader),
            last_snapshot_wal_pos: RwLock::new(last_snapshot_wal_pos),
            snapshot_threshold_bytes,
        })
    }

    /// Durably associates `payload` with `id`, overwriting any prior value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on write failure or [`Error::Serialization`] if
    /// `payload` cannot be encoded as JSON.
    pub fn put(&self, id: &PointId, payload: &Value) -> Result<()> {
        let payload_bytes = serde_json::to_vec(payload).map_err(|e| Error::Serialization(e.to_string()))?;
        let key_bytes = id.to_bytes();

        let mut wal = self.wal.write();
        let mut index = self.index.write();

        wal.flush()?;
        let record_start = wal.get_ref().metadata()?.len();

        wal.write_all(&[1u8])?;
        wal.write_all(&(key_bytes.len() as u32).to_le_bytes())?;
        wal.write_all(&key_bytes)?;
        let value_len_offset = record_start + 1 + 4 + key_bytes.len() as u64;
        let len_u32 = u32::try_from(payload_bytes.len())
            .map_err(|_| Error::Capacity("payload too large".to_string()))?;
        wal.write_all(&len_u32.to_le_bytes())?;
        wal.write_all(&payload_bytes)?;
        wal.flush()?;

        index.insert(id.clone(), value_len_offset);
        Ok(())
    }

    /// Returns the payload for `id`, if one is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on read failure or [`Error::Corrupt`] if the
    /// stored record fails to parse as JSON.
    pub fn get(&self, id: &PointId) -> Result<Option<Value>> {
        let Some(offset) = self.index.read().get(id).copied() else {
            return Ok(None);
        };
        let mut reader = self.reader.write();
        reader.seek(SeekFrom::Start(offset))?;

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        let mut payload_bytes = vec![0u8; len];
        reader.read_exact(&mut payload_bytes)?;

        let payload = serde_json::from_slice(&payload_bytes)
            .map_err(|e| Error::Corrupt(format!("corrupt payload record: {e}")))?;
        Ok(Some(payload))
    }

    /// Removes any payload associated with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on write failure.
    pub fn delete(&self, id: &PointId) -> Result<()> {
        let key_bytes = id.to_bytes();
        let mut wal = self.wal.write();
        let mut index = self.index.write();

        wal.write_all(&[2u8])?;
        wal.write_all(&(key_bytes.len() as u32).to_le_bytes())?;
        wal.write_all(&key_bytes)?;
        wal.flush()?;

        index.remove(id);
        Ok(())
    }

    /// Full scan returning every `(id, payload)` pair whose payload has
    /// `field_name` equal to `value`. Off the hot search path, so a linear
    /// scan is acceptable.
    ///
    /// # Errors
    ///
    /// Returns the first read or parse error encountered.
    pub fn filter(&self, field_name: &str, value: &Value) -> Result<Vec<(PointId, Value)>> {
        let ids: Vec<PointId> = self.index.read().keys().cloned().collect();
        let mut matches = Vec::new();
        for id in ids {
            if let Some(payload) = self.get(&id)? {
                if payload.get(field_name) == Some(value) {
                    matches.push((id, payload));
                }
            }
        }
        Ok(matches)
    }

    /// True once the WAL has grown enough past the last snapshot to justify
    /// writing a fresh one.
    #[must_use]
    pub fn should_snapshot(&self) -> bool {
        let last_pos = *self.last_snapshot_wal_pos.read();
        let current_pos = match self.wal.write().get_ref().metadata() {
            Ok(m) => m.len(),
            Err(_) => return false,
        };
        current_pos.saturating_sub(last_pos) >= self.snapshot_threshold_bytes
    }

    /// Writes a fresh, checksummed snapshot of the current index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on failure.
    pub fn create_snapshot(&self) -> Result<()> {
        self.wal.write().flush()?;
        let snapshot_path = self.path.join("payloads.snapshot");
        let index = self.index.read();
        let wal_pos = self.wal.write().get_ref().metadata()?.len();

        let mut entries = Vec::with_capacity(index.len());
        for (id, &offset) in index.iter() {
            entries.push((id.to_bytes(), offset));
        }
        drop(index);

        let mut buf = Vec::new();
        buf.extend_from_slice(SNAPSHOT_MAGIC);
        buf.push(SNAPSHOT_VERSION);
        buf.extend_from_slice(&wal_pos.to_le_bytes());
        buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        for (key_bytes, offset) in &entries {
            buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(key_bytes);
            buf.extend_from_slice(&offset.to_le_bytes());
        }
        let crc = crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        let temp_path = self.path.join("payloads.snapshot.tmp");
        std::fs::write(&temp_path, &buf)?;
        std::fs::rename(&temp_path, &snapshot_path)?;

        *self.last_snapshot_wal_pos.write() = wal_pos;
        Ok(())
    }
}

fn replay_from(
    log_path: &Path,
    mut index: FxHashMap<PointId, u64>,
    start_pos: u64,
    end_pos: u64,
) -> Result<FxHashMap<PointId, u64>> {
    if start_pos >= end_pos {
        return Ok(index);
    }

    let file = File::open(log_path)?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(start_pos))?;

    let mut pos = start_pos;
    while pos < end_pos {
        let mut marker = [0u8; 1];
        if reader.read_exact(&mut marker).is_err() {
            break;
        }
        pos += 1;

        let mut key_len_bytes = [0u8; 4];
        reader.read_exact(&mut key_len_bytes)?;
        let key_len = u32::from_le_bytes(key_len_bytes) as usize;
        pos += 4;

        let mut key_bytes = vec![0u8; key_len];
        reader.read_exact(&mut key_bytes)?;
        pos += key_len as u64;
        let id = PointId::from_bytes(&key_bytes)
            .ok_or_else(|| Error::Corrupt("invalid point id in payload log".to_string()))?;

        match marker[0] {
            1 => {
                let value_len_offset = pos;
                let mut len_bytes = [0u8; 4];
                reader.read_exact(&mut len_bytes)?;
                let payload_len = u64::from(u32::from_le_bytes(len_bytes));
                pos += 4;

                index.insert(id, value_len_offset);

                let skip = i64::try_from(payload_len)
                    .map_err(|_| Error::Corrupt("payload length overflow".to_string()))?;
                reader.seek(SeekFrom::Current(skip))?;
                pos += payload_len;
            }
            2 => {
                index.remove(&id);
            }
            other => return Err(Error::Corrupt(format!("unknown payload log marker {other}"))),
        }
    }

    Ok(index)
}

fn load_snapshot(snapshot_path: &Path) -> io::Result<(FxHashMap<PointId, u64>, u64)> {
    if !snapshot_path.exists() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "no snapshot"));
    }
    let data = std::fs::read(snapshot_path)?;
    if data.len() < 21 + 4 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "snapshot too small"));
    }
    if &data[0..4] != SNAPSHOT_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
    }
    if data[4] != SNAPSHOT_VERSION {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "unsupported version"));
    }
    let wal_pos = u64::from_le_bytes(data[5..13].try_into().unwrap());
    let entry_count = u64::from_le_bytes(data[13..21].try_into().unwrap());

    let stored_crc = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap());
    if crc32(&data[..data.len() - 4]) != stored_crc {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "crc mismatch"));
    }

    let mut index = FxHashMap::default();
    let mut cursor = 21usize;
    for _ in 0..entry_count {
        if cursor + 4 > data.len() - 4 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated snapshot entry"));
        }
        let key_len = u32::from_le_bytes(data[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        let key_bytes = &data[cursor..cursor + key_len];
        cursor += key_len;
        let offset = u64::from_le_bytes(data[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let id = PointId::from_bytes(key_bytes)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid snapshot key"))?;
        index.insert(id, offset);
    }

    Ok((index, wal_pos))
}

/// CRC-32 (IEEE 802.3), table-based; used only for snapshot integrity.
fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[idx];
    }
    !crc
}
