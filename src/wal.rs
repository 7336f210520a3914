//! Crash-safe write-ahead log.
//!
//! Every mutating call appends a checksummed, length-prefixed frame before
//! the mutation is applied to the in-memory segment; on restart, unreplayed
//! frames are replayed back into the named collection's `ActiveSegment`.
//! `(collection_name, point_id)` is the logical key: [`Wal::replay`] collapses
//! every frame to at most one entry per key (last write wins) before handing
//! entries to the caller, so replaying the same log twice — or replaying a
//! log with several writes to one id — is idempotent.

use crate::config::WalTruncation;
use crate::error::{Error, Result};
use crate::point::{PointId, Vector, VectorName};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// The kind of mutation recorded in one WAL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalEntryKind {
    /// A point was inserted or overwritten.
    Insert,
    /// A point was deleted.
    Delete,
    /// A point's vectors were updated in place.
    Update,
}

impl WalEntryKind {
    const fn tag(self) -> u8 {
        match self {
            Self::Insert => 0,
            Self::Delete => 1,
            Self::Update => 2,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Insert),
            1 => Some(Self::Delete),
            2 => Some(Self::Update),
            _ => None,
        }
    }
}

/// One durable record: a mutation against a single point in a named
/// collection.
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// What kind of mutation this frame records.
    pub kind: WalEntryKind,
    /// The collection the mutation applies to.
    pub collection_name: String,
    /// The affected point.
    pub point_id: PointId,
    /// Named vectors carried by the mutation (empty for a bare delete).
    pub named_vectors: Vec<(VectorName, Vector)>,
}

/// An append-only, checksummed log of [`WalEntry`] frames for one collection.
pub struct Wal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Wal {
    /// Opens (creating if absent) the log file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    /// Returns the log file's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entry` as a checksummed frame and fsyncs before returning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write or sync fails.
    pub fn append(&self, entry: &WalEntry) -> Result<()> {
        let body = encode_body(entry);
        let checksum = crc32(&body);

        let mut file = self.file.lock();
        file.write_all(&checksum.to_le_bytes())?;
        file.write_all(&body)?;
        file.sync_data()?;
        Ok(())
    }

    /// Replays every fully-written frame in the log, deduplicated so that at
    /// most one entry survives per `(collection_name, point_id)` — the last
    /// one appended — in the position of its first occurrence.
    ///
    /// A frame truncated by a crash mid-write (the common case: the process
    /// died between the `write_all` calls in [`Wal::append`]) is silently
    /// dropped rather than treated as corruption, since it was never
    /// acknowledged to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if a fully-written frame fails its checksum.
    pub fn replay(&self) -> Result<Vec<WalEntry>> {
        let file = self.file.lock();
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_frame(&mut reader)? {
            entries.push(entry);
        }
        Ok(dedup_last_write_wins(entries))
    }

    /// Applies `policy`, rewriting the log file in place.
    ///
    /// `Full` discards the entire log (used after every promoted point has
    /// been durably frozen into an `ImmutableSegment`); `KeepLastN` retains
    /// only the most recent `keep_last_n` frames, for debugging.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on failure, or [`Error::Corrupt`] if the
    /// existing log cannot be parsed while computing the retained tail.
    pub fn truncate(&self, policy: WalTruncation, keep_last_n: usize) -> Result<()> {
        let mut file = self.file.lock();

        let retained = match policy {
            WalTruncation::Full => Vec::new(),
            WalTruncation::KeepLastN => {
                let mut reader = BufReader::new(file.try_clone()?);
                reader.seek(SeekFrom::Start(0))?;
                let mut all = Vec::new();
                while let Some(entry) = read_frame(&mut reader)? {
                    all.push(entry);
                }
                let skip = all.len().saturating_sub(keep_last_n);
                all.split_off(skip)
            }
        };

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        for entry in &retained {
            let body = encode_body(entry);
            let checksum = crc32(&body);
            file.write_all(&checksum.to_le_bytes())?;
            file.write_all(&body)?;
        }
        file.sync_data()?;
        Ok(())
    }
}

/// Keeps only the most recent entry per `(collection_name, point_id)`, at the
/// position of that key's first occurrence.
fn dedup_last_write_wins(entries: Vec<WalEntry>) -> Vec<WalEntry> {
    let mut index_of: HashMap<(String, PointId), usize> = HashMap::with_capacity(entries.len());
    let mut deduped: Vec<WalEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = (entry.collection_name.clone(), entry.point_id.clone());
        if let Some(&idx) = index_of.get(&key) {
            deduped[idx] = entry;
        } else {
            index_of.insert(key, deduped.len());
            deduped.push(entry);
        }
    }
    deduped
}

fn encode_body(entry: &WalEntry) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(entry.kind.tag());
    write_len_prefixed(&mut body, entry.collection_name.as_bytes());
    write_len_prefixed(&mut body, &entry.point_id.to_bytes());
    body.extend_from_slice(&(entry.named_vectors.len() as u32).to_le_bytes());
    for (name, vector) in &entry.named_vectors {
        write_len_prefixed(&mut body, name.as_bytes());
        body.extend_from_slice(&(vector.len() as u64).to_le_bytes());
        for x in vector {
            body.extend_from_slice(&x.to_le_bytes());
        }
    }
    body
}

fn write_len_prefixed(body: &mut Vec<u8>, bytes: &[u8]) {
    body.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    body.extend_from_slice(bytes);
}

/// Reads one frame, returning `Ok(None)` at a clean EOF or a truncated tail
/// frame (both indistinguishable from "nothing more was durably written").
fn read_frame<R: Read>(reader: &mut R) -> Result<Option<WalEntry>> {
    let mut checksum_buf = [0u8; 4];
    if !try_read_exact(reader, &mut checksum_buf)? {
        return Ok(None);
    }
    let expected_checksum = u32::from_le_bytes(checksum_buf);

    let mut body = Vec::new();

    let mut kind_buf = [0u8; 1];
    if !try_read_exact(reader, &mut kind_buf)? {
        return Ok(None);
    }
    body.push(kind_buf[0]);
    let Some(kind) = WalEntryKind::from_tag(kind_buf[0]) else {
        return Err(Error::Corrupt(format!("unknown wal entry kind tag {}", kind_buf[0])));
    };

    let Some(collection_name) = read_len_prefixed_string(reader, &mut body)? else {
        return Ok(None);
    };
    let Some(point_id_bytes) = read_len_prefixed_bytes(reader, &mut body)? else {
        return Ok(None);
    };
    let point_id = PointId::from_bytes(&point_id_bytes)
        .ok_or_else(|| Error::Corrupt("invalid point id in wal frame".to_string()))?;

    let mut count_buf = [0u8; 4];
    if !try_read_exact(reader, &mut count_buf)? {
        return Ok(None);
    }
    body.extend_from_slice(&count_buf);
    let count = u32::from_le_bytes(count_buf);

    let mut named_vectors = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let Some(name) = read_len_prefixed_string(reader, &mut body)? else {
            return Ok(None);
        };
        let mut dim_buf = [0u8; 8];
        if !try_read_exact(reader, &mut dim_buf)? {
            return Ok(None);
        }
        body.extend_from_slice(&dim_buf);
        let dim = u64::from_le_bytes(dim_buf) as usize;

        let mut vector = Vec::with_capacity(dim);
        for _ in 0..dim {
            let mut f_buf = [0u8; 4];
            if !try_read_exact(reader, &mut f_buf)? {
                return Ok(None);
            }
            body.extend_from_slice(&f_buf);
            vector.push(f32::from_le_bytes(f_buf));
        }
        named_vectors.push((name, vector));
    }

    if crc32(&body) != expected_checksum {
        return Err(Error::Corrupt("wal frame checksum mismatch".to_string()));
    }

    Ok(Some(WalEntry { kind, collection_name, point_id, named_vectors }))
}

fn read_len_prefixed_bytes<R: Read>(reader: &mut R, body: &mut Vec<u8>) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    if !try_read_exact(reader, &mut len_buf)? {
        return Ok(None);
    }
    body.extend_from_slice(&len_buf);
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut bytes = vec![0u8; len];
    if !try_read_exact(reader, &mut bytes)? {
        return Ok(None);
    }
    body.extend_from_slice(&bytes);
    Ok(Some(bytes))
}

fn read_len_prefixed_string<R: Read>(reader: &mut R, body: &mut Vec<u8>) -> Result<Option<String>> {
    let Some(bytes) = read_len_prefixed_bytes(reader, body)? else {
        return Ok(None);
    };
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| Error::Corrupt(format!("invalid utf-8 in wal frame: {e}")))
}

fn try_read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(true)
}

/// CRC-32 (IEEE 802.3 polynomial, reflected), computed bitwise since frames
/// are small and this avoids pulling in a dedicated checksum crate.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = 0u32.wrapping_sub(crc & 1);
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}
