//! `TinyMap`, `PointId`, and `Point`: the small, stack-resident building blocks
//! of per-point storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-capacity, linear-scan associative container.
///
/// Keyed by short vector names (at most 8 entries in practice), `TinyMap`
/// deliberately does not hash: at this size a linear scan beats a hash table,
/// and it never allocates on the heap beyond its backing array.
#[derive(Debug, Clone)]
pub struct TinyMap<K, V, const N: usize> {
    keys: [Option<K>; N],
    values: [Option<V>; N],
    len: usize,
}

impl<K, V, const N: usize> Default for TinyMap<K, V, N> {
    fn default() -> Self {
        Self {
            keys: std::array::from_fn(|_| None),
            values: std::array::from_fn(|_| None),
            len: 0,
        }
    }
}

impl<K: PartialEq + Clone, V, const N: usize> TinyMap<K, V, N> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the map holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the map's fixed capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    fn index_of(&self, key: &K) -> Option<usize> {
        self.keys
            .iter()
            .position(|k| k.as_ref().is_some_and(|k| k == key))
    }

    /// Inserts or overwrites `key` with `value`.
    ///
    /// Returns `false` only when the key is new and the map is already at
    /// capacity; an overwrite of an existing key always succeeds.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if let Some(idx) = self.index_of(&key) {
            self.values[idx] = Some(value);
            return true;
        }
        if self.len >= N {
            return false;
        }
        self.keys[self.len] = Some(key);
        self.values[self.len] = Some(value);
        self.len += 1;
        true
    }

    /// Returns a reference to the value stored under `key`, if present.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.index_of(key).and_then(|idx| self.values[idx].as_ref())
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.index_of(key).is_some()
    }

    /// Removes `key`, returning its value if present.
    ///
    /// Implemented as swap-with-last: iteration order is insertion order
    /// except after an `erase`, which is fine for this container's use cases
    /// (no ordering guarantee is promised beyond "in insertion order").
    pub fn erase(&mut self, key: &K) -> Option<V> {
        let idx = self.index_of(key)?;
        let last = self.len - 1;
        self.keys.swap(idx, last);
        self.values.swap(idx, last);
        let value = self.values[last].take();
        self.keys[last] = None;
        self.len -= 1;
        value
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        for i in 0..self.len {
            self.keys[i] = None;
            self.values[i] = None;
        }
        self.len = 0;
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        (0..self.len).map(move |i| {
            (
                self.keys[i].as_ref().expect("tinymap invariant"),
                self.values[i].as_ref().expect("tinymap invariant"),
            )
        })
    }
}

impl<K, V, const N: usize> Serialize for TinyMap<K, V, N>
where
    K: PartialEq + Clone + Serialize,
    V: Serialize,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.iter().collect::<Vec<_>>().serialize(serializer)
    }
}

impl<'de, K, V, const N: usize> Deserialize<'de> for TinyMap<K, V, N>
where
    K: PartialEq + Clone + Deserialize<'de>,
    V: Deserialize<'de>,
{
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<(K, V)>::deserialize(deserializer)?;
        let mut map = Self::default();
        for (k, v) in entries {
            if !map.insert(k, v) {
                return Err(serde::de::Error::custom("tinymap capacity exceeded while deserializing"));
            }
        }
        Ok(map)
    }
}

/// The name of a vector within a point (e.g. `"default"`, `"image"`, `"text"`).
pub type VectorName = String;

/// Dense f32 vector data.
pub type Vector = Vec<f32>;

/// Default name used for the single-vector case.
pub const DEFAULT_VECTOR_NAME: &str = "default";

/// Maximum number of named vectors on one point (the `TinyMap` bound).
pub const MAX_NAMED_VECTORS: usize = 8;

/// External identifier for a point.
///
/// Replaces the C++ `variant<string, uint64_t>` with a tagged Rust sum type:
/// both representations serialize to a uniform byte encoding for the WAL and
/// payload store keys (see [`PointId::to_bytes`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    /// A string identifier.
    String(String),
    /// An unsigned 64-bit integer identifier.
    U64(u64),
}

impl PointId {
    /// Serializes the id to a uniform byte encoding: a one-byte discriminator
    /// (`0` = string, `1` = u64) followed by the payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::String(s) => {
                let mut buf = Vec::with_capacity(1 + s.len());
                buf.push(0u8);
                buf.extend_from_slice(s.as_bytes());
                buf
            }
            Self::U64(v) => {
                let mut buf = Vec::with_capacity(9);
                buf.push(1u8);
                buf.extend_from_slice(&v.to_le_bytes());
                buf
            }
        }
    }

    /// Inverts [`PointId::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `None` if the discriminator or payload length is invalid.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.split_first()? {
            (0, rest) => std::str::from_utf8(rest).ok().map(|s| Self::String(s.to_string())),
            (1, rest) => {
                let arr: [u8; 8] = rest.try_into().ok()?;
                Some(Self::U64(u64::from_le_bytes(arr)))
            }
            _ => None,
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::U64(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for PointId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for PointId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<u64> for PointId {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

/// A row in a collection: an external identifier plus a `TinyMap` of named
/// dense vectors.
#[derive(Debug, Clone)]
pub struct Point {
    /// The point's externally visible identifier.
    pub id: PointId,
    vectors: TinyMap<VectorName, Vector, MAX_NAMED_VECTORS>,
}

impl Point {
    /// Creates a point with no vectors yet attached.
    #[must_use]
    pub fn new(id: PointId) -> Self {
        Self {
            id,
            vectors: TinyMap::new(),
        }
    }

    /// Attaches `vector` under `name`, overwriting any existing vector of that name.
    ///
    /// Returns `false` only when `name` is new and the point already carries
    /// [`MAX_NAMED_VECTORS`] distinct names.
    pub fn add_vector(&mut self, name: VectorName, vector: Vector) -> bool {
        self.vectors.insert(name, vector)
    }

    /// Returns the vector stored under `name`, if any.
    #[must_use]
    pub fn get_vector(&self, name: &str) -> Option<&Vector> {
        self.vectors.get(&name.to_string())
    }

    /// Iterates over every populated `(name, vector)` pair.
    pub fn all_vectors(&self) -> impl Iterator<Item = (&VectorName, &Vector)> {
        self.vectors.iter()
    }

    /// Returns the number of named vectors populated on this point.
    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.vectors.len()
    }
}
