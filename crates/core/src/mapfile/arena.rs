//! Append-only string arena.
//!
//! Every string a rule refers to (literal keys, canonicalization templates,
//! method names) is copied into the arena and referenced afterwards
//! through an [`ArenaStr`] handle. Strings are packed into fixed-capacity
//! chunks so a mapfile with thousands of short literal entries costs a
//! handful of allocations instead of one per string.
//!
//! Individual strings are never freed. The whole arena is released at once
//! by [`StringArena::clear`].
//!
//! [`ArenaMap`] is a hash index whose keys live in the arena; literal rule
//! groups and the per-method table are both built on it.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;

/// Default capacity of a freshly allocated chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Opaque handle to a string stored in a [`StringArena`].
///
/// A handle is only meaningful for the arena that produced it; resolve it
/// with [`StringArena::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaStr {
    chunk: u32,
    start: u32,
    len: u32,
}

impl ArenaStr {
    /// Length of the referenced string in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// `true` if the referenced string is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Byte accounting for an arena, reported by [`StringArena::usage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaUsage {
    /// Bytes occupied by interned strings.
    pub used: usize,
    /// Allocated but unused capacity across all chunks.
    pub wasted: usize,
    /// Number of chunk allocations.
    pub chunks: usize,
}

/// Chunked, append-only string storage.
#[derive(Debug)]
pub struct StringArena {
    chunks: Vec<String>,
    chunk_size: usize,
}

impl Default for StringArena {
    fn default() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }
}

impl StringArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an arena whose chunks hold `chunk_size` bytes each. Strings
    /// longer than that get a chunk of their own.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Copy `s` into the arena and return a handle to the copy.
    pub fn insert(&mut self, s: &str) -> ArenaStr {
        let need = s.len();
        let fits = self
            .chunks
            .last()
            .is_some_and(|chunk| chunk.capacity() - chunk.len() >= need);
        if !fits {
            self.chunks
                .push(String::with_capacity(need.max(self.chunk_size)));
        }

        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let start = chunk.len();
        // Never grows past capacity, so earlier handles stay valid.
        chunk.push_str(s);

        ArenaStr {
            chunk: chunk_index as u32,
            start: start as u32,
            len: need as u32,
        }
    }

    /// Resolve a handle produced by this arena.
    ///
    /// A handle from a different (or cleared) arena resolves to `""`.
    pub fn get(&self, handle: ArenaStr) -> &str {
        let start = handle.start as usize;
        let end = start + handle.len as usize;
        self.chunks
            .get(handle.chunk as usize)
            .and_then(|chunk| chunk.get(start..end))
            .unwrap_or("")
    }

    /// Bytes used, bytes wasted and number of chunk allocations.
    pub fn usage(&self) -> ArenaUsage {
        let used: usize = self.chunks.iter().map(String::len).sum();
        let capacity: usize = self.chunks.iter().map(String::capacity).sum();
        ArenaUsage {
            used,
            wasted: capacity - used,
            chunks: self.chunks.len(),
        }
    }

    /// Release every chunk. All outstanding handles become dangling and
    /// resolve to `""`.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.chunks.shrink_to_fit();
    }
}

// ---------------------------------------------------------------------------
// Arena-keyed map
// ---------------------------------------------------------------------------

/// Insertion-ordered map from arena strings to `V`.
///
/// Only handles are stored; lookups hash the caller's `&str` and compare
/// against the resolved keys of the matching bucket.
#[derive(Debug)]
pub struct ArenaMap<V> {
    hasher: RandomState,
    buckets: HashMap<u64, Vec<usize>>,
    entries: Vec<(ArenaStr, V)>,
}

impl<V> Default for ArenaMap<V> {
    fn default() -> Self {
        Self {
            hasher: RandomState::new(),
            buckets: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<V> ArenaMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, arena: &StringArena, key: &str) -> Option<usize> {
        let hash = self.hasher.hash_one(key);
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|&ix| arena.get(self.entries[ix].0) == key)
    }

    fn push(&mut self, arena: &mut StringArena, key: &str, value: V) -> usize {
        let hash = self.hasher.hash_one(key);
        let handle = arena.insert(key);
        let ix = self.entries.len();
        self.buckets.entry(hash).or_default().push(ix);
        self.entries.push((handle, value));
        ix
    }

    /// Interned key and value for `key`.
    pub fn get(&self, arena: &StringArena, key: &str) -> Option<(ArenaStr, &V)> {
        self.position(arena, key)
            .map(|ix| (self.entries[ix].0, &self.entries[ix].1))
    }

    /// Insert `key -> value` unless `key` is present. The key is interned
    /// only on insertion. Returns `false` when the key already existed.
    pub fn insert(&mut self, arena: &mut StringArena, key: &str, value: V) -> bool {
        if self.position(arena, key).is_some() {
            return false;
        }
        self.push(arena, key, value);
        true
    }

    /// Value for `key`, inserting `make()` first if it is missing.
    pub fn get_or_insert_with(
        &mut self,
        arena: &mut StringArena,
        key: &str,
        make: impl FnOnce() -> V,
    ) -> &mut V {
        let ix = match self.position(arena, key) {
            Some(ix) => ix,
            None => self.push(arena, key, make()),
        };
        &mut self.entries[ix].1
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaStr, &V)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.entries.clear();
    }
}
