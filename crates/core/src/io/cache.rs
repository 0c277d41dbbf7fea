//! LRU cache of decoded raster chunks (TIFF strips or tiles).

use lru::LruCache;
use std::num::NonZeroUsize;

/// First-band samples of one decoded chunk, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    values: Vec<f64>,
    stride: usize,
}

impl Chunk {
    /// `stride` is the number of samples per chunk row, which may exceed
    /// the valid data width for padded edge tiles.
    pub fn new(values: Vec<f64>, stride: usize) -> Self {
        Self { values, stride }
    }

    /// Sample at chunk-local `(row, col)`, NaN outside the decoded data.
    pub fn value(&self, row: usize, col: usize) -> f64 {
        if col >= self.stride {
            return f64::NAN;
        }
        self.values.get(row * self.stride + col).copied().unwrap_or(f64::NAN)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Bounded cache keyed by chunk index.
pub struct ChunkCache {
    inner: LruCache<u32, Chunk>,
}

impl ChunkCache {
    /// Create a new cache holding at most `capacity` chunks (at least one).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, index: u32) -> Option<&Chunk> {
        self.inner.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.inner.contains(&index)
    }

    pub fn insert(&mut self, index: u32, chunk: Chunk) {
        self.inner.put(index, chunk);
    }

    /// Number of chunks currently cached.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
