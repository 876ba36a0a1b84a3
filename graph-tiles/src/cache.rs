//! # Tile cache
//!
//! A memory-bounded store of decoded tiles keyed by tile base ID.
//!
//! Tiles are handed out as reference-counted [`GraphTileHandle`]s.
//! Evicting a tile only drops the cache's reference,
//! so a caller holding a handle can keep using it;
//! the bytes are freed when the last handle is dropped.
//! The size estimate only counts resident tiles, so memory held by such
//! callers is not accounted for.

use crate::GraphId;
use crate::graph_reader::GraphReaderError;
use crate::graph_tile::{GraphTile, GraphTileHandle};
use lru::LruCache;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// How [`GraphTileCache::trim`] makes room.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EvictionPolicy {
    /// Evict least recently used tiles until the cache is within budget.
    #[default]
    Lru,
    /// Drop every tile.
    ClearAll,
}

pub struct GraphTileCache {
    tiles: Mutex<LruCache<GraphId, GraphTileHandle>>,
    size_bytes: AtomicUsize,
    max_size: usize,
    eviction: EvictionPolicy,
}

impl GraphTileCache {
    /// Creates an empty cache with a budget of `max_size` bytes.
    pub fn new(max_size: usize, eviction: EvictionPolicy) -> Self {
        Self {
            tiles: Mutex::new(LruCache::unbounded()),
            size_bytes: AtomicUsize::new(0),
            max_size,
            eviction,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<GraphId, GraphTileHandle>>, GraphReaderError> {
        self.tiles
            .lock()
            .map_err(|e| GraphReaderError::PoisonedCacheLock(e.to_string()))
    }

    /// Gets the cached tile containing `graph_id`, marking it as recently used.
    pub fn get(&self, graph_id: GraphId) -> Result<Option<GraphTileHandle>, GraphReaderError> {
        let tile_id = graph_id.tile_base_id();
        let handle = self.lock()?.get(&tile_id).cloned();
        if handle.is_some() {
            tracing::trace!(tile = %tile_id, "Cache hit");
        }
        Ok(handle)
    }

    /// Inserts a tile, returning the resident handle.
    ///
    /// If another thread inserted the same tile first, that tile is kept and returned.
    pub fn insert(&self, handle: GraphTileHandle) -> Result<GraphTileHandle, GraphReaderError> {
        let tile_id = handle.graph_id();
        let mut tiles = self.lock()?;
        if let Some(existing) = tiles.get(&tile_id) {
            return Ok(existing.clone());
        }

        let bytes = handle.size_bytes();
        tiles.put(tile_id, handle.clone());
        let cache_size = self.size_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        tracing::debug!(tile = %tile_id, bytes, cache_size, "Cached tile");
        Ok(handle)
    }

    /// Returns true if the tile containing `graph_id` is resident (without touching its recency).
    pub fn contains(&self, graph_id: GraphId) -> Result<bool, GraphReaderError> {
        Ok(self.lock()?.contains(&graph_id.tile_base_id()))
    }

    /// The number of resident tiles.
    pub fn len(&self) -> Result<usize, GraphReaderError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, GraphReaderError> {
        Ok(self.lock()?.is_empty())
    }

    /// The total size of resident tiles in bytes.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[inline]
    pub fn eviction(&self) -> EvictionPolicy {
        self.eviction
    }

    /// True when the resident tiles exceed the budget.
    #[inline]
    pub fn over_committed(&self) -> bool {
        self.size_bytes() > self.max_size
    }

    /// Evicts tiles according to the eviction policy, returning the number evicted.
    pub fn trim(&self) -> Result<usize, GraphReaderError> {
        let mut tiles = self.lock()?;
        let evicted = match self.eviction {
            EvictionPolicy::Lru => {
                let mut evicted = 0;
                while self.size_bytes.load(Ordering::Relaxed) > self.max_size {
                    let Some((_, handle)) = tiles.pop_lru() else {
                        break;
                    };
                    self.size_bytes
                        .fetch_sub(handle.size_bytes(), Ordering::Relaxed);
                    evicted += 1;
                }
                evicted
            }
            EvictionPolicy::ClearAll => {
                let evicted = tiles.len();
                tiles.clear();
                self.size_bytes.store(0, Ordering::Relaxed);
                evicted
            }
        };
        tracing::debug!(evicted, cache_size = self.size_bytes(), "Trimmed tile cache");
        Ok(evicted)
    }

    /// Drops every resident tile.
    pub fn clear(&self) -> Result<(), GraphReaderError> {
        let mut tiles = self.lock()?;
        tiles.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
        Ok(())
    }
}
