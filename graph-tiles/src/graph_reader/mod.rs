//! # Graph reader
//!
//! The [`GraphReader`] combines a [`TileSource`], a [`GraphTileCache`] and a [`TileHierarchy`]
//! and exposes the traversal operations of the tiled graph:
//! opposing edges, connectivity tests, shortcut lookup and recovery, and a few spatial helpers.
//!
//! Loaded tiles are immutable and shared behind [`GraphTileHandle`]s,
//! so a reader can be used from many threads at once.
//! Loads of the same tile are serialized; loads of different tiles proceed in parallel.
//!
//! ## Error tiers
//!
//! Expected absence (a tile outside the extract, a transit edge with no opposing edge,
//! an edge with no shortcut) is `Ok(None)` / `Ok(false)`.
//! `Err` is reserved for I/O failures and corrupt or inconsistent data.

use crate::cache::{EvictionPolicy, GraphTileCache};
use crate::graph_id::InvalidGraphIdError;
use crate::graph_tile::{
    GraphTile, GraphTileDecodingError, GraphTileHandle, LookupError, OwnedGraphTile,
};
use crate::tile_provider::{LockTable, TileSource, TileSourceError};
use crate::{GraphId, TileHierarchy};
use std::sync::{Arc, Mutex};
use thiserror::Error;

mod connectivity;
mod refs;
mod shortcuts;

pub use refs::{EdgeRef, GraphElementRef, NodeRef};

#[derive(Debug, Error)]
pub enum GraphReaderError {
    #[error("Error fetching tile: {0}")]
    TileSourceError(#[from] TileSourceError),
    #[error("Decoding error: {0}")]
    DecodingError(#[from] GraphTileDecodingError),
    #[error("Graph tile lookup error: {0}")]
    GraphTileLookupError(#[from] LookupError),
    #[error("Invalid graph ID: {0}")]
    InvalidGraphId(#[from] InvalidGraphIdError),
    #[error("Cache lock is poisoned: {0}")]
    PoisonedCacheLock(String),
    #[error("Requested tile {requested} but the loaded tile claims to be {found}.")]
    TileIdMismatch { requested: GraphId, found: GraphId },
}

/// Reader settings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GraphReaderConfig {
    /// The tile cache budget in bytes.
    pub max_cache_size: usize,
    pub eviction: EvictionPolicy,
}

impl Default for GraphReaderConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 1 << 30,
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Random access to a tiled graph through a bounded tile cache.
pub struct GraphReader<S: TileSource> {
    source: S,
    hierarchy: Arc<TileHierarchy>,
    cache: GraphTileCache,
    lock_table: LockTable<GraphId>,
}

impl<S: TileSource> GraphReader<S> {
    pub fn new(source: S, hierarchy: Arc<TileHierarchy>, config: GraphReaderConfig) -> Self {
        Self {
            source,
            hierarchy,
            cache: GraphTileCache::new(config.max_cache_size, config.eviction),
            lock_table: LockTable::new(),
        }
    }

    #[inline]
    pub fn hierarchy(&self) -> &Arc<TileHierarchy> {
        &self.hierarchy
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[inline]
    pub fn cache(&self) -> &GraphTileCache {
        &self.cache
    }

    /// Gets the tile containing `graph_id`, loading it on a cache miss.
    ///
    /// Returns `Ok(None)` if the tile does not exist
    /// (the ID is invalid, outside the hierarchy, or missing from the source).
    ///
    /// # Errors
    ///
    /// Fails if the source fails, the tile is corrupt,
    /// or the tile's header names a different tile.
    pub fn get_graph_tile(
        &self,
        graph_id: GraphId,
    ) -> Result<Option<GraphTileHandle>, GraphReaderError> {
        let tile_id = graph_id.tile_base_id();
        let in_hierarchy = self
            .hierarchy
            .max_tile_id(tile_id.level())
            .is_some_and(|max_tile_id| tile_id.tile_id() <= u64::from(max_tile_id));
        if !graph_id.is_valid() || !in_hierarchy {
            return Ok(None);
        }

        if let Some(handle) = self.cache.get(tile_id)? {
            return Ok(Some(handle));
        }

        let lock = self.lock_table.lock_for(tile_id);
        let result = self.load_tile(tile_id, &lock);
        drop(lock);
        self.lock_table.release(&tile_id);
        result
    }

    fn load_tile(
        &self,
        tile_id: GraphId,
        lock: &Mutex<()>,
    ) -> Result<Option<GraphTileHandle>, GraphReaderError> {
        let _guard = lock
            .lock()
            .map_err(|e| GraphReaderError::PoisonedCacheLock(e.to_string()))?;

        // Another thread may have finished loading while we waited
        if let Some(handle) = self.cache.get(tile_id)? {
            return Ok(Some(handle));
        }

        let Some(bytes) = self.source.load(tile_id)? else {
            tracing::debug!(tile = %tile_id, "Tile does not exist");
            return Ok(None);
        };
        let bytes_len = bytes.len();
        let tile = OwnedGraphTile::try_from(bytes)?;
        if tile.graph_id() != tile_id {
            return Err(GraphReaderError::TileIdMismatch {
                requested: tile_id,
                found: tile.graph_id(),
            });
        }
        tracing::debug!(tile = %tile_id, bytes = bytes_len, "Loaded tile");

        let handle = self.cache.insert(Arc::new(tile))?;
        if self.cache.over_committed() {
            self.cache.trim()?;
        }
        Ok(Some(handle))
    }

    /// Returns `hint` if it contains `graph_id`, and otherwise loads the right tile.
    fn tile_for(
        &self,
        graph_id: GraphId,
        hint: &GraphTileHandle,
    ) -> Result<Option<GraphTileHandle>, GraphReaderError> {
        if hint.may_contain_id(graph_id) {
            Ok(Some(hint.clone()))
        } else {
            self.get_graph_tile(graph_id)
        }
    }

    /// Resolves a directed edge.
    ///
    /// # Errors
    ///
    /// Fails if the tile cannot be loaded or the index is out of range for the tile.
    pub fn directed_edge(&self, edge_id: GraphId) -> Result<Option<EdgeRef>, GraphReaderError> {
        let Some(tile) = self.get_graph_tile(edge_id)? else {
            return Ok(None);
        };
        Ok(Some(EdgeRef::new(tile, edge_id)?))
    }

    /// Resolves a node.
    ///
    /// # Errors
    ///
    /// Fails if the tile cannot be loaded or the index is out of range for the tile.
    pub fn node(&self, node_id: GraphId) -> Result<Option<NodeRef>, GraphReaderError> {
        let Some(tile) = self.get_graph_tile(node_id)? else {
            return Ok(None);
        };
        Ok(Some(NodeRef::new(tile, node_id)?))
    }

    /// True when the cached tiles exceed the cache budget.
    #[inline]
    pub fn over_committed(&self) -> bool {
        self.cache.over_committed()
    }

    /// Evicts tiles per the cache's eviction policy; returns the number evicted.
    pub fn trim(&self) -> Result<usize, GraphReaderError> {
        self.cache.trim()
    }

    pub fn clear_cache(&self) -> Result<(), GraphReaderError> {
        self.cache.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_tile::{GraphTileBuilder, GraphTileDecodingError};
    use crate::tile_provider::InMemoryTileSource;
    use geo::coord;
    use std::thread;

    fn tile_bytes(tile_id: GraphId) -> Vec<u8> {
        GraphTileBuilder::new(tile_id, coord! { x: 0.0, y: 0.0 }).to_bytes()
    }

    #[test]
    fn missing_tiles_are_not_errors() {
        let reader = GraphReader::new(
            InMemoryTileSource::new(),
            Arc::new(TileHierarchy::standard()),
            GraphReaderConfig::default(),
        );
        let id = GraphId::try_from_components(1, 100, 3).unwrap();
        assert!(reader.get_graph_tile(id).unwrap().is_none());
        assert!(reader.get_graph_tile(GraphId::INVALID).unwrap().is_none());
        // No such level
        let id = GraphId::try_from_components(6, 0, 0).unwrap();
        assert!(reader.get_graph_tile(id).unwrap().is_none());
        assert!(reader.directed_edge(id).unwrap().is_none());
    }

    #[test]
    fn loads_once_and_caches() {
        let id = GraphId::try_from_components(1, 100, 0).unwrap();
        let source: InMemoryTileSource = [(id, tile_bytes(id))].into_iter().collect();
        let reader = GraphReader::new(
            source,
            Arc::new(TileHierarchy::standard()),
            GraphReaderConfig::default(),
        );

        let handles: Vec<_> = thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| reader.get_graph_tile(id.with_index(7).unwrap())))
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap().unwrap().unwrap())
                .collect()
        });
        for handle in &handles {
            assert!(Arc::ptr_eq(handle, &handles[0]));
        }
        assert_eq!(reader.cache().len().unwrap(), 1);
        assert_eq!(reader.lock_table.len(), 0);
    }

    #[test]
    fn auto_trim_after_insert() {
        let ids: Vec<_> = (0..3)
            .map(|tile| GraphId::try_from_components(2, tile, 0).unwrap())
            .collect();
        let source: InMemoryTileSource = ids.iter().map(|id| (*id, tile_bytes(*id))).collect();
        let tile_size = tile_bytes(ids[0]).len();
        let reader = GraphReader::new(
            source,
            Arc::new(TileHierarchy::standard()),
            GraphReaderConfig {
                max_cache_size: tile_size * 2,
                eviction: EvictionPolicy::Lru,
            },
        );

        let held = reader.get_graph_tile(ids[0]).unwrap().unwrap();
        reader.get_graph_tile(ids[1]).unwrap();
        reader.get_graph_tile(ids[2]).unwrap();
        assert!(!reader.over_committed());
        assert_eq!(reader.cache().len().unwrap(), 2);
        assert!(!reader.cache().contains(ids[0]).unwrap());
        // Still usable after eviction
        assert_eq!(held.graph_id(), ids[0]);

        reader.clear_cache().unwrap();
        assert_eq!(reader.cache().size_bytes(), 0);
    }

    #[test]
    fn corrupt_and_mismatched_tiles() {
        let good = GraphId::try_from_components(1, 100, 0).unwrap();
        let other = GraphId::try_from_components(1, 101, 0).unwrap();
        let corrupt = GraphId::try_from_components(1, 102, 0).unwrap();
        let source = InMemoryTileSource::new();
        source.insert(other, tile_bytes(good));
        source.insert(corrupt, vec![1, 2, 3]);
        let reader = GraphReader::new(
            source,
            Arc::new(TileHierarchy::standard()),
            GraphReaderConfig::default(),
        );

        assert!(matches!(
            reader.get_graph_tile(other),
            Err(GraphReaderError::TileIdMismatch { requested, found })
                if requested == other && found == good
        ));
        assert!(matches!(
            reader.get_graph_tile(corrupt),
            Err(GraphReaderError::DecodingError(GraphTileDecodingError::CastError(_)))
        ));
    }
}
