//! # Tile sources
//!
//! A [`TileSource`] is the storage collaborator behind the reader:
//! given a tile's base ID it returns the raw tile bytes, or `None` if the tile does not exist.
//! Sources know nothing about caching or decoding.

use crate::GraphId;
use crate::graph_id::InvalidGraphIdError;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

mod directory;
mod memory;

pub use directory::DirectoryTileSource;
pub use memory::InMemoryTileSource;

#[derive(Debug, Error)]
pub enum TileSourceError {
    #[error("Invalid graph ID: {0}")]
    InvalidGraphId(#[from] InvalidGraphIdError),
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Unable to list tiles: {0}")]
    WalkError(#[from] walkdir::Error),
}

/// Loads raw tile bytes by tile ID.
///
/// Implementations may block (e.g. on disk or network I/O);
/// the reader calls `load` at most once per tile at a time.
pub trait TileSource: Send + Sync {
    /// Loads the tile with the given base ID.
    ///
    /// Returns `Ok(None)` if the tile does not exist (ex: outside your extract).
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or IDs that cannot be mapped to storage.
    fn load(&self, tile_id: GraphId) -> Result<Option<Vec<u8>>, TileSourceError>;

    /// The base IDs of every tile in the source, in ascending order.
    ///
    /// # Errors
    ///
    /// Fails if the underlying storage cannot be enumerated.
    fn available_tiles(&self) -> Result<Vec<GraphId>, TileSourceError>;
}

impl<T: TileSource + ?Sized> TileSource for Arc<T> {
    fn load(&self, tile_id: GraphId) -> Result<Option<Vec<u8>>, TileSourceError> {
        (**self).load(tile_id)
    }

    fn available_tiles(&self) -> Result<Vec<GraphId>, TileSourceError> {
        (**self).available_tiles()
    }
}

/// A keyed lock.
///
/// This enables more granular locking than over an entire data structure.
pub(crate) struct LockTable<K>(DashMap<K, Arc<Mutex<()>>>);

impl<K: std::hash::Hash + Eq + Clone> LockTable<K> {
    pub fn new() -> Self {
        Self(DashMap::new())
    }

    pub fn lock_for(&self, k: K) -> Arc<Mutex<()>> {
        self.0
            .entry(k)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Drops the lock for a key if nobody else holds it.
    pub fn release(&self, k: &K) {
        self.0.remove_if(k, |_, lock| Arc::strong_count(lock) == 1);
    }
}
