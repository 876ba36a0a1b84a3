use super::{TileSource, TileSourceError};
use crate::GraphId;
use dashmap::DashMap;

/// Holds tile blobs in memory, keyed by tile base ID.
///
/// Useful for tests and for embedding small graphs.
#[derive(Default)]
pub struct InMemoryTileSource {
    tiles: DashMap<GraphId, Vec<u8>>,
}

impl InMemoryTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the tile containing `graph_id`.
    pub fn insert(&self, graph_id: GraphId, bytes: Vec<u8>) {
        self.tiles.insert(graph_id.tile_base_id(), bytes);
    }

    /// Removes the tile containing `graph_id`, returning its bytes.
    pub fn remove(&self, graph_id: GraphId) -> Option<Vec<u8>> {
        self.tiles
            .remove(&graph_id.tile_base_id())
            .map(|(_, bytes)| bytes)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl FromIterator<(GraphId, Vec<u8>)> for InMemoryTileSource {
    fn from_iter<T: IntoIterator<Item = (GraphId, Vec<u8>)>>(iter: T) -> Self {
        let source = Self::new();
        for (graph_id, bytes) in iter {
            source.insert(graph_id, bytes);
        }
        source
    }
}

impl TileSource for InMemoryTileSource {
    fn load(&self, tile_id: GraphId) -> Result<Option<Vec<u8>>, TileSourceError> {
        Ok(self
            .tiles
            .get(&tile_id.tile_base_id())
            .map(|bytes| bytes.value().clone()))
    }

    fn available_tiles(&self) -> Result<Vec<GraphId>, TileSourceError> {
        let mut tiles: Vec<GraphId> = self.tiles.iter().map(|entry| *entry.key()).collect();
        tiles.sort_unstable();
        Ok(tiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_by_tile() {
        let tile = GraphId::try_from_components(1, 100, 0).unwrap();
        let source: InMemoryTileSource = [(tile.with_index(5).unwrap(), vec![1, 2, 3])]
            .into_iter()
            .collect();

        assert_eq!(source.len(), 1);
        assert_eq!(source.load(tile).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(source.available_tiles().unwrap(), vec![tile]);

        let other = GraphId::try_from_components(1, 101, 0).unwrap();
        assert_eq!(source.load(other).unwrap(), None);

        assert_eq!(source.remove(tile), Some(vec![1, 2, 3]));
        assert!(source.is_empty());
    }
}
