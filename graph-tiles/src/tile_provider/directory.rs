use super::{TileSource, TileSourceError};
use crate::{GraphId, TileHierarchy};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use walkdir::WalkDir;

const TILE_EXTENSION: &str = "gph";

/// Loads tiles from a directory tree laid out as `<root>/<level>/ddd/ddd.gph`.
pub struct DirectoryTileSource {
    base_directory: PathBuf,
    hierarchy: Arc<TileHierarchy>,
}

impl DirectoryTileSource {
    /// Creates a source over `base_directory`.
    ///
    /// The hierarchy determines the zero padding of tile paths.
    pub fn new(base_directory: impl Into<PathBuf>, hierarchy: Arc<TileHierarchy>) -> Self {
        Self {
            base_directory: base_directory.into(),
            hierarchy,
        }
    }

    pub fn base_directory(&self) -> &PathBuf {
        &self.base_directory
    }

    /// The absolute path where the tile with this ID would be stored.
    ///
    /// # Errors
    ///
    /// Fails if the ID's level or tile number is not valid in the hierarchy.
    pub fn tile_path(&self, tile_id: GraphId) -> Result<PathBuf, TileSourceError> {
        let relative = self.hierarchy.file_path(tile_id, TILE_EXTENSION)?;
        Ok(self.base_directory.join(relative))
    }
}

impl TileSource for DirectoryTileSource {
    fn load(&self, tile_id: GraphId) -> Result<Option<Vec<u8>>, TileSourceError> {
        let path = self.tile_path(tile_id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn available_tiles(&self) -> Result<Vec<GraphId>, TileSourceError> {
        let mut tiles = Vec::new();
        for entry in WalkDir::new(&self.base_directory) {
            let entry = entry?;
            if !entry.file_type().is_file()
                || !entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(TILE_EXTENSION))
            {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.base_directory) else {
                continue;
            };
            if let Some(graph_id) = self.hierarchy.graph_id_from_path(relative) {
                tiles.push(graph_id);
            }
        }
        tiles.sort_unstable();
        Ok(tiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_tile(source: &DirectoryTileSource, tile_id: GraphId, bytes: &[u8]) {
        let path = source.tile_path(tile_id).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn load_and_list() {
        let dir = tempfile::tempdir().expect("Unable to create temp dir");
        let source = DirectoryTileSource::new(dir.path(), Arc::new(TileHierarchy::standard()));

        let local = GraphId::try_from_components(2, 762_485, 0).unwrap();
        let highway = GraphId::try_from_components(0, 3015, 0).unwrap();
        write_tile(&source, local, b"local");
        write_tile(&source, highway, b"highway");
        // Not a tile
        fs::write(dir.path().join("README.txt"), b"hello").unwrap();

        assert!(source.tile_path(local).unwrap().ends_with("2/000/762/485.gph"));
        assert_eq!(source.load(local).unwrap().as_deref(), Some(&b"local"[..]));
        assert_eq!(source.load(highway).unwrap().as_deref(), Some(&b"highway"[..]));

        let missing = GraphId::try_from_components(2, 762_486, 0).unwrap();
        assert!(source.load(missing).unwrap().is_none());

        assert_eq!(source.available_tiles().unwrap(), vec![highway, local]);
    }

    #[test]
    fn invalid_level() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryTileSource::new(dir.path(), Arc::new(TileHierarchy::standard()));
        let bogus = GraphId::try_from_components(5, 0, 0).unwrap();
        assert!(matches!(
            source.load(bogus),
            Err(TileSourceError::InvalidGraphId(_))
        ));
    }
}
