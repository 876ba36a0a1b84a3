//! # Tile hierarchy
//!
//! The hierarchy describes the levels of the graph (from coarsest to finest),
//! each with its own tiling system.
//! Shortcut edges exist on every level except the finest ("local") one;
//! transit data lives on a separate level that never has shortcuts.
//!
//! A hierarchy is an immutable value; construct it once (usually with [`TileHierarchy::standard`])
//! and share it (e.g. behind an `Arc`).

use crate::GraphId;
use crate::graph_id::{InvalidGraphIdError, MAX_LEVEL};
use crate::tiles::{Geographic, Tiles, TilesError};
use geo::{Coord, Rect};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("A hierarchy needs at least one level.")]
    NoLevels,
    #[error("A hierarchy can have at most {MAX_LEVEL} road levels plus transit.")]
    TooManyLevels,
    #[error("Levels must be numbered from zero (found level {found} at position {expected}).")]
    NonConsecutiveLevel { expected: u8, found: u8 },
    #[error("The transit level must follow the local level (expected {expected}, found {found}).")]
    TransitLevel { expected: u8, found: u8 },
    #[error("Invalid tiling system for level {level}: {source}")]
    TilingSystem { level: u8, source: TilesError },
    #[error("Level {level} has more tiles than a graph ID can address.")]
    TooManyTiles { level: u8 },
}

/// The tiling of a single level: a world-covering grid of square tiles.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TilingSystem {
    /// Tile width and height, in degrees.
    pub tile_size: f64,
    /// Number of bins per tile side.
    pub n_subdivisions: u8,
}

/// A single level of the hierarchy.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileLevel {
    pub level: u8,
    pub name: String,
    pub tiling_system: TilingSystem,
}

impl TileLevel {
    pub fn new(level: u8, name: impl Into<String>, tile_size: f64, n_subdivisions: u8) -> Self {
        Self {
            level,
            name: name.into(),
            tiling_system: TilingSystem {
                tile_size,
                n_subdivisions,
            },
        }
    }
}

/// The ordered set of hierarchy levels and their tile grids.
#[derive(Clone, Debug)]
pub struct TileHierarchy {
    levels: Vec<TileLevel>,
    transit: TileLevel,
    /// Grids indexed by level number; the transit grid is last.
    grids: Vec<Tiles<Geographic>>,
}

impl TileHierarchy {
    /// Builds a hierarchy from its road levels (coarsest first) and its transit level.
    ///
    /// # Errors
    ///
    /// Levels must be numbered `0..n`, the transit level must be `n`,
    /// and every tiling system must produce a valid world grid.
    pub fn new(levels: Vec<TileLevel>, transit: TileLevel) -> Result<Self, HierarchyError> {
        if levels.is_empty() {
            return Err(HierarchyError::NoLevels);
        }
        if levels.len() > usize::from(MAX_LEVEL) {
            return Err(HierarchyError::TooManyLevels);
        }
        for (position, level) in levels.iter().enumerate() {
            let expected = position as u8;
            if level.level != expected {
                return Err(HierarchyError::NonConsecutiveLevel {
                    expected,
                    found: level.level,
                });
            }
        }
        let expected_transit = levels.len() as u8;
        if transit.level != expected_transit {
            return Err(HierarchyError::TransitLevel {
                expected: expected_transit,
                found: transit.level,
            });
        }

        let grids = levels
            .iter()
            .chain(std::iter::once(&transit))
            .map(|level| {
                let TilingSystem {
                    tile_size,
                    n_subdivisions,
                } = level.tiling_system;
                let grid = Tiles::world(tile_size, n_subdivisions).map_err(|source| {
                    HierarchyError::TilingSystem {
                        level: level.level,
                        source,
                    }
                })?;
                // Every tile must be addressable by a graph ID
                if GraphId::try_from_components(level.level, u64::from(grid.max_tile_id()), 0)
                    .is_err()
                {
                    return Err(HierarchyError::TooManyTiles { level: level.level });
                }
                Ok(grid)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            levels,
            transit,
            grids,
        })
    }

    /// The standard three-level road hierarchy plus a transit level.
    ///
    /// | Level | Name     | Tile size |
    /// |-------|----------|-----------|
    /// | 0     | highway  | 4°        |
    /// | 1     | arterial | 1°        |
    /// | 2     | local    | 0.25°     |
    /// | 3     | transit  | 0.25°     |
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            vec![
                TileLevel::new(0, "highway", 4.0, 5),
                TileLevel::new(1, "arterial", 1.0, 5),
                TileLevel::new(2, "local", 0.25, 5),
            ],
            TileLevel::new(3, "transit", 0.25, 5),
        )
        .expect("The standard hierarchy is statically valid")
    }

    /// The road levels, coarsest first (excludes transit).
    #[inline]
    pub fn levels(&self) -> &[TileLevel] {
        &self.levels
    }

    /// Looks up a level by number, including the transit level.
    pub fn level(&self, level: u8) -> Option<&TileLevel> {
        self.levels
            .get(usize::from(level))
            .or_else(|| (level == self.transit.level).then_some(&self.transit))
    }

    /// The finest road level, which never contains shortcuts.
    #[inline]
    pub fn local_level(&self) -> u8 {
        self.transit.level - 1
    }

    #[inline]
    pub fn transit_level(&self) -> u8 {
        self.transit.level
    }

    /// True if edges on this level may be shortcuts (every road level except the local one).
    #[inline]
    pub fn has_shortcuts(&self, level: u8) -> bool {
        level < self.local_level()
    }

    /// The finest level that can contain shortcuts, if any.
    pub fn max_shortcut_level(&self) -> Option<u8> {
        self.local_level().checked_sub(1)
    }

    /// The tile grid for a level (including transit).
    pub fn tiles(&self, level: u8) -> Option<&Tiles<Geographic>> {
        self.grids.get(usize::from(level))
    }

    /// The highest tile ID on a level.
    pub fn max_tile_id(&self, level: u8) -> Option<u32> {
        self.tiles(level).map(Tiles::max_tile_id)
    }

    /// The base graph ID of the tile containing `coord` on `level`.
    pub fn graph_id_for(&self, level: u8, coord: Coord<f64>) -> Option<GraphId> {
        let tile_id = self.tiles(level)?.tile_id(coord)?;
        GraphId::try_from_components(level, u64::from(tile_id), 0).ok()
    }

    /// The base graph IDs of every road-level tile intersecting `bbox`.
    pub fn graph_ids_in_bbox(&self, bbox: Rect<f64>) -> Vec<GraphId> {
        self.levels
            .iter()
            .filter_map(|level| Some((level.level, self.tiles(level.level)?)))
            .flat_map(|(level, tiles)| {
                tiles.tile_list(bbox).into_iter().filter_map(move |tile_id| {
                    GraphId::try_from_components(level, u64::from(tile_id), 0).ok()
                })
            })
            .collect()
    }

    /// The geographic extent of the tile containing `graph_id`.
    pub fn tile_bounds(&self, graph_id: GraphId) -> Option<Rect<f64>> {
        let tile_id = u32::try_from(graph_id.tile_id()).ok()?;
        self.tiles(graph_id.level())?.tile_bounds(tile_id)
    }

    /// The south-west corner of the tile containing `graph_id`.
    pub fn tile_base(&self, graph_id: GraphId) -> Option<Coord<f64>> {
        self.tile_bounds(graph_id).map(|bounds| bounds.min())
    }

    /// The relative path of a tile file, e.g. `2/000/762/485.gph`.
    ///
    /// The tile number is zero-padded to a multiple of three digits
    /// (enough for the level's largest tile ID) and split into directories of three digits.
    ///
    /// # Errors
    ///
    /// Fails if the level is not part of this hierarchy or the tile is out of range.
    pub fn file_path(
        &self,
        graph_id: GraphId,
        extension: &str,
    ) -> Result<PathBuf, InvalidGraphIdError> {
        let level = graph_id.level();
        let max_tile_id = self
            .max_tile_id(level)
            .ok_or(InvalidGraphIdError::Level(level))?;
        if graph_id.tile_id() > u64::from(max_tile_id) {
            return Err(InvalidGraphIdError::TileId(graph_id.tile_id()));
        }

        let digits = max_tile_id.to_string().len().div_ceil(3) * 3;
        let padded = format!("{:0digits$}", graph_id.tile_id());

        let mut path = PathBuf::from(level.to_string());
        let groups: Vec<&str> = padded
            .as_bytes()
            .chunks(3)
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .collect();
        if let Some((file, directories)) = groups.split_last() {
            path.extend(directories);
            path.push(format!("{file}.{extension}"));
        }
        Ok(path)
    }

    /// The inverse of [`TileHierarchy::file_path`]:
    /// recovers the tile's base graph ID from a path relative to the tile root.
    pub fn graph_id_from_path(&self, relative_path: &Path) -> Option<GraphId> {
        let mut components = relative_path.components().filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        });
        let level: u8 = components.next()?.parse().ok()?;

        let mut digits = String::new();
        for part in components {
            let stem = part.split_once('.').map_or(part, |(stem, _)| stem);
            if stem.len() != 3 || !stem.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.push_str(stem);
        }
        let tile_id: u64 = digits.parse().ok()?;
        if tile_id > u64::from(self.max_tile_id(level)?) {
            return None;
        }
        GraphId::try_from_components(level, tile_id, 0).ok()
    }
}
