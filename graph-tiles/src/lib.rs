//! # Graph tiles
//!
//! Random-access, memory-bounded storage for a tiled, multi-level road graph,
//! plus the spatial tiling primitives used to partition the world into tiles and bins.
//!
//! The main entry points are:
//!
//! - [`GraphId`] for addressing tiles, nodes and directed edges.
//! - [`TileHierarchy`] describing the levels of the graph and their tiling systems.
//! - [`Tiles`], a generic grid with bounding box enumeration, line intersection and
//!   closest-first bin search.
//! - [`GraphReader`], which loads tiles through a [`TileSource`] into a bounded cache
//!   and exposes the topology operations (opposing edges, connectivity, shortcuts).

use enumset::EnumSetType;

pub mod cache;
pub mod graph_id;
pub mod graph_reader;
pub mod graph_tile;
pub mod tile_hierarchy;
pub mod tile_provider;
pub mod tiles;

#[cfg(test)]
pub(crate) mod test_network;

pub use cache::{EvictionPolicy, GraphTileCache};
pub use graph_id::{GraphId, InvalidGraphIdError};
pub use graph_reader::{
    EdgeRef, GraphElementRef, GraphReader, GraphReaderConfig, GraphReaderError, NodeRef,
};
pub use graph_tile::{GraphTile, GraphTileHandle};
pub use tile_hierarchy::{HierarchyError, TileHierarchy, TileLevel, TilingSystem};
pub use tile_provider::{DirectoryTileSource, InMemoryTileSource, TileSource, TileSourceError};
pub use tiles::{
    ClosestBin, ClosestFirst, CoordinateSystem, Geographic, Planar, Tiles, TilesError,
};

/// Travel modes, used as access permission sets on directed edges.
#[derive(Debug, EnumSetType)]
#[enumset(repr = "u16")]
pub enum Access {
    Auto,
    Pedestrian,
    Bicycle,
    Truck,
    Emergency,
    Taxi,
    Bus,
    Hov,
    Wheelchair,
    Moped,
    Motorcycle,
    GolfCart,
}

/// The access mode that defines which edges may be contracted into shortcuts.
pub const SHORTCUT_ACCESS: Access = Access::Auto;
