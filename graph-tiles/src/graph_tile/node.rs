use crate::graph_id::GraphId;
use bitfield_struct::bitfield;
use geo::{Coord, coord};
use std::fmt::{Debug, Formatter};
use zerocopy::{LE, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Node positions are stored in units of 1e-7 degrees from the tile base.
pub(crate) const POSITION_PRECISION: f64 = 1e7;

#[bitfield(u64)]
struct NodePosition {
    #[bits(26)]
    lat_offset: u32,
    #[bits(26)]
    lon_offset: u32,
    #[bits(4)]
    density: u8,
    #[bits(8)]
    __: u8,
}

#[bitfield(u64)]
struct NodeEdges {
    #[bits(21)]
    edge_index: u32,
    #[bits(7)]
    edge_count: u8,
    #[bits(21)]
    transition_index: u32,
    #[bits(3)]
    transition_count: u8,
    #[bits(12)]
    __: u16,
}

/// A node in a graph tile.
///
/// The node's outbound edges are the contiguous run
/// `edge_index..edge_index + edge_count` of the tile's directed edges.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy)]
#[repr(C)]
pub struct NodeInfo {
    position: U64<LE>,
    edges: U64<LE>,
}

impl NodeInfo {
    pub(crate) const MAX_OFFSET: u32 = (1 << 26) - 1;
    pub(crate) const MAX_DENSITY: u8 = (1 << 4) - 1;
    pub(crate) const MAX_EDGE_INDEX: u32 = (1 << 21) - 1;
    pub(crate) const MAX_EDGE_COUNT: u8 = (1 << 7) - 1;
    pub(crate) const MAX_TRANSITION_COUNT: u8 = (1 << 3) - 1;

    /// Packs a node. Callers must range check every value against the `MAX_*` constants.
    pub(crate) fn new(
        lon_offset: u32,
        lat_offset: u32,
        density: u8,
        edge_index: u32,
        edge_count: u8,
        transition_index: u32,
        transition_count: u8,
    ) -> Self {
        let position = NodePosition::new()
            .with_lat_offset(lat_offset)
            .with_lon_offset(lon_offset)
            .with_density(density);
        let edges = NodeEdges::new()
            .with_edge_index(edge_index)
            .with_edge_count(edge_count)
            .with_transition_index(transition_index)
            .with_transition_count(transition_count);
        Self {
            position: U64::new(position.into_bits()),
            edges: U64::new(edges.into_bits()),
        }
    }

    #[inline]
    fn position(&self) -> NodePosition {
        NodePosition::from_bits(self.position.get())
    }

    #[inline]
    fn edge_bits(&self) -> NodeEdges {
        NodeEdges::from_bits(self.edges.get())
    }

    /// The node's position, given the base (south-west corner) of its tile.
    pub fn coordinate(&self, tile_base: Coord<f64>) -> Coord<f64> {
        let position = self.position();
        coord! {
            x: tile_base.x + f64::from(position.lon_offset()) / POSITION_PRECISION,
            y: tile_base.y + f64::from(position.lat_offset()) / POSITION_PRECISION,
        }
    }

    /// Relative road density around the node (0-15).
    #[inline]
    pub fn density(&self) -> u8 {
        self.position().density()
    }

    /// The index of the node's first outbound edge within the tile.
    #[inline]
    pub fn edge_index(&self) -> u32 {
        self.edge_bits().edge_index()
    }

    #[inline]
    pub fn edge_count(&self) -> u32 {
        u32::from(self.edge_bits().edge_count())
    }

    /// The index of the node's first transition within the tile.
    #[inline]
    pub fn transition_index(&self) -> u32 {
        self.edge_bits().transition_index()
    }

    #[inline]
    pub fn transition_count(&self) -> u32 {
        u32::from(self.edge_bits().transition_count())
    }
}

impl Debug for NodeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let position = self.position();
        f.debug_struct("NodeInfo")
            .field("lon_offset", &position.lon_offset())
            .field("lat_offset", &position.lat_offset())
            .field("density", &position.density())
            .field("edge_index", &self.edge_index())
            .field("edge_count", &self.edge_count())
            .field("transition_index", &self.transition_index())
            .field("transition_count", &self.transition_count())
            .finish()
    }
}

#[bitfield(u64)]
struct TransitionBits {
    #[bits(46)]
    end_node: u64,
    up: bool,
    #[bits(17)]
    __: u32,
}

/// A link from a node to the same intersection on another hierarchy level.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy)]
#[repr(C)]
pub struct NodeTransition {
    bits: U64<LE>,
}

impl NodeTransition {
    pub(crate) fn new(end_node: GraphId, up: bool) -> Self {
        let bits = TransitionBits::new()
            .with_end_node(end_node.value())
            .with_up(up);
        Self {
            bits: U64::new(bits.into_bits()),
        }
    }

    /// The corresponding node on the other level.
    #[inline]
    pub fn end_node_id(&self) -> GraphId {
        let value = TransitionBits::from_bits(self.bits.get()).end_node();
        // 46 bits always fit
        GraphId::try_from_id(value).unwrap_or(GraphId::INVALID)
    }

    /// True if the transition leads to a more important (numerically lower) level.
    #[inline]
    pub fn up(&self) -> bool {
        TransitionBits::from_bits(self.bits.get()).up()
    }
}

impl Debug for NodeTransition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTransition")
            .field("end_node_id", &self.end_node_id())
            .field("up", &self.up())
            .finish()
    }
}
