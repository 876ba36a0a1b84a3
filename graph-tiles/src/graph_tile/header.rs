use crate::graph_id::GraphId;
use geo::{Coord, coord};
use zerocopy::{F64, LE, U32, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// The tile format version written by [`GraphTileBuilder`](super::GraphTileBuilder).
pub const TILE_FORMAT_VERSION: u32 = 1;

/// The fixed-size header at the start of every tile.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct GraphTileHeader {
    graph_id: U64<LE>,
    base_lon: F64<LE>,
    base_lat: F64<LE>,
    version: U32<LE>,
    node_count: U32<LE>,
    directed_edge_count: U32<LE>,
    transition_count: U32<LE>,
    edge_info_size: U32<LE>,
    reserved: U32<LE>,
}

impl GraphTileHeader {
    pub(crate) fn new(graph_id: GraphId, base: Coord<f64>) -> Self {
        Self {
            graph_id: U64::new(graph_id.value()),
            base_lon: F64::new(base.x),
            base_lat: F64::new(base.y),
            version: U32::new(TILE_FORMAT_VERSION),
            node_count: U32::ZERO,
            directed_edge_count: U32::ZERO,
            transition_count: U32::ZERO,
            edge_info_size: U32::ZERO,
            reserved: U32::ZERO,
        }
    }

    pub(crate) fn set_counts(
        &mut self,
        node_count: u32,
        directed_edge_count: u32,
        transition_count: u32,
        edge_info_size: u32,
    ) {
        self.node_count = U32::new(node_count);
        self.directed_edge_count = U32::new(directed_edge_count);
        self.transition_count = U32::new(transition_count);
        self.edge_info_size = U32::new(edge_info_size);
    }

    #[inline]
    pub(crate) fn raw_graph_id(&self) -> u64 {
        self.graph_id.get()
    }

    /// The tile's base graph ID.
    ///
    /// Views reject headers with an invalid ID, so this is only [`GraphId::INVALID`]
    /// for headers that never went through validation.
    #[inline]
    pub fn graph_id(&self) -> GraphId {
        GraphId::try_from_id(self.graph_id.get()).unwrap_or(GraphId::INVALID)
    }

    /// The south-west corner of the tile; node positions are stored relative to it.
    #[inline]
    pub fn base(&self) -> Coord<f64> {
        coord! { x: self.base_lon.get(), y: self.base_lat.get() }
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version.get()
    }

    #[inline]
    pub fn node_count(&self) -> u32 {
        self.node_count.get()
    }

    #[inline]
    pub fn directed_edge_count(&self) -> u32 {
        self.directed_edge_count.get()
    }

    #[inline]
    pub fn transition_count(&self) -> u32 {
        self.transition_count.get()
    }

    /// The size of the edge info region in bytes.
    #[inline]
    pub fn edge_info_size(&self) -> u32 {
        self.edge_info_size.get()
    }
}
