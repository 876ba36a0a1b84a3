use crate::GraphId;
use crate::graph_tile::{
    DirectedEdge, EdgeInfo, GraphTile, GraphTileDecodingError, GraphTileHandle, LookupError,
    NodeInfo, NodeTransition,
};
use geo::Coord;
use std::marker::PhantomData;

/// A validated reference to a node or directed edge, paired with the tile that owns it.
///
/// Holding a reference keeps the tile alive even if the cache evicts it,
/// so element accessors are infallible.
#[derive(Clone, Debug)]
pub struct GraphElementRef<T> {
    tile: GraphTileHandle,
    graph_id: GraphId,
    _element: PhantomData<fn() -> T>,
}

pub type EdgeRef = GraphElementRef<DirectedEdge>;
pub type NodeRef = GraphElementRef<NodeInfo>;

impl<T> GraphElementRef<T> {
    #[inline]
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    #[inline]
    pub fn tile(&self) -> &GraphTileHandle {
        &self.tile
    }

    #[inline]
    fn index(&self) -> usize {
        self.graph_id.index() as usize
    }
}

impl EdgeRef {
    pub(crate) fn new(tile: GraphTileHandle, graph_id: GraphId) -> Result<Self, LookupError> {
        tile.get_directed_edge(graph_id)?;
        Ok(Self {
            tile,
            graph_id,
            _element: PhantomData,
        })
    }

    #[inline]
    pub fn edge(&self) -> &DirectedEdge {
        // Checked in the constructor
        &self.tile.directed_edges()[self.index()]
    }

    /// The edge's way ID and shape.
    ///
    /// # Errors
    ///
    /// Fails if the edge info is corrupt.
    pub fn edge_info(&self) -> Result<EdgeInfo<'_>, GraphTileDecodingError> {
        self.tile.get_edge_info(self.edge())
    }
}

impl NodeRef {
    pub(crate) fn new(tile: GraphTileHandle, graph_id: GraphId) -> Result<Self, LookupError> {
        tile.get_node(graph_id)?;
        Ok(Self {
            tile,
            graph_id,
            _element: PhantomData,
        })
    }

    #[inline]
    pub fn node(&self) -> &NodeInfo {
        &self.tile.nodes()[self.index()]
    }

    pub fn coordinate(&self) -> Coord<f64> {
        self.node().coordinate(self.tile.header().base())
    }

    /// The node's outbound edges with their graph IDs.
    pub fn outbound_edges(&self) -> impl Iterator<Item = (GraphId, &DirectedEdge)> {
        let tile_id = self.graph_id.tile_base_id();
        let first = u64::from(self.node().edge_index());
        self.tile
            .get_outbound_edges_from_node(self.node())
            .iter()
            .zip(first..)
            .filter_map(move |(edge, index)| Some((tile_id.with_index(index).ok()?, edge)))
    }

    pub fn transitions(&self) -> &[NodeTransition] {
        self.tile.get_transitions(self.node())
    }
}
