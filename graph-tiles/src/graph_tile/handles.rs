//! # Graph tile handles
//!
//! Owned handles to graph tile data, for when access must outlive a borrow.
//! The cache hands out [`GraphTileHandle`]s; a tile's bytes are freed
//! once the cache and every holder have dropped their handle.

use super::{
    DirectedEdge, EdgeInfo, GraphTile, GraphTileDecodingError, GraphTileHeader, GraphTileView,
    LookupError, NodeInfo, NodeTransition, OpposingEdgeIndex,
};
use crate::GraphId;
use self_cell::self_cell;
use std::sync::Arc;

self_cell! {
    /// A read-only graph tile.
    ///
    /// The bytes are fully owned by the tile, and access is infallible after construction.
    pub struct OwnedGraphTile {
        owner: Vec<u8>,
        #[covariant]
        dependent: GraphTileView,
    }

    impl {Debug}
}

/// A cheaply cloneable, reference counted tile.
pub type GraphTileHandle = Arc<OwnedGraphTile>;

impl TryFrom<Vec<u8>> for OwnedGraphTile {
    type Error = GraphTileDecodingError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        OwnedGraphTile::try_new(value, |data| GraphTileView::try_from(data.as_slice()))
    }
}

impl OwnedGraphTile {
    /// The raw tile bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.borrow_owner()
    }

    #[inline]
    pub(crate) fn view(&self) -> &GraphTileView<'_> {
        self.borrow_dependent()
    }
}

impl GraphTile for OwnedGraphTile {
    #[inline]
    fn graph_id(&self) -> GraphId {
        self.borrow_dependent().graph_id()
    }

    #[inline]
    fn may_contain_id(&self, id: GraphId) -> bool {
        self.borrow_dependent().may_contain_id(id)
    }

    #[inline]
    fn header(&self) -> &GraphTileHeader {
        self.borrow_dependent().header()
    }

    #[inline]
    fn get_node(&self, id: GraphId) -> Result<&NodeInfo, LookupError> {
        self.borrow_dependent().get_node(id)
    }

    #[inline]
    fn get_outbound_edges_from_node(&self, node: &NodeInfo) -> &[DirectedEdge] {
        self.borrow_dependent().get_outbound_edges_from_node(node)
    }

    #[inline]
    fn get_transitions(&self, node: &NodeInfo) -> &[NodeTransition] {
        self.borrow_dependent().get_transitions(node)
    }

    #[inline]
    fn get_directed_edge(&self, id: GraphId) -> Result<&DirectedEdge, LookupError> {
        self.borrow_dependent().get_directed_edge(id)
    }

    #[inline]
    fn get_opp_edge_index(&self, id: GraphId) -> Result<OpposingEdgeIndex, LookupError> {
        self.borrow_dependent().get_opp_edge_index(id)
    }

    #[inline]
    fn get_edge_info(
        &self,
        directed_edge: &DirectedEdge,
    ) -> Result<EdgeInfo<'_>, GraphTileDecodingError> {
        self.borrow_dependent().get_edge_info(directed_edge)
    }

    #[inline]
    fn nodes(&self) -> &[NodeInfo] {
        self.borrow_dependent().nodes()
    }

    #[inline]
    fn directed_edges(&self) -> &[DirectedEdge] {
        self.borrow_dependent().directed_edges()
    }

    #[inline]
    fn transitions(&self) -> &[NodeTransition] {
        self.borrow_dependent().transitions()
    }

    #[inline]
    fn size_bytes(&self) -> usize {
        self.borrow_owner().len()
    }
}

impl<T: GraphTile + ?Sized> GraphTile for Arc<T> {
    #[inline]
    fn graph_id(&self) -> GraphId {
        (**self).graph_id()
    }

    #[inline]
    fn may_contain_id(&self, id: GraphId) -> bool {
        (**self).may_contain_id(id)
    }

    #[inline]
    fn header(&self) -> &GraphTileHeader {
        (**self).header()
    }

    #[inline]
    fn get_node(&self, id: GraphId) -> Result<&NodeInfo, LookupError> {
        (**self).get_node(id)
    }

    #[inline]
    fn get_outbound_edges_from_node(&self, node: &NodeInfo) -> &[DirectedEdge] {
        (**self).get_outbound_edges_from_node(node)
    }

    #[inline]
    fn get_transitions(&self, node: &NodeInfo) -> &[NodeTransition] {
        (**self).get_transitions(node)
    }

    #[inline]
    fn get_directed_edge(&self, id: GraphId) -> Result<&DirectedEdge, LookupError> {
        (**self).get_directed_edge(id)
    }

    #[inline]
    fn get_opp_edge_index(&self, id: GraphId) -> Result<OpposingEdgeIndex, LookupError> {
        (**self).get_opp_edge_index(id)
    }

    #[inline]
    fn get_edge_info(
        &self,
        directed_edge: &DirectedEdge,
    ) -> Result<EdgeInfo<'_>, GraphTileDecodingError> {
        (**self).get_edge_info(directed_edge)
    }

    #[inline]
    fn nodes(&self) -> &[NodeInfo] {
        (**self).nodes()
    }

    #[inline]
    fn directed_edges(&self) -> &[DirectedEdge] {
        (**self).directed_edges()
    }

    #[inline]
    fn transitions(&self) -> &[NodeTransition] {
        (**self).transitions()
    }

    #[inline]
    fn size_bytes(&self) -> usize {
        (**self).size_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_tile::{EdgeAttributes, GraphTileBuilder, NewEdge, NewNode};
    use geo::coord;

    #[test]
    fn owned_tile_from_bytes() {
        let tile_id = GraphId::try_from_components(0, 3015, 0).unwrap();
        let mut builder = GraphTileBuilder::new(tile_id, coord! { x: 0.0, y: 40.0 });
        builder
            .add_node(NewNode {
                coordinate: coord! { x: 1.5, y: 42.5 },
                density: 1,
                edges: vec![NewEdge::new(
                    GraphId::try_from_components(0, 3016, 0).unwrap(),
                    0,
                    EdgeAttributes::default(),
                )],
                transitions: vec![],
            })
            .unwrap();
        let bytes = builder.to_bytes();

        let handle: GraphTileHandle = Arc::new(OwnedGraphTile::try_from(bytes.clone()).unwrap());
        assert_eq!(handle.graph_id(), tile_id);
        assert_eq!(handle.size_bytes(), bytes.len());
        assert_eq!(handle.as_bytes(), bytes.as_slice());
        assert!(handle.directed_edges()[0].leaves_tile());

        let clone = Arc::clone(&handle);
        drop(handle);
        assert_eq!(clone.nodes().len(), 1);
    }

    #[test]
    fn rejects_garbage() {
        assert!(OwnedGraphTile::try_from(vec![0u8; 7]).is_err());
    }
}
