//! # Graph tiles
//!
//! A graph tile is an immutable binary blob holding one tile's nodes, directed edges,
//! node transitions and a variable-length edge info region (way IDs and shapes).
//!
//! The layout is a fixed-size [`GraphTileHeader`], followed by fixed-stride arrays of
//! [`NodeInfo`], [`NodeTransition`] and [`DirectedEdge`], followed by the edge info region.
//! All multi-byte values are little endian.
//! Parsing is zero-copy: a [`GraphTileView`] is a set of typed slices over the original bytes.

use thiserror::Error;
use zerocopy::FromBytes;

mod builder;
mod directed_edge;
mod edge_info;
mod handles;
mod header;
mod node;

pub use crate::graph_id::{GraphId, InvalidGraphIdError};
pub use builder::{GraphTileBuildError, GraphTileBuilder, NewEdge, NewNode};
pub use directed_edge::{DirectedEdge, EdgeAttributes, EdgeUse, RoadClass, Surface};
pub use edge_info::{EdgeInfo, ShapeIter, encode_polyline6};
pub use handles::{GraphTileHandle, OwnedGraphTile};
pub use header::{GraphTileHeader, TILE_FORMAT_VERSION};
pub use node::{NodeInfo, NodeTransition};

/// Shapes are stored as integers at this many units per degree.
pub(crate) const SHAPE_PRECISION: f64 = 1e6;

#[derive(Debug, Error)]
pub enum GraphTileDecodingError {
    #[error("Unable to extract a slice of the correct length; the tile data is malformed.")]
    SliceLength,
    #[error("Data cast failed (this almost always means invalid data): {0}")]
    CastError(String),
    #[error("Unsupported tile format version {0}.")]
    UnsupportedVersion(u32),
    #[error("Invalid graph ID.")]
    GraphIdParseError(#[from] InvalidGraphIdError),
    #[error("The header graph ID {0} is not a tile base ID.")]
    NotATileId(GraphId),
    #[error("Node {node} references {kind} outside the tile's arrays.")]
    NodeRangeOutOfBounds { node: usize, kind: &'static str },
    #[error("Directed edge {edge} has an invalid use value ({value}).")]
    InvalidEdgeUse { edge: usize, value: u8 },
    #[error("Edge info offset {0} is outside the edge info region.")]
    EdgeInfoOffset(usize),
    #[error("Truncated or overflowing varint in the edge info region.")]
    Varint,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Mismatched base; the graph ID cannot exist in this tile.")]
    MismatchedBase,
    #[error("The feature at the index specified does not exist in this tile.")]
    InvalidIndex,
}

/// The information needed to resolve an edge's opposing edge.
///
/// The opposing edge lives at `opposing_edge_index` within the end node's outbound edges,
/// which may be in another tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpposingEdgeIndex {
    pub end_node_id: GraphId,
    pub opposing_edge_index: u32,
}

/// Read access to a graph tile.
///
/// Implemented by the zero-copy [`GraphTileView`] and by the owned handles.
pub trait GraphTile {
    /// The tile's base graph ID.
    fn graph_id(&self) -> GraphId;

    /// Returns true if the ID addresses something in this tile (same level and tile number).
    fn may_contain_id(&self, id: GraphId) -> bool;

    fn header(&self) -> &GraphTileHeader;

    /// Gets a reference to a node in this tile by graph ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph ID cannot be contained in this tile
    /// or the index is invalid.
    fn get_node(&self, id: GraphId) -> Result<&NodeInfo, LookupError>;

    /// The contiguous run of directed edges leaving a node.
    fn get_outbound_edges_from_node(&self, node: &NodeInfo) -> &[DirectedEdge];

    /// The cross-level transitions of a node.
    fn get_transitions(&self, node: &NodeInfo) -> &[NodeTransition];

    /// Gets a reference to a directed edge in this tile by graph ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph ID cannot be contained in this tile
    /// or the index is invalid.
    fn get_directed_edge(&self, id: GraphId) -> Result<&DirectedEdge, LookupError>;

    /// Gets the location of the opposing edge of the directed edge with the given ID.
    ///
    /// # Errors
    ///
    /// Fails if the edge is not in this tile.
    fn get_opp_edge_index(&self, id: GraphId) -> Result<OpposingEdgeIndex, LookupError> {
        let edge = self.get_directed_edge(id)?;
        Ok(OpposingEdgeIndex {
            end_node_id: edge.end_node_id(),
            opposing_edge_index: edge.opposing_edge_index(),
        })
    }

    /// Gets the edge info (way ID and shape) for a directed edge in this tile.
    ///
    /// # Errors
    ///
    /// Fails if the edge's offset or the encoded header is invalid.
    fn get_edge_info(
        &self,
        directed_edge: &DirectedEdge,
    ) -> Result<EdgeInfo<'_>, GraphTileDecodingError>;

    fn nodes(&self) -> &[NodeInfo];

    fn directed_edges(&self) -> &[DirectedEdge];

    fn transitions(&self) -> &[NodeTransition];

    /// The size of the underlying tile data in bytes.
    fn size_bytes(&self) -> usize;
}

/// A zero-copy view over the bytes of a single graph tile.
///
/// Access should normally go through the [`GraphTile`] trait.
#[derive(Debug)]
pub struct GraphTileView<'a> {
    memory: &'a [u8],
    header: &'a GraphTileHeader,
    nodes: &'a [NodeInfo],
    transitions: &'a [NodeTransition],
    directed_edges: &'a [DirectedEdge],
    edge_info_memory: &'a [u8],
}

impl GraphTileView<'_> {
    /// The raw edge info region (used when copying a tile into a builder).
    pub(crate) fn edge_info_memory(&self) -> &[u8] {
        self.edge_info_memory
    }
}

impl GraphTile for GraphTileView<'_> {
    #[inline]
    fn graph_id(&self) -> GraphId {
        self.header.graph_id()
    }

    #[inline]
    fn may_contain_id(&self, id: GraphId) -> bool {
        id.tile_base_id() == self.graph_id()
    }

    #[inline]
    fn header(&self) -> &GraphTileHeader {
        self.header
    }

    fn get_node(&self, id: GraphId) -> Result<&NodeInfo, LookupError> {
        if self.may_contain_id(id) {
            self.nodes
                .get(id.index() as usize)
                .ok_or(LookupError::InvalidIndex)
        } else {
            Err(LookupError::MismatchedBase)
        }
    }

    fn get_outbound_edges_from_node(&self, node: &NodeInfo) -> &[DirectedEdge] {
        let start = node.edge_index() as usize;
        let end = start + node.edge_count() as usize;
        // Node ranges are validated when the view is constructed
        self.directed_edges.get(start..end).unwrap_or_default()
    }

    fn get_transitions(&self, node: &NodeInfo) -> &[NodeTransition] {
        let start = node.transition_index() as usize;
        let end = start + node.transition_count() as usize;
        self.transitions.get(start..end).unwrap_or_default()
    }

    fn get_directed_edge(&self, id: GraphId) -> Result<&DirectedEdge, LookupError> {
        if self.may_contain_id(id) {
            self.directed_edges
                .get(id.index() as usize)
                .ok_or(LookupError::InvalidIndex)
        } else {
            Err(LookupError::MismatchedBase)
        }
    }

    fn get_edge_info(
        &self,
        directed_edge: &DirectedEdge,
    ) -> Result<EdgeInfo<'_>, GraphTileDecodingError> {
        let offset = directed_edge.edge_info_offset() as usize;
        let bytes = self
            .edge_info_memory
            .get(offset..)
            .ok_or(GraphTileDecodingError::EdgeInfoOffset(offset))?;
        EdgeInfo::try_from(bytes)
    }

    #[inline]
    fn nodes(&self) -> &[NodeInfo] {
        self.nodes
    }

    #[inline]
    fn directed_edges(&self) -> &[DirectedEdge] {
        self.directed_edges
    }

    #[inline]
    fn transitions(&self) -> &[NodeTransition] {
        self.transitions
    }

    #[inline]
    fn size_bytes(&self) -> usize {
        self.memory.len()
    }
}

impl<'a> TryFrom<&'a [u8]> for GraphTileView<'a> {
    type Error = GraphTileDecodingError;

    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        let (header, buffer) = GraphTileHeader::ref_from_prefix(bytes)
            .map_err(|e| GraphTileDecodingError::CastError(e.to_string()))?;

        if header.version() != TILE_FORMAT_VERSION {
            return Err(GraphTileDecodingError::UnsupportedVersion(header.version()));
        }
        let graph_id = GraphId::try_from_id(header.raw_graph_id())?;
        if graph_id.tile_base_id() != graph_id {
            return Err(GraphTileDecodingError::NotATileId(graph_id));
        }

        // Consume each fixed-stride array in turn; the remainder is the next section
        let (nodes, buffer) =
            <[NodeInfo]>::ref_from_prefix_with_elems(buffer, header.node_count() as usize)
                .map_err(|e| GraphTileDecodingError::CastError(e.to_string()))?;
        let (transitions, buffer) = <[NodeTransition]>::ref_from_prefix_with_elems(
            buffer,
            header.transition_count() as usize,
        )
        .map_err(|e| GraphTileDecodingError::CastError(e.to_string()))?;
        let (directed_edges, buffer) = <[DirectedEdge]>::ref_from_prefix_with_elems(
            buffer,
            header.directed_edge_count() as usize,
        )
        .map_err(|e| GraphTileDecodingError::CastError(e.to_string()))?;
        let edge_info_memory = buffer
            .get(..header.edge_info_size() as usize)
            .ok_or(GraphTileDecodingError::SliceLength)?;

        for (index, node) in nodes.iter().enumerate() {
            let edge_end = node.edge_index() as usize + node.edge_count() as usize;
            if edge_end > directed_edges.len() {
                return Err(GraphTileDecodingError::NodeRangeOutOfBounds {
                    node: index,
                    kind: "directed edges",
                });
            }
            let transition_end =
                node.transition_index() as usize + node.transition_count() as usize;
            if transition_end > transitions.len() {
                return Err(GraphTileDecodingError::NodeRangeOutOfBounds {
                    node: index,
                    kind: "transitions",
                });
            }
        }

        for (index, edge) in directed_edges.iter().enumerate() {
            if EdgeUse::from_repr(edge.raw_use()).is_none() {
                return Err(GraphTileDecodingError::InvalidEdgeUse {
                    edge: index,
                    value: edge.raw_use(),
                });
            }
            let offset = edge.edge_info_offset() as usize;
            if offset >= edge_info_memory.len() {
                return Err(GraphTileDecodingError::EdgeInfoOffset(offset));
            }
        }

        Ok(Self {
            memory: bytes,
            header,
            nodes,
            transitions,
            directed_edges,
            edge_info_memory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Access;
    use enumset::EnumSet;
    use geo::coord;

    fn tile_id() -> GraphId {
        GraphId::try_from_components(1, 37_741, 0).unwrap()
    }

    fn sample_tile() -> Vec<u8> {
        let base = coord! { x: 1.0, y: 14.0 };
        let id = tile_id();
        let node = |index| id.with_index(index).unwrap();

        let mut builder = GraphTileBuilder::new(id, base);
        let attributes = EdgeAttributes {
            length: 120,
            forward_access: EnumSet::only(Access::Auto) | Access::Pedestrian,
            ..EdgeAttributes::default()
        };
        builder
            .add_node(NewNode {
                coordinate: coord! { x: 1.1, y: 14.1 },
                density: 3,
                edges: vec![NewEdge::new(node(1), 0, attributes.clone())
                    .with_shape(42, vec![coord! { x: 1.1, y: 14.1 }, coord! { x: 1.2, y: 14.1 }])],
                transitions: vec![GraphId::try_from_components(2, 762_485, 9).unwrap()],
            })
            .unwrap();
        builder
            .add_node(NewNode {
                coordinate: coord! { x: 1.2, y: 14.1 },
                density: 0,
                edges: vec![NewEdge::new(node(0), 0, attributes)
                    .with_shape(42, vec![coord! { x: 1.1, y: 14.1 }, coord! { x: 1.2, y: 14.1 }])
                    .reversed()],
                transitions: vec![],
            })
            .unwrap();
        builder.to_bytes()
    }

    #[test]
    fn parse_view() {
        let bytes = sample_tile();
        let view = GraphTileView::try_from(bytes.as_slice()).expect("Unable to parse tile");
        assert_eq!(view.graph_id(), tile_id());
        assert_eq!(view.nodes().len(), 2);
        assert_eq!(view.directed_edges().len(), 2);
        assert_eq!(view.transitions().len(), 1);
        assert_eq!(view.size_bytes(), bytes.len());

        let node = view.get_node(tile_id().with_index(0).unwrap()).unwrap();
        assert_eq!(node.density(), 3);
        let coordinate = node.coordinate(view.header().base());
        assert!((coordinate.x - 1.1).abs() < 1e-7);
        assert!((coordinate.y - 14.1).abs() < 1e-7);

        let edges = view.get_outbound_edges_from_node(node);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].length(), 120);
        assert_eq!(edges[0].end_node_id(), tile_id().with_index(1).unwrap());
        assert!(!edges[0].leaves_tile());

        let transitions = view.get_transitions(node);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].end_node_id().level(), 2);
        assert!(!transitions[0].up());
    }

    #[test]
    fn lookups() {
        let bytes = sample_tile();
        let view = GraphTileView::try_from(bytes.as_slice()).unwrap();

        let other_tile = GraphId::try_from_components(1, 37_742, 0).unwrap();
        assert_eq!(view.get_node(other_tile).err(), Some(LookupError::MismatchedBase));
        assert_eq!(
            view.get_directed_edge(tile_id().with_index(2).unwrap()).err(),
            Some(LookupError::InvalidIndex)
        );

        let opp = view.get_opp_edge_index(tile_id()).unwrap();
        assert_eq!(
            opp,
            OpposingEdgeIndex {
                end_node_id: tile_id().with_index(1).unwrap(),
                opposing_edge_index: 0
            }
        );
    }

    #[test]
    fn edge_info() {
        let bytes = sample_tile();
        let view = GraphTileView::try_from(bytes.as_slice()).unwrap();
        let forward = &view.directed_edges()[0];
        let reverse = &view.directed_edges()[1];
        assert!(forward.forward());
        assert!(!reverse.forward());
        // Both directions share the same edge info
        assert_eq!(forward.edge_info_offset(), reverse.edge_info_offset());

        let info = view.get_edge_info(forward).unwrap();
        assert_eq!(info.way_id(), 42);
        let shape = info.decode_shape().unwrap();
        assert_eq!(shape.0.len(), 2);
        assert!((shape.0[1].x - 1.2).abs() < 1e-6);
    }

    #[test]
    fn rejects_malformed_tiles() {
        let bytes = sample_tile();

        assert!(matches!(
            GraphTileView::try_from(&bytes[..10]),
            Err(GraphTileDecodingError::CastError(_))
        ));
        assert!(GraphTileView::try_from(&bytes[..bytes.len() - 1]).is_err());

        let mut wrong_version = bytes.clone();
        wrong_version[24] = 0xff;
        assert!(matches!(
            GraphTileView::try_from(wrong_version.as_slice()),
            Err(GraphTileDecodingError::UnsupportedVersion(_))
        ));
    }
}
