use super::edge_info::encode_edge_info;
use super::node::POSITION_PRECISION;
use super::{
    DirectedEdge, EdgeAttributes, GraphTile, GraphTileHeader, NodeInfo, NodeTransition,
    OwnedGraphTile,
};
use crate::GraphId;
use geo::Coord;
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;
use zerocopy::IntoBytes;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphTileBuildError {
    #[error("The node is outside the range addressable from the tile base.")]
    NodeOutOfRange,
    #[error("Too many {kind} at one node ({count}).")]
    TooManyAtNode { kind: &'static str, count: usize },
    #[error("The tile is full; no more {0} can be added.")]
    TileFull(&'static str),
    #[error("Field {field} is out of range ({value}).")]
    FieldOutOfRange { field: &'static str, value: u64 },
}

/// A directed edge to add to a tile.
#[derive(Clone, Debug)]
pub struct NewEdge {
    pub end_node: GraphId,
    /// The index of the opposing edge among the end node's outbound edges.
    pub opposing_edge_index: u8,
    /// False if the shape is stored in the opposite direction of travel.
    pub forward: bool,
    /// Nonzero (a single bit) for shortcuts.
    pub shortcut_mask: u8,
    /// Bits of the shortcuts leaving the same node that supersede this edge.
    pub superseded_mask: u8,
    pub attributes: EdgeAttributes,
    pub way_id: u64,
    /// The shape, in the stored direction (see `forward`).
    pub shape: Vec<Coord<f64>>,
}

impl NewEdge {
    pub fn new(end_node: GraphId, opposing_edge_index: u8, attributes: EdgeAttributes) -> Self {
        Self {
            end_node,
            opposing_edge_index,
            forward: true,
            shortcut_mask: 0,
            superseded_mask: 0,
            attributes,
            way_id: 0,
            shape: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_shape(mut self, way_id: u64, shape: Vec<Coord<f64>>) -> Self {
        self.way_id = way_id;
        self.shape = shape;
        self
    }

    /// Marks the stored shape as running against the direction of travel.
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.forward = false;
        self
    }

    /// Makes this edge the shortcut with the given bit.
    ///
    /// It must be stored at position `bit` among its node's edges.
    #[must_use]
    pub fn shortcut(mut self, bit: u8) -> Self {
        self.shortcut_mask = 1 << bit;
        self
    }

    /// Marks this edge as the first edge of the shortcut with the given bit.
    #[must_use]
    pub fn superseded_by(mut self, bit: u8) -> Self {
        self.superseded_mask |= 1 << bit;
        self
    }
}

/// A node to add to a tile, with its outbound edges and level transitions.
#[derive(Clone, Debug)]
pub struct NewNode {
    pub coordinate: Coord<f64>,
    pub density: u8,
    pub edges: Vec<NewEdge>,
    /// The same node on other levels.
    pub transitions: Vec<GraphId>,
}

/// A builder for new or copied graph tiles.
///
/// Building from an existing tile borrows its arrays;
/// they are copied lazily when nodes are added.
pub struct GraphTileBuilder<'a> {
    header: GraphTileHeader,
    nodes: Cow<'a, [NodeInfo]>,
    transitions: Cow<'a, [NodeTransition]>,
    directed_edges: Cow<'a, [DirectedEdge]>,
    edge_info_memory: Cow<'a, [u8]>,
    edge_info_offsets: HashMap<Vec<u8>, u32>,
}

impl<'a> From<&'a OwnedGraphTile> for GraphTileBuilder<'a> {
    fn from(value: &'a OwnedGraphTile) -> Self {
        let view = value.view();
        GraphTileBuilder {
            header: *view.header(),
            nodes: Cow::Borrowed(view.nodes()),
            transitions: Cow::Borrowed(view.transitions()),
            directed_edges: Cow::Borrowed(view.directed_edges()),
            edge_info_memory: Cow::Borrowed(view.edge_info_memory()),
            edge_info_offsets: HashMap::new(),
        }
    }
}

impl GraphTileBuilder<'_> {
    /// Starts an empty tile with the given base ID and south-west corner.
    pub fn new(graph_id: GraphId, base: Coord<f64>) -> Self {
        Self {
            header: GraphTileHeader::new(graph_id.tile_base_id(), base),
            nodes: Cow::Borrowed(&[]),
            transitions: Cow::Borrowed(&[]),
            directed_edges: Cow::Borrowed(&[]),
            edge_info_memory: Cow::Borrowed(&[]),
            edge_info_offsets: HashMap::new(),
        }
    }

    /// The ID that the next added node will get.
    pub fn next_node_id(&self) -> Result<GraphId, GraphTileBuildError> {
        self.header
            .graph_id()
            .with_index(self.nodes.len() as u64)
            .map_err(|_| GraphTileBuildError::TileFull("nodes"))
    }

    /// Appends a node with its edges and transitions, returning the node's ID.
    ///
    /// # Errors
    ///
    /// Fails if any value does not fit the tile format.
    /// The builder is left unchanged on failure.
    pub fn add_node(&mut self, node: NewNode) -> Result<GraphId, GraphTileBuildError> {
        let node_id = self.next_node_id()?;

        let base = self.header.base();
        let lon_offset = ((node.coordinate.x - base.x) * POSITION_PRECISION).round();
        let lat_offset = ((node.coordinate.y - base.y) * POSITION_PRECISION).round();
        let max_offset = f64::from(NodeInfo::MAX_OFFSET);
        if !(0.0..=max_offset).contains(&lon_offset) || !(0.0..=max_offset).contains(&lat_offset)
        {
            return Err(GraphTileBuildError::NodeOutOfRange);
        }
        if node.density > NodeInfo::MAX_DENSITY {
            return Err(GraphTileBuildError::FieldOutOfRange {
                field: "density",
                value: u64::from(node.density),
            });
        }
        if node.edges.len() > usize::from(NodeInfo::MAX_EDGE_COUNT) {
            return Err(GraphTileBuildError::TooManyAtNode {
                kind: "edges",
                count: node.edges.len(),
            });
        }
        if node.transitions.len() > usize::from(NodeInfo::MAX_TRANSITION_COUNT) {
            return Err(GraphTileBuildError::TooManyAtNode {
                kind: "transitions",
                count: node.transitions.len(),
            });
        }
        let edge_index = u32::try_from(self.directed_edges.len())
            .ok()
            .filter(|index| *index <= NodeInfo::MAX_EDGE_INDEX)
            .ok_or(GraphTileBuildError::TileFull("directed edges"))?;
        let transition_index = u32::try_from(self.transitions.len())
            .ok()
            .filter(|index| *index <= NodeInfo::MAX_EDGE_INDEX)
            .ok_or(GraphTileBuildError::TileFull("transitions"))?;
        for edge in &node.edges {
            check_edge(edge)?;
        }

        // Encode edge info before touching the arrays; a failure leaves the builder unchanged
        let mut next_offset = self.edge_info_memory.len();
        let mut new_blobs = Vec::new();
        let mut new_offsets = HashMap::new();
        let mut edge_offsets = Vec::with_capacity(node.edges.len());
        for edge in &node.edges {
            let mut encoded = Vec::new();
            encode_edge_info(edge.way_id, &edge.shape, &mut encoded);
            if let Some(offset) = self
                .edge_info_offsets
                .get(&encoded)
                .or_else(|| new_offsets.get(&encoded))
            {
                edge_offsets.push(*offset);
                continue;
            }
            let offset = u32::try_from(next_offset)
                .ok()
                .filter(|offset| *offset <= DirectedEdge::MAX_EDGE_INFO_OFFSET)
                .ok_or(GraphTileBuildError::TileFull("edge info"))?;
            next_offset += encoded.len();
            new_blobs.push(encoded.clone());
            new_offsets.insert(encoded, offset);
            edge_offsets.push(offset);
        }

        let tile_id = node_id.tile_base_id();
        let directed_edges = self.directed_edges.to_mut();
        for (edge, offset) in node.edges.iter().zip(edge_offsets) {
            let leaves_tile = !edge.end_node.same_tile(tile_id);
            directed_edges.push(DirectedEdge::pack(edge, leaves_tile, offset));
        }
        let node_level = node_id.level();
        self.transitions.to_mut().extend(
            node.transitions
                .iter()
                .map(|end_node| NodeTransition::new(*end_node, end_node.level() < node_level)),
        );
        self.nodes.to_mut().push(NodeInfo::new(
            lon_offset as u32,
            lat_offset as u32,
            node.density,
            edge_index,
            node.edges.len() as u8,
            transition_index,
            node.transitions.len() as u8,
        ));
        let edge_info_memory = self.edge_info_memory.to_mut();
        for blob in new_blobs {
            edge_info_memory.extend_from_slice(&blob);
        }
        self.edge_info_offsets.extend(new_offsets);

        Ok(node_id)
    }

    /// Serializes the tile.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = self.header;
        // Counts are bounded by the checks in add_node
        header.set_counts(
            self.nodes.len() as u32,
            self.directed_edges.len() as u32,
            self.transitions.len() as u32,
            self.edge_info_memory.len() as u32,
        );

        let mut result = Vec::with_capacity(
            size_of::<GraphTileHeader>()
                + self.nodes.as_bytes().len()
                + self.transitions.as_bytes().len()
                + self.directed_edges.as_bytes().len()
                + self.edge_info_memory.len(),
        );
        result.extend_from_slice(header.as_bytes());
        result.extend_from_slice(self.nodes.as_bytes());
        result.extend_from_slice(self.transitions.as_bytes());
        result.extend_from_slice(self.directed_edges.as_bytes());
        result.extend_from_slice(&self.edge_info_memory);
        result
    }
}

fn check_edge(edge: &NewEdge) -> Result<(), GraphTileBuildError> {
    let out_of_range = |field, value| Err(GraphTileBuildError::FieldOutOfRange { field, value });

    if !edge.end_node.is_valid() {
        return out_of_range("end_node", edge.end_node.value());
    }
    if edge.opposing_edge_index > DirectedEdge::MAX_OPP_INDEX {
        return out_of_range("opposing_edge_index", u64::from(edge.opposing_edge_index));
    }
    if edge.shortcut_mask.count_ones() > 1
        || edge.shortcut_mask >= 1 << (DirectedEdge::MAX_SHORTCUT_BIT + 1)
    {
        return out_of_range("shortcut_mask", u64::from(edge.shortcut_mask));
    }
    if edge.superseded_mask >= 1 << (DirectedEdge::MAX_SHORTCUT_BIT + 1) {
        return out_of_range("superseded_mask", u64::from(edge.superseded_mask));
    }
    if edge.attributes.length > DirectedEdge::MAX_LENGTH {
        return out_of_range("length", u64::from(edge.attributes.length));
    }
    Ok(())
}
