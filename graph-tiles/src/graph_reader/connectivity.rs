//! Opposing edges, edge endpoints and adjacency tests.

use super::{EdgeRef, GraphReader, GraphReaderError};
use crate::GraphId;
use crate::graph_tile::{GraphTile, encode_polyline6};
use crate::tile_provider::TileSource;
use geo::{Coord, LineString, Rect};

impl<S: TileSource> GraphReader<S> {
    /// Resolves the opposing edge of `edge`.
    ///
    /// Returns `Ok(None)` for transit line edges and when the end node's tile does not exist.
    pub(crate) fn opposing_edge_of(
        &self,
        edge: &EdgeRef,
    ) -> Result<Option<EdgeRef>, GraphReaderError> {
        let directed_edge = edge.edge();
        if directed_edge.edge_use().is_transit_line() {
            return Ok(None);
        }
        let end_node_id = directed_edge.end_node_id();
        let Some(tile) = self.tile_for(end_node_id, edge.tile())? else {
            return Ok(None);
        };
        let node = tile.get_node(end_node_id)?;
        let opposing_id = end_node_id
            .with_index(u64::from(node.edge_index() + directed_edge.opposing_edge_index()))?;
        Ok(Some(EdgeRef::new(tile, opposing_id)?))
    }

    /// Gets the opposing edge (the same segment in the other direction of travel).
    ///
    /// Returns `Ok(None)` for transit line edges,
    /// or when the edge's tile or its end node's tile does not exist.
    ///
    /// # Errors
    ///
    /// Fails if a tile cannot be loaded or the edge references are corrupt.
    pub fn get_opposing_edge(&self, edge_id: GraphId) -> Result<Option<EdgeRef>, GraphReaderError> {
        match self.directed_edge(edge_id)? {
            Some(edge) => self.opposing_edge_of(&edge),
            None => Ok(None),
        }
    }

    /// Gets the ID of the opposing edge. See [`GraphReader::get_opposing_edge`].
    pub fn get_opposing_edge_id(
        &self,
        edge_id: GraphId,
    ) -> Result<Option<GraphId>, GraphReaderError> {
        Ok(self.get_opposing_edge(edge_id)?.map(|edge| edge.graph_id()))
    }

    /// The node an edge leads to.
    pub fn edge_end_node(&self, edge_id: GraphId) -> Result<Option<GraphId>, GraphReaderError> {
        Ok(self
            .directed_edge(edge_id)?
            .map(|edge| edge.edge().end_node_id()))
    }

    /// The node an edge starts from (the end node of its opposing edge).
    pub fn edge_start_node(&self, edge_id: GraphId) -> Result<Option<GraphId>, GraphReaderError> {
        match self.directed_edge(edge_id)? {
            Some(edge) => Ok(self.get_directed_edge_nodes(&edge)?.0),
            None => Ok(None),
        }
    }

    /// Both endpoints of an edge: `(start, end)`.
    ///
    /// The start node is `None` if the end node's tile does not exist.
    pub fn get_directed_edge_nodes(
        &self,
        edge: &EdgeRef,
    ) -> Result<(Option<GraphId>, GraphId), GraphReaderError> {
        let directed_edge = edge.edge();
        let end_node_id = directed_edge.end_node_id();
        let Some(tile) = self.tile_for(end_node_id, edge.tile())? else {
            return Ok((None, end_node_id));
        };
        let node = tile.get_node(end_node_id)?;
        let opposing_id = end_node_id
            .with_index(u64::from(node.edge_index() + directed_edge.opposing_edge_index()))?;
        let start_node_id = tile.get_directed_edge(opposing_id)?.end_node_id();
        Ok((Some(start_node_id), end_node_id))
    }

    /// True if `from` has a transition to `to` (which must be on another level).
    fn is_transition(&self, from: GraphId, to: GraphId) -> Result<bool, GraphReaderError> {
        if from.level() == to.level() {
            return Ok(false);
        }
        let Some(node) = self.node(from)? else {
            return Ok(false);
        };
        Ok(node
            .transitions()
            .iter()
            .any(|transition| transition.end_node_id() == to))
    }

    /// True if the two nodes are the same, or `a` transitions to `b`.
    fn same_or_transition(&self, a: GraphId, b: GraphId) -> Result<bool, GraphReaderError> {
        Ok(a == b || self.is_transition(a, b)?)
    }

    /// True if the two edges share a node, in either direction of travel.
    ///
    /// Nodes on different levels count as shared if one transitions to the other.
    ///
    /// # Errors
    ///
    /// Fails if a tile cannot be loaded or the edge references are corrupt.
    pub fn are_edges_connected(
        &self,
        edge1: GraphId,
        edge2: GraphId,
    ) -> Result<bool, GraphReaderError> {
        let (Some(de1), Some(de2)) = (self.directed_edge(edge1)?, self.directed_edge(edge2)?)
        else {
            return Ok(false);
        };
        let end1 = de1.edge().end_node_id();
        let end2 = de2.edge().end_node_id();
        if self.same_or_transition(end1, end2)? {
            return Ok(true);
        }

        let opp1_end = self
            .opposing_edge_of(&de1)?
            .map(|edge| edge.edge().end_node_id());
        if let Some(start1) = opp1_end
            && self.same_or_transition(start1, end2)?
        {
            return Ok(true);
        }

        let Some(start2) = self
            .opposing_edge_of(&de2)?
            .map(|edge| edge.edge().end_node_id())
        else {
            return Ok(false);
        };
        if self.same_or_transition(start2, end1)? {
            return Ok(true);
        }
        match opp1_end {
            Some(start1) => self.same_or_transition(start2, start1),
            None => Ok(false),
        }
    }

    /// True if `edge2` leaves the node that `edge1` arrives at (`edge1` then `edge2`).
    ///
    /// If `edge2` is on another level, the end node's transition to that level is followed.
    ///
    /// # Errors
    ///
    /// Fails if a tile cannot be loaded or the edge references are corrupt.
    pub fn are_edges_connected_forward(
        &self,
        edge1: GraphId,
        edge2: GraphId,
    ) -> Result<bool, GraphReaderError> {
        let Some(de1) = self.directed_edge(edge1)? else {
            return Ok(false);
        };
        let mut end_node_id = de1.edge().end_node_id();
        let Some(mut tile) = self.tile_for(end_node_id, de1.tile())? else {
            return Ok(false);
        };

        if edge2.level() != end_node_id.level() {
            let node = tile.get_node(end_node_id)?;
            let transition = tile
                .get_transitions(node)
                .iter()
                .map(|transition| transition.end_node_id())
                .find(|node_id| node_id.level() == edge2.level());
            if let Some(node_id) = transition {
                end_node_id = node_id;
                let Some(transition_tile) = self.get_graph_tile(node_id)? else {
                    return Ok(false);
                };
                tile = transition_tile;
            }
        }

        if !end_node_id.same_tile(edge2) {
            return Ok(false);
        }
        let node = tile.get_node(end_node_id)?;
        let first = u64::from(node.edge_index());
        let count = u64::from(node.edge_count());
        Ok((first..first + count).contains(&edge2.index()))
    }

    /// The density of the node an edge starts from, or zero if unavailable.
    ///
    /// # Errors
    ///
    /// Fails if a tile cannot be loaded or the edge references are corrupt.
    pub fn get_edge_density(&self, edge_id: GraphId) -> Result<u32, GraphReaderError> {
        let Some(opposing) = self.get_opposing_edge(edge_id)? else {
            return Ok(0);
        };
        let start_node_id = opposing.edge().end_node_id();
        let Some(tile) = self.tile_for(start_node_id, opposing.tile())? else {
            return Ok(0);
        };
        Ok(u32::from(tile.get_node(start_node_id)?.density()))
    }

    /// The shape of an edge in its direction of travel.
    ///
    /// # Errors
    ///
    /// Fails if a tile cannot be loaded or the edge info is corrupt.
    pub fn edge_shape(
        &self,
        edge_id: GraphId,
    ) -> Result<Option<LineString<f64>>, GraphReaderError> {
        let Some(edge) = self.directed_edge(edge_id)? else {
            return Ok(None);
        };
        let mut shape = edge.edge_info()?.decode_shape()?;
        if !edge.edge().forward() {
            shape.0.reverse();
        }
        Ok(Some(shape))
    }

    /// The shape of an edge in its direction of travel, as a polyline with six digits of precision.
    ///
    /// # Errors
    ///
    /// Fails if a tile cannot be loaded or the edge info is corrupt.
    pub fn encoded_edge_shape(&self, edge_id: GraphId) -> Result<Option<String>, GraphReaderError> {
        Ok(self.edge_shape(edge_id)?.map(|shape| encode_polyline6(&shape)))
    }

    /// The smallest box covering every node inside `bbox`
    /// along with the full shapes of the edges leaving those nodes.
    ///
    /// Scans every road level. The cache is trimmed between tiles when overcommitted.
    /// Returns `Ok(None)` if no node lies inside `bbox`.
    ///
    /// # Errors
    ///
    /// Fails if a tile cannot be loaded or is corrupt.
    pub fn get_minimum_bounding_box(
        &self,
        bbox: Rect<f64>,
    ) -> Result<Option<Rect<f64>>, GraphReaderError> {
        let mut min_bbox: Option<Rect<f64>> = None;
        let mut expand = |coord: Coord<f64>| {
            min_bbox = Some(match min_bbox {
                None => Rect::new(coord, coord),
                Some(rect) => Rect::new(
                    Coord {
                        x: rect.min().x.min(coord.x),
                        y: rect.min().y.min(coord.y),
                    },
                    Coord {
                        x: rect.max().x.max(coord.x),
                        y: rect.max().y.max(coord.y),
                    },
                ),
            });
        };

        for tile_id in self.hierarchy.graph_ids_in_bbox(bbox) {
            if self.over_committed() {
                self.trim()?;
            }
            let Some(tile) = self.get_graph_tile(tile_id)? else {
                continue;
            };
            let base = tile.header().base();
            for node in tile.nodes() {
                let coordinate = node.coordinate(base);
                if !rect_contains(bbox, coordinate) {
                    continue;
                }
                expand(coordinate);
                for edge in tile.get_outbound_edges_from_node(node) {
                    for point in tile.get_edge_info(edge)?.shape() {
                        expand(point?);
                    }
                }
            }
        }
        Ok(min_bbox)
    }
}

/// Closed containment (points on the boundary are inside).
fn rect_contains(rect: Rect<f64>, coord: Coord<f64>) -> bool {
    (rect.min().x..=rect.max().x).contains(&coord.x)
        && (rect.min().y..=rect.max().y).contains(&coord.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TileHierarchy;
    use crate::cache::EvictionPolicy;
    use crate::graph_reader::GraphReaderConfig;
    use crate::graph_tile::{EdgeAttributes, GraphTileBuilder, LookupError, NewEdge, NewNode};
    use crate::test_network::{EdgeKey, chain_fixture};
    use crate::tile_provider::InMemoryTileSource;
    use geo::coord;
    use std::sync::Arc;

    fn assert_close(actual: Coord<f64>, expected: Coord<f64>) {
        assert!(
            (actual.x - expected.x).abs() < 1e-6 && (actual.y - expected.y).abs() < 1e-6,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn opposing_edges() {
        let fixture = chain_fixture();
        let network = &fixture.network;
        let reader = network.reader();

        for (east, west) in fixture.eastbound.iter().zip(fixture.westbound.iter().rev()) {
            let (east, west) = (network.edge(*east), network.edge(*west));
            assert_eq!(reader.get_opposing_edge_id(east).unwrap(), Some(west));
            assert_eq!(reader.get_opposing_edge_id(west).unwrap(), Some(east));
        }
        assert_eq!(
            reader
                .get_opposing_edge_id(network.edge(fixture.shortcut_east))
                .unwrap(),
            Some(network.edge(fixture.shortcut_west))
        );
        for edge in [fixture.side_west, fixture.side_east, fixture.local_road] {
            let id = network.edge(edge);
            let opposing = reader.get_opposing_edge_id(id).unwrap().unwrap();
            assert_ne!(opposing, id);
            assert_eq!(reader.get_opposing_edge_id(opposing).unwrap(), Some(id));
        }

        // Transit lines have no opposing edge
        assert_eq!(
            reader.get_opposing_edge_id(network.edge(fixture.rail)).unwrap(),
            None
        );
    }

    #[test]
    fn opposing_edge_with_missing_end_tile() {
        let fixture = chain_fixture();
        let network = &fixture.network;
        network.source.remove(network.node(fixture.chain_nodes[2]));
        let reader = network.reader();

        // Crosses into the removed tile
        let crossing = network.edge(fixture.eastbound[1]);
        assert!(reader.get_opposing_edge(crossing).unwrap().is_none());
        assert_eq!(reader.edge_start_node(crossing).unwrap(), None);
        assert_eq!(
            reader.edge_end_node(crossing).unwrap(),
            Some(network.node(fixture.chain_nodes[2]))
        );
        // Lives in the removed tile
        assert!(
            reader
                .get_opposing_edge(network.edge(fixture.eastbound[2]))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn directed_edge_nodes_and_shapes() {
        let fixture = chain_fixture();
        let network = &fixture.network;
        let reader = network.reader();
        let [_, n1, n2, ..] = fixture.chain_nodes.map(|node| network.node(node));

        let crossing = network.edge(fixture.eastbound[1]);
        let edge = reader.directed_edge(crossing).unwrap().unwrap();
        assert!(edge.edge().leaves_tile());
        assert_eq!(reader.get_directed_edge_nodes(&edge).unwrap(), (Some(n1), n2));
        assert_eq!(reader.edge_start_node(crossing).unwrap(), Some(n1));
        assert_eq!(reader.edge_end_node(crossing).unwrap(), Some(n2));

        let eastbound = reader.edge_shape(crossing).unwrap().unwrap();
        assert_close(eastbound.0[0], coord! { x: 8.85, y: 47.5 });
        assert_close(eastbound.0[1], coord! { x: 9.05, y: 47.5 });

        // Shares the stored shape, oriented in its own direction of travel
        let westbound = reader
            .edge_shape(network.edge(fixture.westbound[2]))
            .unwrap()
            .unwrap();
        assert_close(westbound.0[0], coord! { x: 9.05, y: 47.5 });
        assert_close(westbound.0[1], coord! { x: 8.85, y: 47.5 });

        assert_eq!(
            reader.encoded_edge_shape(crossing).unwrap().as_deref(),
            Some("_mdryA_dd{O?_seK")
        );
        assert_eq!(
            reader
                .encoded_edge_shape(network.edge(fixture.westbound[2]))
                .unwrap()
                .as_deref(),
            Some("_mdryA_xjgP?~reK")
        );
    }

    #[test]
    fn undirected_connectivity() {
        let fixture = chain_fixture();
        let network = &fixture.network;
        let reader = network.reader();
        let edge = |key: EdgeKey| network.edge(key);
        let [e0, e1, e2, _] = fixture.eastbound.map(edge);
        let [_, _, _, w0] = fixture.westbound.map(edge);

        assert!(reader.are_edges_connected(e0, e1).unwrap());
        assert!(reader.are_edges_connected(e1, e0).unwrap());
        // Both leave the same node
        assert!(reader.are_edges_connected(e1, w0).unwrap());
        assert!(!reader.are_edges_connected(e0, e2).unwrap());

        // Through the transition at chain node 2, in either order
        let local = edge(fixture.local_road);
        assert_eq!(
            reader.edge_start_node(local).unwrap(),
            Some(network.node(fixture.local_node))
        );
        assert!(reader.are_edges_connected(e1, local).unwrap());
        assert!(reader.are_edges_connected(local, e1).unwrap());
        assert!(!reader.are_edges_connected(e0, local).unwrap());

        assert!(!reader.are_edges_connected(edge(fixture.rail), e1).unwrap());
    }

    #[test]
    fn forward_connectivity() {
        let fixture = chain_fixture();
        let network = &fixture.network;
        let reader = network.reader();
        let edge = |key: EdgeKey| network.edge(key);
        let [e0, e1, e2, _] = fixture.eastbound.map(edge);
        let [_, _, w2, _] = fixture.westbound.map(edge);

        assert!(reader.are_edges_connected_forward(e0, e1).unwrap());
        assert!(reader.are_edges_connected_forward(e1, e2).unwrap());
        assert!(!reader.are_edges_connected_forward(e1, e0).unwrap());
        assert!(!reader.are_edges_connected_forward(e0, e2).unwrap());
        // U-turn
        assert!(reader.are_edges_connected_forward(e1, w2).unwrap());

        let local = edge(fixture.local_road);
        assert!(reader.are_edges_connected_forward(e1, local).unwrap());
        assert!(!reader.are_edges_connected_forward(e0, local).unwrap());
    }

    #[test]
    fn edge_density() {
        let fixture = chain_fixture();
        let network = &fixture.network;
        let reader = network.reader();

        assert_eq!(
            reader.get_edge_density(network.edge(fixture.eastbound[1])).unwrap(),
            3
        );
        assert_eq!(
            reader.get_edge_density(network.edge(fixture.eastbound[0])).unwrap(),
            0
        );
        assert_eq!(reader.get_edge_density(network.edge(fixture.rail)).unwrap(), 0);
    }

    #[test]
    fn edge_density_with_corrupt_start_node() {
        let tile_id = GraphId::try_from_components(1, 100, 0).unwrap();
        let node = |index: u64| tile_id.with_index(index).unwrap();
        let mut builder = GraphTileBuilder::new(tile_id, coord! { x: 8.0, y: 47.0 });
        // The opposing edge of `node 0 -> node 1` points at a node the tile does not have
        for (from, to) in [(0, 1), (1, 5)] {
            builder
                .add_node(NewNode {
                    coordinate: coord! { x: 8.1 + from as f64 * 0.1, y: 47.1 },
                    density: 4,
                    edges: vec![NewEdge::new(node(to), 0, EdgeAttributes::default())],
                    transitions: vec![],
                })
                .unwrap();
        }
        let source: InMemoryTileSource = [(tile_id, builder.to_bytes())].into_iter().collect();
        let reader = GraphReader::new(
            source,
            Arc::new(TileHierarchy::standard()),
            GraphReaderConfig::default(),
        );

        assert!(matches!(
            reader.get_edge_density(node(0)),
            Err(GraphReaderError::GraphTileLookupError(LookupError::InvalidIndex))
        ));
    }

    #[test]
    fn minimum_bounding_box() {
        let fixture = chain_fixture();
        let reader = fixture.network.reader();

        // Only chain node 1 is inside, but its edges reach nodes 0 and 2
        let around_node = Rect::new(coord! { x: 8.8, y: 47.45 }, coord! { x: 8.9, y: 47.55 });
        let bbox = reader.get_minimum_bounding_box(around_node).unwrap().unwrap();
        assert_close(bbox.min(), coord! { x: 8.70, y: 47.5 });
        assert_close(bbox.max(), coord! { x: 9.05, y: 47.5 });

        let empty = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        assert_eq!(reader.get_minimum_bounding_box(empty).unwrap(), None);
    }

    #[test]
    fn minimum_bounding_box_under_memory_pressure() {
        let fixture = chain_fixture();
        let everything = Rect::new(coord! { x: 8.6, y: 47.4 }, coord! { x: 9.4, y: 47.7 });

        let roomy = fixture.network.reader();
        let tight = fixture.network.reader_with(GraphReaderConfig {
            max_cache_size: 1,
            eviction: EvictionPolicy::ClearAll,
        });
        let expected = roomy.get_minimum_bounding_box(everything).unwrap().unwrap();
        let bbox = tight.get_minimum_bounding_box(everything).unwrap().unwrap();
        assert_eq!(bbox, expected);
        assert_close(bbox.min(), coord! { x: 8.70, y: 47.5 });
        assert_close(bbox.max(), coord! { x: 9.35, y: 47.6 });
        assert!(tight.cache().is_empty().unwrap());
    }
}
