//! Synthetic multi-tile networks for reader tests.
//!
//! Nodes are placed by coordinate and level; graph IDs, edge order and opposing indices
//! are assigned when the network is built, the same way a tile builder would.

use crate::graph_reader::{GraphReader, GraphReaderConfig};
use crate::graph_tile::{EdgeAttributes, GraphTileBuilder, NewEdge, NewNode};
use crate::tile_provider::InMemoryTileSource;
use crate::{GraphId, TileHierarchy};
use geo::Coord;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodeKey(usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeKey(usize);

struct TestNode {
    level: u8,
    coordinate: Coord<f64>,
    density: u8,
    transitions: Vec<NodeKey>,
}

struct TestEdge {
    from: NodeKey,
    to: NodeKey,
    opposing: EdgeKey,
    attributes: EdgeAttributes,
    shortcut_bit: Option<u8>,
    superseded_mask: u8,
    way_id: u64,
    /// Shape from `from` to `to` when `forward`, otherwise from `to` to `from`.
    shape: Vec<Coord<f64>>,
    forward: bool,
}

pub struct TestNetwork {
    hierarchy: Arc<TileHierarchy>,
    nodes: Vec<TestNode>,
    edges: Vec<TestEdge>,
}

/// A built network: the tiles plus the IDs assigned to each node and edge.
pub struct BuiltNetwork {
    pub hierarchy: Arc<TileHierarchy>,
    pub source: Arc<InMemoryTileSource>,
    node_ids: Vec<GraphId>,
    edge_ids: Vec<GraphId>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            hierarchy: Arc::new(TileHierarchy::standard()),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, level: u8, x: f64, y: f64) -> NodeKey {
        self.nodes.push(TestNode {
            level,
            coordinate: Coord { x, y },
            density: 0,
            transitions: Vec::new(),
        });
        NodeKey(self.nodes.len() - 1)
    }

    pub fn set_density(&mut self, node: NodeKey, density: u8) {
        self.nodes[node.0].density = density;
    }

    /// Adds a two-way road; returns the `a -> b` and `b -> a` edges.
    pub fn add_road(
        &mut self,
        a: NodeKey,
        b: NodeKey,
        attributes: EdgeAttributes,
    ) -> (EdgeKey, EdgeKey) {
        let shape = vec![self.nodes[a.0].coordinate, self.nodes[b.0].coordinate];
        self.add_pair(a, b, attributes, None, shape)
    }

    /// Adds a pair of shortcuts with the given bit over a chain of edges,
    /// along with the reverse shortcut over the opposing chain.
    ///
    /// Returns the forward and reverse shortcuts.
    pub fn add_shortcut(&mut self, chain: &[EdgeKey], bit: u8) -> (EdgeKey, EdgeKey) {
        let first = &self.edges[chain[0].0];
        let last = &self.edges[chain[chain.len() - 1].0];
        let (from, to) = (first.from, last.to);
        let mut attributes = first.attributes.clone();
        attributes.length = chain
            .iter()
            .map(|edge| self.edges[edge.0].attributes.length)
            .sum();
        let reverse_first = last.opposing;

        let shape = vec![self.nodes[from.0].coordinate, self.nodes[to.0].coordinate];
        let keys = self.add_pair(from, to, attributes, Some(bit), shape);
        self.edges[chain[0].0].superseded_mask |= 1 << bit;
        self.edges[reverse_first.0].superseded_mask |= 1 << bit;
        keys
    }

    /// Links the same location on two levels.
    pub fn add_transition(&mut self, a: NodeKey, b: NodeKey) {
        self.nodes[a.0].transitions.push(b);
        self.nodes[b.0].transitions.push(a);
    }

    pub fn attributes_mut(&mut self, edge: EdgeKey) -> &mut EdgeAttributes {
        &mut self.edges[edge.0].attributes
    }

    fn add_pair(
        &mut self,
        a: NodeKey,
        b: NodeKey,
        attributes: EdgeAttributes,
        shortcut_bit: Option<u8>,
        shape: Vec<Coord<f64>>,
    ) -> (EdgeKey, EdgeKey) {
        let forward = EdgeKey(self.edges.len());
        let reverse = EdgeKey(self.edges.len() + 1);
        let way_id = self.edges.len() as u64 + 1000;
        for (from, to, opposing, is_forward) in [(a, b, reverse, true), (b, a, forward, false)] {
            self.edges.push(TestEdge {
                from,
                to,
                opposing,
                attributes: attributes.clone(),
                shortcut_bit,
                superseded_mask: 0,
                way_id,
                shape: shape.clone(),
                forward: is_forward,
            });
        }
        (forward, reverse)
    }

    pub fn build(self) -> BuiltNetwork {
        // Outbound edges per node: shortcuts first, in bit order
        let mut outbound: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (index, edge) in self.edges.iter().enumerate() {
            outbound[edge.from.0].push(index);
        }
        for edges in &mut outbound {
            edges.sort_by_key(|edge| self.edges[*edge].shortcut_bit.unwrap_or(u8::MAX));
            for (position, edge) in edges.iter().enumerate() {
                if let Some(bit) = self.edges[*edge].shortcut_bit {
                    assert_eq!(usize::from(bit), position, "Shortcut bits must be dense");
                }
            }
        }

        let mut tiles: BTreeMap<GraphId, Vec<usize>> = BTreeMap::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let tile_id = self
                .hierarchy
                .graph_id_for(node.level, node.coordinate)
                .expect("Node outside the hierarchy");
            tiles.entry(tile_id).or_default().push(index);
        }

        let mut node_ids = vec![GraphId::INVALID; self.nodes.len()];
        let mut edge_ids = vec![GraphId::INVALID; self.edges.len()];
        for (tile_id, nodes) in &tiles {
            let mut next_edge = 0;
            for (position, node) in nodes.iter().enumerate() {
                node_ids[*node] = tile_id.with_index(position as u64).unwrap();
                for edge in &outbound[*node] {
                    edge_ids[*edge] = tile_id.with_index(next_edge).unwrap();
                    next_edge += 1;
                }
            }
        }

        let source = InMemoryTileSource::new();
        for (tile_id, nodes) in &tiles {
            let base = self.hierarchy.tile_base(*tile_id).unwrap();
            let mut builder = GraphTileBuilder::new(*tile_id, base);
            for node in nodes {
                let test_node = &self.nodes[*node];
                let edges = outbound[*node]
                    .iter()
                    .map(|edge| {
                        let test_edge = &self.edges[*edge];
                        let opposing_index = outbound[test_edge.to.0]
                            .iter()
                            .position(|candidate| *candidate == test_edge.opposing.0)
                            .unwrap();
                        let mut new_edge = NewEdge::new(
                            node_ids[test_edge.to.0],
                            opposing_index as u8,
                            test_edge.attributes.clone(),
                        )
                        .with_shape(test_edge.way_id, test_edge.shape.clone());
                        if !test_edge.forward {
                            new_edge = new_edge.reversed();
                        }
                        if let Some(bit) = test_edge.shortcut_bit {
                            new_edge = new_edge.shortcut(bit);
                        }
                        new_edge.superseded_mask = test_edge.superseded_mask;
                        new_edge
                    })
                    .collect();
                let node_id = builder
                    .add_node(NewNode {
                        coordinate: test_node.coordinate,
                        density: test_node.density,
                        edges,
                        transitions: test_node
                            .transitions
                            .iter()
                            .map(|other| node_ids[other.0])
                            .collect(),
                    })
                    .unwrap();
                assert_eq!(node_id, node_ids[*node]);
            }
            source.insert(*tile_id, builder.to_bytes());
        }

        BuiltNetwork {
            hierarchy: self.hierarchy,
            source: Arc::new(source),
            node_ids,
            edge_ids,
        }
    }
}

impl BuiltNetwork {
    pub fn node(&self, key: NodeKey) -> GraphId {
        self.node_ids[key.0]
    }

    pub fn edge(&self, key: EdgeKey) -> GraphId {
        self.edge_ids[key.0]
    }

    pub fn reader(&self) -> GraphReader<Arc<InMemoryTileSource>> {
        self.reader_with(GraphReaderConfig::default())
    }

    pub fn reader_with(&self, config: GraphReaderConfig) -> GraphReader<Arc<InMemoryTileSource>> {
        GraphReader::new(self.source.clone(), self.hierarchy.clone(), config)
    }
}

/// Keys into the chain fixture (see [`chain_fixture`]).
pub struct ChainFixture {
    pub network: BuiltNetwork,
    /// The chain nodes, west to east. The chain crosses a tile boundary between 1 and 2.
    pub chain_nodes: [NodeKey; 5],
    /// Chain edges in travel order, west to east.
    pub eastbound: [EdgeKey; 4],
    /// Chain edges in travel order, east to west.
    pub westbound: [EdgeKey; 4],
    pub shortcut_east: EdgeKey,
    pub shortcut_west: EdgeKey,
    /// Side roads at the chain ends (leaving the chain).
    pub side_west: EdgeKey,
    pub side_east: EdgeKey,
    /// The local-level node under chain node 2, and a local road leaving it.
    pub local_node: NodeKey,
    pub local_road: EdgeKey,
    /// A rail edge on the transit level.
    pub rail: EdgeKey,
}

pub const CHAIN_LENGTHS: [u32; 4] = [100, 200, 300, 400];

/// An arterial road of four edges under one shortcut in each direction,
/// with side roads at both ends, a transition to the local level in the middle,
/// and a disconnected rail line.
pub fn chain_fixture() -> ChainFixture {
    chain_fixture_with(|_, _| ())
}

/// Like [`chain_fixture`], with a hook to modify the network before it is built.
pub fn chain_fixture_with(
    customize: impl FnOnce(&mut TestNetwork, &[NodeKey; 5]),
) -> ChainFixture {
    let mut network = TestNetwork::new();
    let chain_nodes = [8.70, 8.85, 9.05, 9.20, 9.35].map(|x| network.add_node(1, x, 47.5));
    network.set_density(chain_nodes[1], 3);

    let chain_attributes = |length| EdgeAttributes {
        length,
        speed: 80,
        classification: crate::graph_tile::RoadClass::Primary,
        ..EdgeAttributes::default()
    };
    let mut eastbound = Vec::new();
    let mut westbound = Vec::new();
    for (pair, length) in chain_nodes.windows(2).zip(CHAIN_LENGTHS) {
        let (east, west) = network.add_road(pair[0], pair[1], chain_attributes(length));
        eastbound.push(east);
        westbound.push(west);
    }
    westbound.reverse();
    let (shortcut_east, shortcut_west) = network.add_shortcut(&eastbound, 0);

    let side_attributes = EdgeAttributes {
        length: 50,
        ..EdgeAttributes::default()
    };
    let west_end = network.add_node(1, 8.70, 47.6);
    let (side_west, _) = network.add_road(chain_nodes[0], west_end, side_attributes.clone());
    let east_end = network.add_node(1, 9.35, 47.6);
    let (side_east, _) = network.add_road(chain_nodes[4], east_end, side_attributes.clone());

    let local_node = network.add_node(2, 9.05, 47.5);
    let local_end = network.add_node(2, 9.10, 47.5);
    let (local_road, _) = network.add_road(local_node, local_end, side_attributes);
    network.add_transition(chain_nodes[2], local_node);

    let station_a = network.add_node(3, 9.06, 47.51);
    let station_b = network.add_node(3, 9.07, 47.51);
    let (rail, _) = network.add_road(
        station_a,
        station_b,
        EdgeAttributes {
            length: 900,
            edge_use: crate::graph_tile::EdgeUse::Rail,
            ..EdgeAttributes::default()
        },
    );

    customize(&mut network, &chain_nodes);

    ChainFixture {
        network: network.build(),
        chain_nodes,
        eastbound: eastbound.try_into().unwrap(),
        westbound: westbound.try_into().unwrap(),
        shortcut_east,
        shortcut_west,
        side_west,
        side_east,
        local_node,
        local_road,
        rail,
    }
}
