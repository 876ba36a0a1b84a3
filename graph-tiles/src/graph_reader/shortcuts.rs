//! Mapping between shortcuts and the chains of edges they supersede.

use super::{EdgeRef, GraphReader, GraphReaderError};
use crate::graph_tile::{DirectedEdge, GraphTile, GraphTileHandle};
use crate::tile_provider::TileSource;
use crate::{GraphId, SHORTCUT_ACCESS};
use std::collections::HashSet;

impl<S: TileSource> GraphReader<S> {
    /// Finds the shortcut that supersedes an edge.
    ///
    /// Walks backwards from the edge through nodes with exactly one other contractible edge
    /// until it reaches the edge that starts a shortcut.
    /// Shortcuts are returned unchanged.
    ///
    /// Returns `Ok(None)` on levels without shortcuts, when the chain branches or dead-ends,
    /// when it loops, or when it passes a node that starts other shortcuts.
    ///
    /// # Errors
    ///
    /// Fails if a tile cannot be loaded or the edge references are corrupt.
    pub fn get_shortcut(&self, edge_id: GraphId) -> Result<Option<GraphId>, GraphReaderError> {
        if !self.hierarchy.has_shortcuts(edge_id.level()) {
            return Ok(None);
        }
        let Some(edge) = self.directed_edge(edge_id)? else {
            return Ok(None);
        };
        if edge.edge().is_shortcut() {
            return Ok(Some(edge_id));
        }

        let Some(mut continuing) = self.opposing_edge_of(&edge)? else {
            return Ok(None);
        };
        let mut visited = HashSet::new();
        loop {
            // `continuing` runs backwards along the chain; its end node is where the
            // chain edge (in travel direction) starts.
            let node_id = continuing.edge().end_node_id();
            if !visited.insert(node_id) {
                return Ok(None);
            }
            let Some(tile) = self.tile_for(node_id, continuing.tile())? else {
                return Ok(None);
            };
            let node = tile.get_node(node_id)?;
            let chain_index = node.edge_index() + continuing.edge().opposing_edge_index();
            let chain_edge = tile.get_directed_edge(node_id.with_index(u64::from(chain_index))?)?;
            if let Some(bit) = chain_edge.superseded_index() {
                let shortcut_id = node_id.with_index(u64::from(node.edge_index() + bit))?;
                return Ok(Some(EdgeRef::new(tile, shortcut_id)?.graph_id()));
            }

            let outbound = tile.get_outbound_edges_from_node(node);
            if outbound.iter().any(DirectedEdge::is_shortcut) {
                return Ok(None);
            }
            let mut candidates = outbound
                .iter()
                .zip(node.edge_index()..)
                .filter(|(edge, index)| *index != chain_index && edge.can_form_shortcut());
            let (Some((_, next_index)), None) = (candidates.next(), candidates.next()) else {
                return Ok(None);
            };
            let next_id = node_id.with_index(u64::from(next_index))?;
            continuing = EdgeRef::new(tile.clone(), next_id)?;
        }
    }

    /// Expands a shortcut into the edges it supersedes, in travel order.
    ///
    /// Anything that is not a shortcut is returned as a one-element list.
    /// If the chain cannot be recovered unambiguously
    /// (no superseded edge, no match or several matches at a node, a loop,
    /// a missing tile, or a length that does not add up),
    /// the failure is logged and the shortcut alone is returned.
    ///
    /// # Errors
    ///
    /// Fails if a tile cannot be loaded or the edge references are corrupt.
    pub fn recover_shortcut(&self, shortcut_id: GraphId) -> Result<Vec<GraphId>, GraphReaderError> {
        let Some(shortcut_ref) = self.directed_edge(shortcut_id)? else {
            return Ok(vec![shortcut_id]);
        };
        let shortcut = shortcut_ref.edge();
        if !shortcut.is_shortcut() {
            return Ok(vec![shortcut_id]);
        }
        let shortcut_length = shortcut.length();
        let fail = |accumulated_length: u32,
                    reason: &'static str|
         -> Result<Vec<GraphId>, GraphReaderError> {
            tracing::error!(
                shortcut = %shortcut_id,
                accumulated_length,
                shortcut_length,
                reason,
                "Unable to recover shortcut"
            );
            Ok(vec![shortcut_id])
        };

        let tile = shortcut_ref.tile();
        let Some(begin_node_id) = owning_node(tile, shortcut_id) else {
            return fail(0, "no begin node");
        };
        let begin_node = tile.get_node(begin_node_id)?;
        let first = tile
            .get_outbound_edges_from_node(begin_node)
            .iter()
            .zip(begin_node.edge_index()..)
            .find(|(edge, _)| edge.superseded_mask() & shortcut.shortcut_mask() != 0);
        let Some((_, first_index)) = first else {
            return fail(0, "no superseded edge");
        };

        let first_id = begin_node_id.with_index(u64::from(first_index))?;
        let mut current = EdgeRef::new(tile.clone(), first_id)?;
        let mut edges = vec![first_id];
        let mut accumulated_length = current.edge().length();
        let mut previous_node_id = begin_node_id;
        let mut visited = HashSet::from([begin_node_id]);
        let shortcut_end = shortcut.end_node_id();

        while current.edge().end_node_id() != shortcut_end {
            let node_id = current.edge().end_node_id();
            if !visited.insert(node_id) {
                return fail(accumulated_length, "loop");
            }
            let Some(node_tile) = self.tile_for(node_id, current.tile())? else {
                return fail(accumulated_length, "missing tile");
            };
            let node = node_tile.get_node(node_id)?;
            let mut candidates = node_tile
                .get_outbound_edges_from_node(node)
                .iter()
                .zip(node.edge_index()..)
                .filter(|(edge, _)| {
                    edge.end_node_id() != previous_node_id && continues_shortcut(edge, shortcut)
                });
            let next_index = match (candidates.next(), candidates.next()) {
                (Some((_, index)), None) => index,
                (None, _) => return fail(accumulated_length, "no matching edge"),
                (Some(_), Some(_)) => return fail(accumulated_length, "ambiguous"),
            };

            let next_id = node_id.with_index(u64::from(next_index))?;
            current = EdgeRef::new(node_tile.clone(), next_id)?;
            accumulated_length += current.edge().length();
            edges.push(next_id);
            previous_node_id = node_id;
            if accumulated_length > shortcut_length {
                return fail(accumulated_length, "overrun");
            }
        }

        if accumulated_length != shortcut_length {
            return fail(accumulated_length, "length mismatch");
        }
        Ok(edges)
    }
}

/// The node whose outbound edge run contains `edge_id`.
fn owning_node(tile: &GraphTileHandle, edge_id: GraphId) -> Option<GraphId> {
    let nodes = tile.nodes();
    let position = nodes
        .partition_point(|node| u64::from(node.edge_index()) <= edge_id.index())
        .checked_sub(1)?;
    let node = &nodes[position];
    let end = u64::from(node.edge_index() + node.edge_count());
    if edge_id.index() >= end {
        return None;
    }
    edge_id.with_index(position as u64).ok()
}

/// True if `edge` carries the same attributes as the shortcut (speed excepted).
fn continues_shortcut(edge: &DirectedEdge, shortcut: &DirectedEdge) -> bool {
    !edge.is_shortcut()
        && edge.forward_access().contains(SHORTCUT_ACCESS)
        && edge.sign() == shortcut.sign()
        && edge.edge_use() == shortcut.edge_use()
        && edge.classification() == shortcut.classification()
        && edge.roundabout() == shortcut.roundabout()
        && edge.link() == shortcut.link()
        && edge.toll() == shortcut.toll()
        && edge.destination_only() == shortcut.destination_only()
        && edge.unpaved() == shortcut.unpaved()
        && edge.surface() == shortcut.surface()
}
