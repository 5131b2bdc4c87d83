//! Diagram statistics.

use crate::id::NodeId;
use crate::model::{Bounds, Document, NodeType};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramStats {
    pub nodes: usize,
    pub rectangles: usize,
    pub circles: usize,
    pub diamonds: usize,
    pub connections: usize,
    pub self_loops: usize,
    /// Nodes with no incoming or outgoing connection.
    pub isolated_nodes: usize,
    pub bounds: Option<Bounds>,
}

pub fn compute_stats(doc: &Document) -> DiagramStats {
    let mut stats = DiagramStats {
        nodes: doc.nodes.len(),
        connections: doc.connections.len(),
        bounds: doc.content_bounds(),
        ..Default::default()
    };

    for node in &doc.nodes {
        match node.kind {
            NodeType::Rectangle => stats.rectangles += 1,
            NodeType::Circle => stats.circles += 1,
            NodeType::Diamond => stats.diamonds += 1,
        }
    }

    let mut connected: HashSet<NodeId> = HashSet::new();
    for conn in &doc.connections {
        if conn.is_self_loop() {
            stats.self_loops += 1;
        }
        connected.insert(conn.from);
        connected.insert(conn.to);
    }
    stats.isolated_nodes = doc
        .nodes
        .iter()
        .filter(|n| !connected.contains(&n.id))
        .count();

    stats
}
