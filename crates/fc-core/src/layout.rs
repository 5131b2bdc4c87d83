//! Force-directed layout suggestions.
//!
//! Fruchterman–Reingold style: every pair of nodes repels, every connection
//! pulls its endpoints together, and a cooling temperature caps how far a
//! node may move per iteration. The result is a list of proposed anchors;
//! nothing here touches a live scene, so it is safe to run off the main
//! sequence and apply later.

use crate::id::NodeId;
use crate::model::{Document, Point};
use smallvec::SmallVec;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub iterations: u32,
    /// Ideal edge length in canvas units.
    pub spacing: f32,
    /// Maximum displacement in the first iteration.
    pub initial_temperature: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            iterations: 200,
            spacing: 220.0,
            initial_temperature: 120.0,
        }
    }
}

/// Propose new anchor positions for every node in `doc`.
///
/// Deterministic for a given document and config. Node order in the result
/// follows `doc.nodes`.
pub fn suggest_layout(doc: &Document, config: &LayoutConfig) -> Vec<(NodeId, Point)> {
    let n = doc.nodes.len();
    if n == 0 {
        return Vec::new();
    }

    let index: HashMap<NodeId, usize> = doc
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id, i))
        .collect();

    let mut neighbors: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); n];
    for conn in &doc.connections {
        let (Some(&a), Some(&b)) = (index.get(&conn.from), index.get(&conn.to)) else {
            continue;
        };
        if a != b {
            neighbors[a].push(b);
            neighbors[b].push(a);
        }
    }

    // Work on centres so shapes of different anchor kinds are treated alike.
    let mut pos: Vec<Point> = doc.nodes.iter().map(|node| node.center()).collect();
    let k = config.spacing.max(1.0);
    let iterations = config.iterations.max(1);

    for step in 0..iterations {
        let temperature = config.initial_temperature * (1.0 - step as f32 / iterations as f32);
        let mut disp = vec![Point::default(); n];

        for i in 0..n {
            for j in (i + 1)..n {
                let (dx, dy, dist) = separation(pos[i], pos[j], i, j);
                let force = k * k / dist;
                let (fx, fy) = (dx / dist * force, dy / dist * force);
                disp[i].x += fx;
                disp[i].y += fy;
                disp[j].x -= fx;
                disp[j].y -= fy;
            }
        }

        for (i, adj) in neighbors.iter().enumerate() {
            for &j in adj.iter().filter(|&&j| j > i) {
                let (dx, dy, dist) = separation(pos[i], pos[j], i, j);
                let force = dist * dist / k;
                let (fx, fy) = (dx / dist * force, dy / dist * force);
                disp[i].x -= fx;
                disp[i].y -= fy;
                disp[j].x += fx;
                disp[j].y += fy;
            }
        }

        for (p, d) in pos.iter_mut().zip(&disp) {
            let len = d.x.hypot(d.y);
            if len > f32::EPSILON {
                let capped = len.min(temperature);
                p.x += d.x / len * capped;
                p.y += d.y / len * capped;
            }
        }
    }

    doc.nodes
        .iter()
        .zip(pos)
        .map(|(node, center)| {
            let anchor = if node.kind.anchored_at_center() {
                center
            } else {
                Point::new(
                    center.x - node.size.width / 2.0,
                    center.y - node.size.height / 2.0,
                )
            };
            (node.id, anchor)
        })
        .collect()
}

/// Vector from `b` to `a` and its length. Coincident nodes are pushed apart
/// along a direction derived from their indices.
fn separation(a: Point, b: Point, i: usize, j: usize) -> (f32, f32, f32) {
    let (mut dx, mut dy) = (a.x - b.x, a.y - b.y);
    let mut dist = dx.hypot(dy);
    if dist < 0.01 {
        let angle = (i * 31 + j * 17) as f32;
        dx = angle.cos() * 0.01;
        dy = angle.sin() * 0.01;
        dist = 0.01;
    }
    (dx, dy, dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Connection, Node, NodeType};

    fn chain(n: usize) -> Document {
        let mut doc = Document::new();
        for i in 0..n {
            doc.nodes
                .push(Node::new(NodeType::Rectangle, i as f32 * 5.0, 0.0));
        }
        for i in 1..n {
            let (a, b) = (doc.nodes[i - 1].id, doc.nodes[i].id);
            doc.connections.push(Connection::new(a, b));
        }
        doc
    }

    #[test]
    fn empty_document_has_no_suggestions() {
        assert!(suggest_layout(&Document::new(), &LayoutConfig::default()).is_empty());
    }

    #[test]
    fn crowded_nodes_spread_out() {
        let doc = chain(4);
        let out = suggest_layout(&doc, &LayoutConfig::default());
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].0, doc.nodes[0].id);

        for i in 0..out.len() {
            for j in (i + 1)..out.len() {
                let d = out[i].1.distance(out[j].1);
                assert!(d > 50.0, "nodes {i} and {j} still overlap: {d}");
            }
        }
    }

    #[test]
    fn deterministic() {
        let doc = chain(3);
        let cfg = LayoutConfig::default();
        assert_eq!(suggest_layout(&doc, &cfg), suggest_layout(&doc, &cfg));
    }

    #[test]
    fn coincident_nodes_do_not_produce_nan() {
        let mut doc = Document::new();
        doc.nodes.push(Node::new(NodeType::Circle, 100.0, 100.0));
        doc.nodes.push(Node::new(NodeType::Circle, 100.0, 100.0));
        let out = suggest_layout(&doc, &LayoutConfig::default());
        assert!(out.iter().all(|(_, p)| p.x.is_finite() && p.y.is_finite()));
        assert!(out[0].1.distance(out[1].1) > 1.0);
    }
}
