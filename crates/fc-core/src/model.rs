//! Serializable flowchart document model.
//!
//! A [`Document`] is a flat list of [`Node`]s (shapes) and [`Connection`]s
//! (directed arrows between node ids). It is pure data: the live, interactive
//! representation lives in the scene graph owned by the synchronizer, and
//! this model is what gets snapshotted, persisted and shared.
//!
//! The JSON form uses camelCase keys (`strokeWidth`, `createdAt`) and `type`
//! for the shape kind, matching documents written by earlier releases.

use crate::id::{ConnectionId, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// ─── Colors ──────────────────────────────────────────────────────────────

/// RGBA color. Stored as 4 × f32 [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Helper to parse a single hex digit.
fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse a CSS-ish color: `#RGB`, `#RRGGBB`, `#RRGGBBAA`, or the keywords
    /// `transparent` / `none`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("transparent") || s.eq_ignore_ascii_case("none") {
            return Some(Self::TRANSPARENT);
        }
        Self::from_hex(s)
    }

    /// Parse a hex color string. The string may optionally start with `#`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let bytes = hex.as_bytes();

        match bytes.len() {
            3 => {
                let r = hex_val(bytes[0])?;
                let g = hex_val(bytes[1])?;
                let b = hex_val(bytes[2])?;
                Some(Self::rgba(
                    (r * 17) as f32 / 255.0,
                    (g * 17) as f32 / 255.0,
                    (b * 17) as f32 / 255.0,
                    1.0,
                ))
            }
            6 | 8 => {
                let byte = |i: usize| -> Option<u8> {
                    Some(hex_val(bytes[i])? << 4 | hex_val(bytes[i + 1])?)
                };
                let a = if bytes.len() == 8 { byte(6)? } else { 255 };
                Some(Self::rgba(
                    byte(0)? as f32 / 255.0,
                    byte(2)? as f32 / 255.0,
                    byte(4)? as f32 / 255.0,
                    a as f32 / 255.0,
                ))
            }
            _ => None,
        }
    }

    /// Channels as 8-bit values.
    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            (self.r * 255.0).round() as u8,
            (self.g * 255.0).round() as u8,
            (self.b * 255.0).round() as u8,
            (self.a * 255.0).round() as u8,
        ]
    }

    /// Emit as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(&self) -> String {
        let [r, g, b, a] = self.to_rgba8();
        if a == 255 {
            format!("#{r:02x}{g:02x}{b:02x}")
        } else {
            format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

// ─── Geometry ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned bounding box in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Check if this bounds intersects with a rectangle (AABB overlap).
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Bounds {
            x,
            y,
            width: (self.x + self.width).max(other.x + other.width) - x,
            height: (self.y + self.height).max(other.y + other.height) - y,
        }
    }

    pub fn inflate(&self, pad: f32) -> Bounds {
        Bounds {
            x: self.x - pad,
            y: self.y - pad,
            width: self.width + pad * 2.0,
            height: self.height + pad * 2.0,
        }
    }
}

// ─── Nodes ───────────────────────────────────────────────────────────────

/// Shape of a node. Fixed at creation; there is no shape morphing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Rectangle,
    Circle,
    Diamond,
}

impl NodeType {
    pub const ALL: [NodeType; 3] = [NodeType::Rectangle, NodeType::Circle, NodeType::Diamond];

    /// Size given to freshly placed nodes of this type.
    pub const fn default_size(self) -> Size {
        match self {
            NodeType::Rectangle => Size::new(150.0, 80.0),
            NodeType::Circle => Size::new(100.0, 100.0),
            NodeType::Diamond => Size::new(120.0, 120.0),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            NodeType::Rectangle => "rectangle",
            NodeType::Circle => "circle",
            NodeType::Diamond => "diamond",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rectangle" | "rect" => Some(NodeType::Rectangle),
            "circle" | "ellipse" => Some(NodeType::Circle),
            "diamond" => Some(NodeType::Diamond),
            _ => None,
        }
    }

    /// Whether `position` is the shape's centre rather than its top-left.
    pub const fn anchored_at_center(self) -> bool {
        matches!(self, NodeType::Circle)
    }
}

pub const DEFAULT_NODE_TEXT: &str = "Text";
pub const DEFAULT_FILL: &str = "#ffffff";
pub const DEFAULT_STROKE: &str = "#333333";
pub const DEFAULT_STROKE_WIDTH: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStyle {
    pub fill: String,
    pub stroke: String,
    pub stroke_width: f32,
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            fill: DEFAULT_FILL.into(),
            stroke: DEFAULT_STROKE.into(),
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }
}

/// A shape placed on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NodeRepr")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub text: String,
    /// Top-left for rectangle/diamond, centre for circle.
    pub position: Point,
    pub size: Size,
    pub style: NodeStyle,
}

/// Wire form of a node; `size`, `style` and `text` may be absent in older
/// documents and fall back to the type defaults.
#[derive(Deserialize)]
struct NodeRepr {
    id: NodeId,
    #[serde(rename = "type")]
    kind: NodeType,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    position: Point,
    #[serde(default)]
    size: Option<Size>,
    #[serde(default)]
    style: Option<NodeStyle>,
}

impl From<NodeRepr> for Node {
    fn from(r: NodeRepr) -> Self {
        Node {
            id: r.id,
            kind: r.kind,
            text: r.text.unwrap_or_else(|| DEFAULT_NODE_TEXT.into()),
            position: r.position,
            size: r.size.unwrap_or(r.kind.default_size()),
            style: r.style.unwrap_or_default(),
        }
    }
}

impl Node {
    /// A node with a fresh id, type-default size, default text and style.
    pub fn new(kind: NodeType, x: f32, y: f32) -> Self {
        Self::with_id(NodeId::generate(), kind, x, y)
    }

    pub fn with_id(id: NodeId, kind: NodeType, x: f32, y: f32) -> Self {
        Self {
            id,
            kind,
            text: DEFAULT_NODE_TEXT.into(),
            position: Point::new(x, y),
            size: kind.default_size(),
            style: NodeStyle::default(),
        }
    }

    /// Bounding box in canvas coordinates, honoring the anchor rule.
    pub fn bounds(&self) -> Bounds {
        let (x, y) = if self.kind.anchored_at_center() {
            (
                self.position.x - self.size.width / 2.0,
                self.position.y - self.size.height / 2.0,
            )
        } else {
            (self.position.x, self.position.y)
        };
        Bounds {
            x,
            y,
            width: self.size.width,
            height: self.size.height,
        }
    }

    /// The point connectors attach to.
    pub fn center(&self) -> Point {
        self.bounds().center()
    }
}

// ─── Connections ─────────────────────────────────────────────────────────

fn default_arrow() -> bool {
    true
}

fn default_stroke() -> String {
    DEFAULT_STROKE.into()
}

fn default_stroke_width() -> f32 {
    DEFAULT_STROKE_WIDTH
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub from: NodeId,
    pub to: NodeId,
    /// Cached endpoint geometry `[x1, y1, x2, y2]` from the last render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<[f32; 4]>,
    #[serde(default = "default_stroke")]
    pub stroke: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f32,
    /// Draw an arrowhead at the `to` end.
    #[serde(default = "default_arrow")]
    pub arrow: bool,
}

impl Connection {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self::with_id(ConnectionId::generate(), from, to)
    }

    pub fn with_id(id: ConnectionId, from: NodeId, to: NodeId) -> Self {
        Self {
            id,
            from,
            to,
            points: None,
            stroke: DEFAULT_STROKE.into(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            arrow: true,
        }
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.from == node || self.to == node
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

// ─── Document ────────────────────────────────────────────────────────────

pub const DEFAULT_DOCUMENT_NAME: &str = "Untitled Flowchart";

/// Persistence bookkeeping injected at save/share time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Epoch milliseconds of the last save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

fn fresh_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_document_name() -> String {
    DEFAULT_DOCUMENT_NAME.into()
}

/// The complete diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default = "fresh_document_id")]
    pub id: String,
    #[serde(default = "default_document_name")]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural problems found by [`Document::validate`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("duplicate node id `{0}`")]
    DuplicateNode(NodeId),
    #[error("duplicate connection id `{0}`")]
    DuplicateConnection(ConnectionId),
    #[error("connection `{connection}` references missing node `{node}`")]
    DanglingConnection {
        connection: ConnectionId,
        node: NodeId,
    },
    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Document {
    /// An empty document stamped with a fresh id and the current time.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: fresh_document_id(),
            name: DEFAULT_DOCUMENT_NAME.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Connections that start or end at `node`.
    pub fn connections_of(&self, node: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.touches(node))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }

    /// Stamp `updated_at` with the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// True when nodes and connections are equal, ignoring identity,
    /// timestamps and metadata.
    pub fn same_content(&self, other: &Document) -> bool {
        self.nodes == other.nodes && self.connections == other.connections
    }

    /// Check id uniqueness and that every connection endpoint resolves.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut node_ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !node_ids.insert(node.id) {
                return Err(ModelError::DuplicateNode(node.id));
            }
        }
        let mut conn_ids = HashSet::with_capacity(self.connections.len());
        for conn in &self.connections {
            if !conn_ids.insert(conn.id) {
                return Err(ModelError::DuplicateConnection(conn.id));
            }
            for endpoint in [conn.from, conn.to] {
                if !node_ids.contains(&endpoint) {
                    return Err(ModelError::DanglingConnection {
                        connection: conn.id,
                        node: endpoint,
                    });
                }
            }
        }
        Ok(())
    }

    /// Drop connections whose endpoints are missing. Returns how many were removed.
    pub fn prune_dangling(&mut self) -> usize {
        let ids: HashSet<NodeId> = self.nodes.iter().map(|n| n.id).collect();
        let before = self.connections.len();
        self.connections
            .retain(|c| ids.contains(&c.from) && ids.contains(&c.to));
        before - self.connections.len()
    }

    /// Bounding box of all nodes, or `None` for an empty document.
    pub fn content_bounds(&self) -> Option<Bounds> {
        self.nodes
            .iter()
            .map(Node::bounds)
            .reduce(|acc, b| acc.union(&b))
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }
}
