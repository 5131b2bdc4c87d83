//! Scene synchronizer: Document ↔ live scene.
//!
//! The synchronizer exclusively owns the live [`Scene`] and two registries
//! mapping diagram ids to their top-level units. Those registries are the
//! single source of truth for "does this id currently have a live visual".
//!
//! - **Document → Scene**: [`SceneSync::load_from_data`] rebuilds every unit
//!   from persisted attributes.
//! - **Scene → Document**: every structural mutation and every
//!   `ObjectMoving`/`ObjectModified` event re-derives the attached
//!   connectors, then recomputes the whole Document by walking the
//!   registries (never by patching) and hands it to the change callback.
//!
//! Consecutive drag steps form one gesture, closed by [`SceneSync::end_drag`]
//! or by any other mutation. A gesture that ends where it started leaves
//! `updated_at` untouched.

use fc_core::id::{ConnectionId, NodeId};
use fc_core::model::{Connection, Document, Node, NodeStyle, NodeType, Point};
use fc_render::units::{
    build_connection_unit, build_node_unit, connection_endpoints, node_parts, read_node_unit,
    update_connection_unit,
};
use fc_render::{
    EventKind, ExportError, ExportFormat, ObjectHandle, ObjectTag, Scene, SceneError, Viewport,
};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Receives the recomputed Document after every change.
pub type ChangeCallback = Box<dyn FnMut(&Document)>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot connect `{from}` to `{to}`: node not found")]
    NodesNotFound { from: NodeId, to: NodeId },
    #[error("non-finite position ({x}, {y})")]
    NonFinite { x: f32, y: f32 },
    #[error("render surface unavailable ({width}x{height})")]
    SurfaceUnavailable { width: u32, height: u32 },
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Dimensions of the render surface the scene is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A diagram element addressed through the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Node(NodeId),
    Connection(ConnectionId),
}

// ─── Registry ────────────────────────────────────────────────────────────

/// Insertion-ordered id → entry map.
struct Registry<K, V> {
    order: Vec<K>,
    entries: HashMap<K, V>,
}

impl<K: Copy + Eq + Hash, V> Registry<K, V> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, key: K, value: V) {
        if self.entries.insert(key, value).is_none() {
            self.order.push(key);
        }
    }

    fn remove(&mut self, key: K) -> Option<V> {
        let value = self.entries.remove(&key)?;
        self.order.retain(|k| *k != key);
        Some(value)
    }

    fn get(&self, key: K) -> Option<&V> {
        self.entries.get(&key)
    }

    fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    fn keys(&self) -> Vec<K> {
        self.order.clone()
    }

    fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (*k, v)))
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

struct ConnectionEntry {
    handle: ObjectHandle,
    /// Persisted attributes; `points` is refreshed on every recompute.
    connection: Connection,
}

// ─── Synchronizer ────────────────────────────────────────────────────────

pub struct SceneSync {
    scene: Scene,
    nodes: Registry<NodeId, ObjectHandle>,
    connections: Registry<ConnectionId, ConnectionEntry>,
    /// Connections touching each node.
    adjacency: HashMap<NodeId, SmallVec<[ConnectionId; 4]>>,
    /// Styles saved before a temporary highlight.
    highlights: HashMap<NodeId, NodeStyle>,
    document: Document,
    /// Document as it was before the current drag gesture.
    drag_origin: Option<Document>,
    on_change: Option<ChangeCallback>,
    zoom_limits: (f32, f32),
}

impl SceneSync {
    /// Attach to a surface and populate from `initial` (or an empty
    /// Document). A single attempt; retrying is the caller's business.
    pub fn initialize(
        surface: Surface,
        initial: Option<Document>,
        on_change: ChangeCallback,
    ) -> Result<Self, SyncError> {
        if surface.width == 0 || surface.height == 0 {
            return Err(SyncError::SurfaceUnavailable {
                width: surface.width,
                height: surface.height,
            });
        }

        let mut scene = Scene::new(surface.width, surface.height);
        scene.listen(EventKind::ObjectMoving);
        scene.listen(EventKind::ObjectModified);

        let mut sync = Self {
            scene,
            nodes: Registry::new(),
            connections: Registry::new(),
            adjacency: HashMap::new(),
            highlights: HashMap::new(),
            document: Document::new(),
            drag_origin: None,
            on_change: Some(on_change),
            zoom_limits: (0.1, 5.0),
        };
        if let Some(doc) = initial {
            sync.load_from_data(doc)?;
        }
        log::debug!(
            "scene attached to {}x{} surface ({} nodes)",
            surface.width,
            surface.height,
            sync.nodes.len()
        );
        Ok(sync)
    }

    pub fn with_zoom_limits(mut self, min: f32, max: f32) -> Self {
        self.zoom_limits = (min.min(max), max.max(min));
        self
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Whether a repaint is due; resets the flag.
    pub fn take_render_request(&mut self) -> bool {
        self.scene.take_render_request()
    }

    pub fn node_handle(&self, id: NodeId) -> Option<ObjectHandle> {
        self.nodes.get(id).copied()
    }

    pub fn connection_handle(&self, id: ConnectionId) -> Option<ObjectHandle> {
        self.connections.get(id).map(|e| e.handle)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys()
    }

    /// Current centre of a node's shape in canvas space.
    pub fn node_center(&self, id: NodeId) -> Option<Point> {
        let handle = self.node_handle(id)?;
        read_node_unit(&self.scene, handle).map(|v| v.center)
    }

    // ── Structural mutations ──

    pub fn add_node(&mut self, kind: NodeType, x: f32, y: f32) -> Result<NodeId, SyncError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(SyncError::NonFinite { x, y });
        }
        self.end_drag();
        let mut id = NodeId::generate();
        while self.nodes.contains(id) {
            id = NodeId::generate();
        }
        let node = Node::with_id(id, kind, x, y);
        let handle = build_node_unit(&mut self.scene, &node)?;
        self.nodes.insert(id, handle);
        log::debug!("add {} {id} at ({x}, {y})", kind.as_str());

        self.commit();
        Ok(id)
    }

    pub fn add_connection(&mut self, from: NodeId, to: NodeId) -> Result<ConnectionId, SyncError> {
        let (Some(from_center), Some(to_center)) = (self.node_center(from), self.node_center(to))
        else {
            return Err(SyncError::NodesNotFound { from, to });
        };
        self.end_drag();

        let mut id = ConnectionId::generate();
        while self.connections.contains(id) {
            id = ConnectionId::generate();
        }
        let connection = Connection::with_id(id, from, to);
        let handle = build_connection_unit(&mut self.scene, &connection, from_center, to_center)?;
        self.register_connection(connection, handle);
        log::debug!("connect {from} → {to} as {id}");

        self.commit();
        Ok(id)
    }

    /// Remove a node and every connection touching it. Unknown ids are
    /// ignored.
    pub fn remove_node(&mut self, id: NodeId) {
        self.end_drag();
        if self.drop_node(id) {
            self.commit();
        }
    }

    /// Remove a single connection. Unknown ids are ignored.
    pub fn remove_connection(&mut self, id: ConnectionId) {
        self.end_drag();
        if self.drop_connection(id) {
            self.commit();
        }
    }

    /// Delete every selected unit (nodes cascade), clear the selection and
    /// emit one change. Returns how many units were selected.
    pub fn delete_selected(&mut self) -> usize {
        let selected = self.selection();
        if selected.is_empty() {
            return 0;
        }
        self.end_drag();
        for element in &selected {
            match *element {
                Element::Node(id) => {
                    self.drop_node(id);
                }
                Element::Connection(id) => {
                    self.drop_connection(id);
                }
            }
        }
        self.scene.clear_selection();
        log::debug!("deleted {} selected units", selected.len());
        self.commit();
        selected.len()
    }

    /// Replace the scene with `document`. Does not invoke the change
    /// callback.
    pub fn load_from_data(&mut self, mut document: Document) -> Result<(), SyncError> {
        self.end_drag();
        self.scene.clear();
        self.nodes.clear();
        self.connections.clear();
        self.adjacency.clear();
        self.highlights.clear();

        let mut kept_nodes = Vec::with_capacity(document.nodes.len());
        for node in document.nodes {
            if self.nodes.contains(node.id) {
                log::warn!("skipping duplicate node {}", node.id);
                continue;
            }
            let handle = build_node_unit(&mut self.scene, &node)?;
            self.nodes.insert(node.id, handle);
            kept_nodes.push(node);
        }
        document.nodes = kept_nodes;

        let mut kept_connections = Vec::with_capacity(document.connections.len());
        for connection in document.connections {
            let (Some(from), Some(to)) = (
                self.node_center(connection.from),
                self.node_center(connection.to),
            ) else {
                log::warn!(
                    "skipping connection {} with unresolved endpoint ({} → {})",
                    connection.id,
                    connection.from,
                    connection.to
                );
                continue;
            };
            if self.connections.contains(connection.id) {
                log::warn!("skipping duplicate connection {}", connection.id);
                continue;
            }
            let handle = build_connection_unit(&mut self.scene, &connection, from, to)?;
            self.register_connection(connection.clone(), handle);
            kept_connections.push(connection);
        }
        document.connections = kept_connections;

        log::debug!(
            "loaded document {} ({} nodes, {} connections)",
            document.id,
            document.nodes.len(),
            document.connections.len()
        );
        self.document = document;
        self.scene.request_render();
        Ok(())
    }

    /// Defensive copy of the current Document.
    pub fn get_data(&self) -> Document {
        self.document.clone()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn export_as_image(&self, format: ExportFormat) -> Result<String, ExportError> {
        fc_render::export(&self.scene, format)
    }

    // ── User interaction ──

    /// Drag a node by a delta, as one step of the current gesture.
    /// Returns `false` for unknown ids and non-finite deltas.
    pub fn drag_node(&mut self, id: NodeId, dx: f32, dy: f32) -> bool {
        let Some(handle) = self.node_handle(id) else {
            return false;
        };
        if !dx.is_finite() || !dy.is_finite() {
            return false;
        }
        self.begin_drag();
        self.interact(|scene| scene.translate(handle, dx, dy))
    }

    /// Move a node's anchor to an absolute position, as one step of the
    /// current gesture.
    pub fn move_node_to(&mut self, id: NodeId, x: f32, y: f32) -> bool {
        let Some(handle) = self.node_handle(id) else {
            return false;
        };
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        self.begin_drag();
        self.interact(|scene| scene.move_to(handle, x, y))
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }

    /// Close the current drag gesture. Returns whether one was open.
    pub fn end_drag(&mut self) -> bool {
        self.drag_origin.take().is_some()
    }

    fn begin_drag(&mut self) {
        if self.drag_origin.is_none() {
            self.drag_origin = Some(self.document.clone());
        }
    }

    /// Drag a connector. It snaps back to its endpoints.
    pub fn drag_connection(&mut self, id: ConnectionId, dx: f32, dy: f32) -> bool {
        let Some(handle) = self.connection_handle(id) else {
            return false;
        };
        self.interact(|scene| scene.translate(handle, dx, dy))
    }

    /// Scale a node so its shape spans `width` × `height`.
    pub fn resize_node(&mut self, id: NodeId, width: f32, height: f32) -> bool {
        let Some(handle) = self.node_handle(id) else {
            return false;
        };
        let Some(base) = node_parts(&self.scene, handle)
            .0
            .and_then(|shape| self.scene.get(shape))
            .map(|obj| obj.shape.local_bounds())
        else {
            return false;
        };
        if !width.is_finite() || !height.is_finite() {
            return false;
        }
        if base.width() <= 0.0 || base.height() <= 0.0 || width <= 0.0 || height <= 0.0 {
            return false;
        }
        self.end_drag();
        let sx = width / base.width() as f32;
        let sy = height / base.height() as f32;
        self.interact(|scene| scene.scale_to(handle, sx, sy))
    }

    /// Replace a node's label.
    pub fn set_node_text(&mut self, id: NodeId, text: &str) -> bool {
        let Some(label) = self
            .node_handle(id)
            .and_then(|h| node_parts(&self.scene, h).1)
        else {
            return false;
        };
        self.end_drag();
        self.interact(|scene| scene.set_text(label, text))
    }

    fn interact(&mut self, f: impl FnOnce(&mut Scene) -> Result<(), SceneError>) -> bool {
        match f(&mut self.scene) {
            Ok(()) => {
                self.process_events();
                true
            }
            Err(e) => {
                log::warn!("interaction rejected: {e}");
                false
            }
        }
    }

    /// Handle pending scene events. Each move/modify event re-derives the
    /// connectors attached to its unit, requests a render and emits a
    /// recomputed Document.
    pub fn process_events(&mut self) -> usize {
        let events = self.scene.drain_events();
        for event in &events {
            match self.scene.get(event.target).and_then(|o| o.tag) {
                Some(ObjectTag::Node { id, .. }) => self.refresh_connections_of(id),
                Some(ObjectTag::Connection { id, .. }) => self.refresh_connection(id),
                None => continue,
            }
            self.scene.request_render();
            self.commit();
        }
        events.len()
    }

    /// Apply externally computed anchors as one change. Unknown ids are
    /// skipped. Returns how many nodes moved.
    pub fn apply_positions(&mut self, positions: &[(NodeId, Point)]) -> usize {
        self.end_drag();
        let mut moved = Vec::new();
        for &(id, anchor) in positions {
            let Some(handle) = self.node_handle(id) else {
                continue;
            };
            if let Some(group) = self.scene.get_mut(handle) {
                group.left = anchor.x;
                group.top = anchor.y;
                moved.push(id);
            }
        }
        for &id in &moved {
            self.refresh_connections_of(id);
        }
        if !moved.is_empty() {
            self.commit();
        }
        moved.len()
    }

    // ── Selection ──

    pub fn select(&mut self, ids: &[NodeId]) {
        let handles: Vec<_> = ids.iter().filter_map(|&id| self.node_handle(id)).collect();
        self.scene.set_selection(handles);
    }

    pub fn select_connection(&mut self, id: ConnectionId) {
        if let Some(handle) = self.connection_handle(id) {
            self.scene.set_selection([handle]);
        }
    }

    pub fn clear_selection(&mut self) {
        self.scene.clear_selection();
    }

    pub fn selection(&self) -> Vec<Element> {
        self.scene
            .selection()
            .iter()
            .filter_map(|&h| self.element_of(h))
            .collect()
    }

    /// The element under a screen point.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<Element> {
        fc_render::hit_test(&self.scene, x, y).and_then(|h| self.element_of(h))
    }

    fn element_of(&self, handle: ObjectHandle) -> Option<Element> {
        match self.scene.get(handle)?.tag? {
            ObjectTag::Node { id, .. } => Some(Element::Node(id)),
            ObjectTag::Connection { id, .. } => Some(Element::Connection(id)),
        }
    }

    // ── Highlight ──

    /// Temporarily restroke a node. The persisted style is kept aside and
    /// still reported in the Document.
    pub fn highlight_node(&mut self, id: NodeId, stroke: &str) -> bool {
        let Some(shape) = self
            .node_handle(id)
            .and_then(|h| node_parts(&self.scene, h).0)
        else {
            return false;
        };
        let Some(obj) = self.scene.get_mut(shape) else {
            return false;
        };
        let defaults = NodeStyle::default();
        self.highlights.entry(id).or_insert_with(|| NodeStyle {
            fill: obj.fill.clone().unwrap_or(defaults.fill),
            stroke: obj.stroke.clone().unwrap_or(defaults.stroke),
            stroke_width: obj.stroke_width,
        });
        obj.stroke = Some(stroke.to_string());
        obj.stroke_width += 1.0;
        true
    }

    /// Restore the style saved by [`highlight_node`](Self::highlight_node).
    pub fn clear_highlight(&mut self, id: NodeId) -> bool {
        let Some(saved) = self.highlights.remove(&id) else {
            return false;
        };
        let Some(obj) = self
            .node_handle(id)
            .and_then(|h| node_parts(&self.scene, h).0)
            .and_then(|shape| self.scene.get_mut(shape))
        else {
            return false;
        };
        obj.fill = Some(saved.fill);
        obj.stroke = Some(saved.stroke);
        obj.stroke_width = saved.stroke_width;
        true
    }

    pub fn is_highlighted(&self, id: NodeId) -> bool {
        self.highlights.contains_key(&id)
    }

    // ── View ──

    /// Resize the render surface. Document content is untouched.
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        self.scene.set_dimensions(width, height);
    }

    pub fn zoom(&self) -> f32 {
        self.scene.viewport().zoom
    }

    /// Zoom about the surface centre. Returns the applied (clamped) level.
    pub fn set_zoom(&mut self, level: f32) -> f32 {
        let (min, max) = self.zoom_limits;
        let level = if level.is_nan() { 1.0 } else { level.clamp(min, max) };
        let (cx, cy) = (
            self.scene.width() as f32 / 2.0,
            self.scene.height() as f32 / 2.0,
        );
        self.scene.zoom_to_point(level, cx, cy);
        level
    }

    /// Pan so the content is centred on the surface at the current zoom.
    pub fn center_view(&mut self) {
        let zoom = self.zoom();
        let (pan_x, pan_y) = match self.scene.content_bounds() {
            Some(b) => {
                let c = b.center();
                (
                    self.scene.width() as f32 / 2.0 - c.x as f32 * zoom,
                    self.scene.height() as f32 / 2.0 - c.y as f32 * zoom,
                )
            }
            None => (0.0, 0.0),
        };
        self.scene.set_viewport(Viewport { zoom, pan_x, pan_y });
    }

    /// Release listeners, the callback and every live unit. Idempotent.
    pub fn destroy(&mut self) {
        self.scene.unlisten_all();
        self.scene.clear();
        self.nodes.clear();
        self.connections.clear();
        self.adjacency.clear();
        self.highlights.clear();
        self.drag_origin = None;
        self.on_change = None;
    }

    // ── Internals ──

    fn register_connection(&mut self, connection: Connection, handle: ObjectHandle) {
        let (id, from, to) = (connection.id, connection.from, connection.to);
        self.connections
            .insert(id, ConnectionEntry { handle, connection });
        self.adjacency.entry(from).or_default().push(id);
        if to != from {
            self.adjacency.entry(to).or_default().push(id);
        }
    }

    /// Remove a node unit and cascade. No callback.
    fn drop_node(&mut self, id: NodeId) -> bool {
        let Some(handle) = self.nodes.remove(id) else {
            return false;
        };
        self.scene.remove(handle);
        self.highlights.remove(&id);
        for conn in self.adjacency.remove(&id).unwrap_or_default() {
            self.drop_connection(conn);
        }
        log::debug!("removed node {id}");
        true
    }

    /// Remove a connection unit. No callback.
    fn drop_connection(&mut self, id: ConnectionId) -> bool {
        let Some(entry) = self.connections.remove(id) else {
            return false;
        };
        self.scene.remove(entry.handle);
        for endpoint in [entry.connection.from, entry.connection.to] {
            if let Some(list) = self.adjacency.get_mut(&endpoint) {
                list.retain(|c| *c != id);
            }
        }
        log::debug!("removed connection {id}");
        true
    }

    fn refresh_connections_of(&mut self, node: NodeId) {
        let attached = self.adjacency.get(&node).cloned().unwrap_or_default();
        for id in attached {
            self.refresh_connection(id);
        }
    }

    /// Re-derive a connector from its endpoints' current centres.
    fn refresh_connection(&mut self, id: ConnectionId) {
        let Some(entry) = self.connections.get(id) else {
            return;
        };
        let (Some(from), Some(to)) = (
            self.node_center(entry.connection.from),
            self.node_center(entry.connection.to),
        ) else {
            return;
        };
        let (handle, connection) = (entry.handle, entry.connection.clone());
        if let Err(e) = update_connection_unit(&mut self.scene, handle, &connection, from, to) {
            log::warn!("could not update connection {id}: {e}");
        }
    }

    /// Build the full Document from the registries.
    fn recompute(&self) -> Document {
        let nodes = self
            .nodes
            .iter()
            .filter_map(|(id, &handle)| {
                let kind = match self.scene.get(handle)?.tag? {
                    ObjectTag::Node { kind, .. } => kind,
                    ObjectTag::Connection { .. } => return None,
                };
                let visual = read_node_unit(&self.scene, handle)?;
                Some(Node {
                    id,
                    kind,
                    text: visual.text,
                    position: visual.position,
                    size: visual.size,
                    style: self.highlights.get(&id).cloned().unwrap_or(visual.style),
                })
            })
            .collect();

        let connections = self
            .connections
            .iter()
            .map(|(_, entry)| {
                let mut connection = entry.connection.clone();
                if let Some((a, b)) = connection_endpoints(&self.scene, entry.handle) {
                    connection.points = Some([a.x, a.y, b.x, b.y]);
                }
                connection
            })
            .collect();

        Document {
            nodes,
            connections,
            ..self.document.clone()
        }
    }

    /// Replace the held Document with a recomputed one and notify. The
    /// timestamp only moves when content actually changed; a drag back to
    /// its starting point restores the pre-gesture timestamp.
    fn commit(&mut self) {
        let next = self.recompute();
        if let Some(origin) = &self.drag_origin
            && next.same_content(origin)
        {
            self.document = Document {
                updated_at: origin.updated_at,
                ..next
            };
        } else if !next.same_content(&self.document) {
            self.document = next;
            self.document.touch();
        }
        if let Some(callback) = self.on_change.as_mut() {
            callback(&self.document);
        }
    }
}
