//! Retained scene graph for the interactive canvas.
//!
//! The scene is a tree of [`SceneObject`]s stored in a `StableDiGraph`
//! (edges go parent → child). Top-level objects are the draggable units:
//! a node's shape and label are grouped under one parent, a connector's
//! line and arrowhead under another. Each object carries its own transform
//! (`left`/`top`, rotation, scale, origin) relative to its parent.
//!
//! User-driven interaction (`translate`, `scale_to`, `set_text`) raises
//! [`SceneEvent`]s for whichever [`EventKind`]s have a listener; the owner
//! drains them with [`Scene::drain_events`].

use fc_core::id::{ConnectionId, NodeId};
use fc_core::model::{NodeType, Point};
use kurbo::{Affine, Rect};
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Opaque reference to an object in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(NodeIndex);

#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    #[error("no scene object for {0:?}")]
    UnknownObject(ObjectHandle),
    #[error("object {0:?} cannot be scaled")]
    ScalingLocked(ObjectHandle),
    #[error("object {0:?} cannot be moved")]
    MovementLocked(ObjectHandle),
    #[error("object {0:?} is not editable text")]
    NotText(ObjectHandle),
    #[error("render surface {width}x{height} is unusable")]
    Surface { width: u32, height: u32 },
    #[error("image encoding failed: {0}")]
    Encode(String),
}

// ─── Objects ─────────────────────────────────────────────────────────────

/// Primitive geometry of an object, in the object's own coordinate space.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Container for child objects; has no geometry of its own.
    Group,
    Rectangle { width: f32, height: f32 },
    Ellipse { rx: f32, ry: f32 },
    Polygon { points: SmallVec<[Point; 4]> },
    Text { content: String, font_size: f32 },
    Line { from: Point, to: Point },
    /// Isosceles triangle with its apex at the top-centre.
    Triangle { width: f32, height: f32 },
}

/// Approximate advance width of a glyph relative to the font size.
const GLYPH_ASPECT: f32 = 0.6;
pub const LINE_HEIGHT: f32 = 1.2;

/// Estimated width of the longest line of `content`.
pub fn text_width(content: &str, font_size: f32) -> f32 {
    content
        .lines()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0) as f32
        * font_size
        * GLYPH_ASPECT
}

impl Shape {
    /// Untransformed bounds in the object's own coordinate space.
    pub fn local_bounds(&self) -> Rect {
        match self {
            Shape::Group => Rect::ZERO,
            Shape::Rectangle { width, height } | Shape::Triangle { width, height } => {
                Rect::new(0.0, 0.0, *width as f64, *height as f64)
            }
            Shape::Ellipse { rx, ry } => Rect::new(0.0, 0.0, *rx as f64 * 2.0, *ry as f64 * 2.0),
            Shape::Polygon { points } => points
                .iter()
                .map(|p| Rect::from_points((p.x as f64, p.y as f64), (p.x as f64, p.y as f64)))
                .reduce(|a, b| a.union(b))
                .unwrap_or(Rect::ZERO),
            Shape::Text { content, font_size } => {
                let lines = content.lines().count().max(1) as f32;
                Rect::new(
                    0.0,
                    0.0,
                    text_width(content, *font_size) as f64,
                    (lines * font_size * LINE_HEIGHT) as f64,
                )
            }
            Shape::Line { from, to } => Rect::from_points(
                (from.x as f64, from.y as f64),
                (to.x as f64, to.y as f64),
            ),
        }
    }
}

/// Which point of the local bounds `left`/`top` refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    #[default]
    TopLeft,
    Center,
}

/// Identity of the diagram element a top-level unit represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectTag {
    Node {
        id: NodeId,
        kind: NodeType,
    },
    Connection {
        id: ConnectionId,
        from: NodeId,
        to: NodeId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub shape: Shape,
    pub left: f32,
    pub top: f32,
    /// Rotation in degrees about the origin point.
    pub angle: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub origin: Origin,
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: f32,
    pub tag: Option<ObjectTag>,
    pub selectable: bool,
    pub lock_scaling: bool,
    pub lock_movement: bool,
    pub editable: bool,
}

impl SceneObject {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            left: 0.0,
            top: 0.0,
            angle: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            origin: Origin::TopLeft,
            fill: None,
            stroke: None,
            stroke_width: 1.0,
            tag: None,
            selectable: true,
            lock_scaling: false,
            lock_movement: false,
            editable: false,
        }
    }

    pub fn at(mut self, left: f32, top: f32) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    pub fn with_stroke(mut self, stroke: impl Into<String>, width: f32) -> Self {
        self.stroke = Some(stroke.into());
        self.stroke_width = width;
        self
    }

    pub fn rotated(mut self, degrees: f32) -> Self {
        self.angle = degrees;
        self
    }

    pub fn tagged(mut self, tag: ObjectTag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn locked_scaling(mut self) -> Self {
        self.lock_scaling = true;
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    /// Transform from this object's coordinate space into its parent's.
    pub fn local_transform(&self) -> Affine {
        let origin = match self.origin {
            Origin::TopLeft => Affine::IDENTITY,
            Origin::Center => {
                let c = self.shape.local_bounds().center();
                Affine::translate((-c.x, -c.y))
            }
        };
        Affine::translate((self.left as f64, self.top as f64))
            * Affine::rotate((self.angle as f64).to_radians())
            * Affine::scale_non_uniform(self.scale_x as f64, self.scale_y as f64)
            * origin
    }
}

// ─── Viewport ────────────────────────────────────────────────────────────

/// Zoom and pan applied when presenting the scene. Never affects object
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl Viewport {
    /// Canvas → screen.
    pub fn transform(&self) -> Affine {
        Affine::translate((self.pan_x as f64, self.pan_y as f64)) * Affine::scale(self.zoom as f64)
    }
}

// ─── Events ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A unit is being dragged.
    ObjectMoving,
    /// A unit was scaled or its text edited.
    ObjectModified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneEvent {
    pub kind: EventKind,
    /// Always the top-level unit containing the touched object.
    pub target: ObjectHandle,
}

// ─── Scene ───────────────────────────────────────────────────────────────

pub struct Scene {
    graph: StableDiGraph<SceneObject, ()>,
    root: NodeIndex,
    /// Paint (z) order of each parent's children, back to front.
    order: HashMap<NodeIndex, Vec<NodeIndex>>,
    width: u32,
    height: u32,
    viewport: Viewport,
    selection: Vec<ObjectHandle>,
    listeners: HashSet<EventKind>,
    events: Vec<SceneEvent>,
    render_requested: bool,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Self {
        let mut graph = StableDiGraph::new();
        let root = graph.add_node(SceneObject::new(Shape::Group));
        Self {
            graph,
            root,
            order: HashMap::new(),
            width,
            height,
            viewport: Viewport::default(),
            selection: Vec::new(),
            listeners: HashSet::new(),
            events: Vec::new(),
            render_requested: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resize the render surface. Objects are untouched.
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.render_requested = true;
    }

    // ── Structure ──

    /// Add a top-level object.
    pub fn add(&mut self, object: SceneObject) -> ObjectHandle {
        self.insert(self.root, object)
    }

    /// Add an object as the last child of `parent`.
    pub fn add_child(
        &mut self,
        parent: ObjectHandle,
        object: SceneObject,
    ) -> Result<ObjectHandle, SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::UnknownObject(parent));
        }
        Ok(self.insert(parent.0, object))
    }

    fn insert(&mut self, parent: NodeIndex, object: SceneObject) -> ObjectHandle {
        let idx = self.graph.add_node(object);
        self.graph.add_edge(parent, idx, ());
        self.order.entry(parent).or_default().push(idx);
        self.render_requested = true;
        ObjectHandle(idx)
    }

    /// Remove an object and its whole subtree. Returns the removed object.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<SceneObject> {
        if handle.0 == self.root || !self.contains(handle) {
            return None;
        }
        if let Some(parent) = self.parent_index(handle.0)
            && let Some(siblings) = self.order.get_mut(&parent)
        {
            siblings.retain(|&s| s != handle.0);
        }

        let mut stack = self.order.remove(&handle.0).unwrap_or_default();
        while let Some(idx) = stack.pop() {
            if let Some(children) = self.order.remove(&idx) {
                stack.extend(children);
            }
            self.graph.remove_node(idx);
        }
        self.selection.retain(|&s| s != handle);
        self.render_requested = true;
        self.graph.remove_node(handle.0)
    }

    /// Remove every object, the selection and any pending events.
    pub fn clear(&mut self) {
        for handle in self.top_level() {
            self.remove(handle);
        }
        self.selection.clear();
        self.events.clear();
        self.render_requested = true;
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.graph.contains_node(handle.0)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&SceneObject> {
        self.graph.node_weight(handle.0)
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut SceneObject> {
        self.render_requested = true;
        self.graph.node_weight_mut(handle.0)
    }

    /// Number of objects, excluding the implicit root.
    pub fn len(&self) -> usize {
        self.graph.node_count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Children of `handle` in paint order.
    pub fn children(&self, handle: ObjectHandle) -> Vec<ObjectHandle> {
        self.order
            .get(&handle.0)
            .map(|c| c.iter().copied().map(ObjectHandle).collect())
            .unwrap_or_default()
    }

    /// Top-level units in paint order (back to front).
    pub fn top_level(&self) -> Vec<ObjectHandle> {
        self.children(ObjectHandle(self.root))
    }

    fn parent_index(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .next()
    }

    /// Parent of `handle`, or `None` for top-level objects.
    pub fn parent(&self, handle: ObjectHandle) -> Option<ObjectHandle> {
        self.parent_index(handle.0)
            .filter(|&p| p != self.root)
            .map(ObjectHandle)
    }

    /// The top-level unit containing `handle`.
    pub fn unit_of(&self, handle: ObjectHandle) -> ObjectHandle {
        let mut current = handle;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Move a top-level unit to the end of the paint order.
    pub fn bring_to_front(&mut self, handle: ObjectHandle) {
        if let Some(siblings) = self.order.get_mut(&self.root)
            && let Some(pos) = siblings.iter().position(|&s| s == handle.0)
        {
            let idx = siblings.remove(pos);
            siblings.push(idx);
            self.render_requested = true;
        }
    }

    // ── Geometry ──

    /// Transform from `handle`'s coordinate space into canvas space.
    pub fn world_transform(&self, handle: ObjectHandle) -> Affine {
        let mut transform = Affine::IDENTITY;
        let mut current = Some(handle);
        while let Some(h) = current {
            if let Some(obj) = self.get(h) {
                transform = obj.local_transform() * transform;
            }
            current = self.parent(h);
        }
        transform
    }

    /// Canvas-space bounding box of an object and its descendants.
    pub fn world_bounds(&self, handle: ObjectHandle) -> Option<Rect> {
        let obj = self.get(handle)?;
        if matches!(obj.shape, Shape::Group) {
            return self
                .children(handle)
                .into_iter()
                .filter_map(|c| self.world_bounds(c))
                .reduce(|a, b| a.union(b));
        }
        Some(
            self.world_transform(handle)
                .transform_rect_bbox(obj.shape.local_bounds()),
        )
    }

    /// Bounding box of everything in the scene.
    pub fn content_bounds(&self) -> Option<Rect> {
        self.top_level()
            .into_iter()
            .filter_map(|h| self.world_bounds(h))
            .reduce(|a, b| a.union(b))
    }

    // ── Viewport ──

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.render_requested = true;
    }

    /// Zoom about a screen point, keeping the canvas point under it fixed.
    pub fn zoom_to_point(&mut self, level: f32, screen_x: f32, screen_y: f32) {
        let vp = self.viewport;
        let canvas_x = (screen_x - vp.pan_x) / vp.zoom;
        let canvas_y = (screen_y - vp.pan_y) / vp.zoom;
        self.set_viewport(Viewport {
            zoom: level,
            pan_x: screen_x - canvas_x * level,
            pan_y: screen_y - canvas_y * level,
        });
    }

    pub fn screen_to_canvas(&self, x: f32, y: f32) -> Point {
        let p = self.viewport.transform().inverse() * kurbo::Point::new(x as f64, y as f64);
        Point::new(p.x as f32, p.y as f32)
    }

    // ── Selection ──

    pub fn selection(&self) -> &[ObjectHandle] {
        &self.selection
    }

    /// Replace the selection. Only selectable top-level units are kept.
    pub fn set_selection(&mut self, handles: impl IntoIterator<Item = ObjectHandle>) {
        self.selection.clear();
        for h in handles {
            let unit = self.unit_of(h);
            let selectable = self.get(unit).is_some_and(|o| o.selectable);
            if selectable && !self.selection.contains(&unit) {
                self.selection.push(unit);
            }
        }
        self.render_requested = true;
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.render_requested = true;
    }

    // ── Interaction ──

    /// Drag a unit by a delta (canvas units).
    pub fn translate(&mut self, handle: ObjectHandle, dx: f32, dy: f32) -> Result<(), SceneError> {
        let unit = self.unit_of(handle);
        let obj = self
            .graph
            .node_weight_mut(unit.0)
            .ok_or(SceneError::UnknownObject(handle))?;
        if obj.lock_movement {
            return Err(SceneError::MovementLocked(unit));
        }
        obj.left += dx;
        obj.top += dy;
        self.emit(EventKind::ObjectMoving, unit);
        Ok(())
    }

    /// Drag a unit to an absolute position.
    pub fn move_to(&mut self, handle: ObjectHandle, left: f32, top: f32) -> Result<(), SceneError> {
        let unit = self.unit_of(handle);
        let (cur_left, cur_top) = self
            .get(unit)
            .map(|o| (o.left, o.top))
            .ok_or(SceneError::UnknownObject(handle))?;
        self.translate(unit, left - cur_left, top - cur_top)
    }

    /// Set a unit's scale factors.
    pub fn scale_to(&mut self, handle: ObjectHandle, sx: f32, sy: f32) -> Result<(), SceneError> {
        let unit = self.unit_of(handle);
        let obj = self
            .graph
            .node_weight_mut(unit.0)
            .ok_or(SceneError::UnknownObject(handle))?;
        if obj.lock_scaling {
            return Err(SceneError::ScalingLocked(unit));
        }
        obj.scale_x = sx;
        obj.scale_y = sy;
        self.emit(EventKind::ObjectModified, unit);
        Ok(())
    }

    /// Replace the content of an editable text object.
    pub fn set_text(&mut self, handle: ObjectHandle, text: &str) -> Result<(), SceneError> {
        let obj = self
            .graph
            .node_weight_mut(handle.0)
            .ok_or(SceneError::UnknownObject(handle))?;
        match &mut obj.shape {
            Shape::Text { content, .. } if obj.editable => *content = text.to_string(),
            _ => return Err(SceneError::NotText(handle)),
        }
        let unit = self.unit_of(handle);
        self.emit(EventKind::ObjectModified, unit);
        Ok(())
    }

    // ── Events ──

    pub fn listen(&mut self, kind: EventKind) {
        self.listeners.insert(kind);
    }

    pub fn unlisten(&mut self, kind: EventKind) {
        self.listeners.remove(&kind);
    }

    pub fn unlisten_all(&mut self) {
        self.listeners.clear();
        self.events.clear();
    }

    pub fn is_listening(&self, kind: EventKind) -> bool {
        self.listeners.contains(&kind)
    }

    fn emit(&mut self, kind: EventKind, target: ObjectHandle) {
        self.render_requested = true;
        if self.listeners.contains(&kind) {
            self.events.push(SceneEvent { kind, target });
        }
    }

    /// Take all pending events in the order they were raised.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    /// Whether a repaint is due; resets the flag.
    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.render_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(w: f32, h: f32) -> SceneObject {
        SceneObject::new(Shape::Rectangle {
            width: w,
            height: h,
        })
    }

    #[test]
    fn add_and_remove_subtree() {
        let mut scene = Scene::new(800, 600);
        let group = scene.add(SceneObject::new(Shape::Group).at(10.0, 10.0));
        let child = scene.add_child(group, rect(50.0, 20.0)).unwrap();
        let other = scene.add(rect(5.0, 5.0));
        assert_eq!(scene.len(), 3);
        assert_eq!(scene.top_level(), vec![group, other]);
        assert_eq!(scene.parent(child), Some(group));
        assert_eq!(scene.unit_of(child), group);

        scene.set_selection([child]);
        assert_eq!(scene.selection(), &[group]);

        assert!(scene.remove(group).is_some());
        assert!(!scene.contains(child));
        assert!(scene.selection().is_empty());
        assert_eq!(scene.top_level(), vec![other]);
        assert!(scene.remove(group).is_none());
    }

    #[test]
    fn world_bounds_follow_group_transform() {
        let mut scene = Scene::new(800, 600);
        let group = scene.add(SceneObject::new(Shape::Group).at(100.0, 50.0));
        scene.add_child(group, rect(40.0, 20.0)).unwrap();

        let b = scene.world_bounds(group).unwrap();
        assert_eq!((b.x0, b.y0, b.x1, b.y1), (100.0, 50.0, 140.0, 70.0));

        scene.scale_to(group, 2.0, 2.0).unwrap();
        let b = scene.world_bounds(group).unwrap();
        assert_eq!((b.x1, b.y1), (180.0, 90.0));
    }

    #[test]
    fn centered_origin_rotates_about_center() {
        let mut scene = Scene::new(800, 600);
        let tri = scene.add(
            SceneObject::new(Shape::Triangle {
                width: 10.0,
                height: 20.0,
            })
            .with_origin(Origin::Center)
            .at(100.0, 100.0)
            .rotated(90.0),
        );
        let b = scene.world_bounds(tri).unwrap();
        let c = b.center();
        assert!((c.x - 100.0).abs() < 1e-6 && (c.y - 100.0).abs() < 1e-6);
        assert!((b.width() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn events_only_for_listened_kinds() {
        let mut scene = Scene::new(800, 600);
        let group = scene.add(SceneObject::new(Shape::Group));
        let label = scene
            .add_child(
                group,
                SceneObject::new(Shape::Text {
                    content: "Text".into(),
                    font_size: 16.0,
                })
                .editable(),
            )
            .unwrap();

        scene.translate(group, 1.0, 1.0).unwrap();
        assert!(scene.drain_events().is_empty());

        scene.listen(EventKind::ObjectMoving);
        scene.listen(EventKind::ObjectModified);
        scene.translate(label, 5.0, 0.0).unwrap();
        scene.set_text(label, "Start").unwrap();
        let events = scene.drain_events();
        assert_eq!(
            events,
            vec![
                SceneEvent {
                    kind: EventKind::ObjectMoving,
                    target: group
                },
                SceneEvent {
                    kind: EventKind::ObjectModified,
                    target: group
                },
            ]
        );
        assert_eq!(scene.get(group).unwrap().left, 6.0);
    }

    #[test]
    fn locked_scaling_is_rejected() {
        let mut scene = Scene::new(800, 600);
        let unit = scene.add(SceneObject::new(Shape::Group).locked_scaling());
        assert_eq!(
            scene.scale_to(unit, 2.0, 2.0),
            Err(SceneError::ScalingLocked(unit))
        );
    }

    #[test]
    fn zoom_keeps_point_under_cursor() {
        let mut scene = Scene::new(800, 600);
        let before = scene.screen_to_canvas(400.0, 300.0);
        scene.zoom_to_point(2.0, 400.0, 300.0);
        let after = scene.screen_to_canvas(400.0, 300.0);
        assert!((before.x - after.x).abs() < 1e-4);
        assert!((before.y - after.y).abs() < 1e-4);
        assert_eq!(scene.viewport().zoom, 2.0);
    }
}
