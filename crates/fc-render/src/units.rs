//! Visual units for diagram elements.
//!
//! A node unit is a group holding the shape primitive and an editable,
//! centred text label. A connection unit is a group holding the connector
//! line and, when the connection has an arrow and a defined bearing, an
//! arrowhead triangle at the `to` end. Both live at the top level of the
//! scene and carry an [`ObjectTag`] identifying the diagram element.

use crate::scene::{ObjectHandle, ObjectTag, Origin, Scene, SceneError, SceneObject, Shape};
use fc_core::model::{Connection, Node, NodeStyle, NodeType, Point, Size};
use smallvec::smallvec;

pub const LABEL_FONT_SIZE: f32 = 16.0;
pub const LABEL_COLOR: &str = "#333333";
pub const ARROW_WIDTH: f32 = 15.0;
pub const ARROW_HEIGHT: f32 = 15.0;

/// Build and add the unit for `node`.
pub fn build_node_unit(scene: &mut Scene, node: &Node) -> Result<ObjectHandle, SceneError> {
    let Size { width, height } = node.size;
    let group = scene.add(
        SceneObject::new(Shape::Group)
            .at(node.position.x, node.position.y)
            .tagged(ObjectTag::Node {
                id: node.id,
                kind: node.kind,
            }),
    );

    let (shape, left, top) = match node.kind {
        NodeType::Rectangle => (Shape::Rectangle { width, height }, 0.0, 0.0),
        NodeType::Circle => (
            Shape::Ellipse {
                rx: width / 2.0,
                ry: height / 2.0,
            },
            -width / 2.0,
            -height / 2.0,
        ),
        NodeType::Diamond => (
            Shape::Polygon {
                points: smallvec![
                    Point::new(width / 2.0, 0.0),
                    Point::new(width, height / 2.0),
                    Point::new(width / 2.0, height),
                    Point::new(0.0, height / 2.0),
                ],
            },
            0.0,
            0.0,
        ),
    };
    scene.add_child(
        group,
        SceneObject::new(shape)
            .at(left, top)
            .with_fill(node.style.fill.clone())
            .with_stroke(node.style.stroke.clone(), node.style.stroke_width),
    )?;

    let (label_x, label_y) = if node.kind.anchored_at_center() {
        (0.0, 0.0)
    } else {
        (width / 2.0, height / 2.0)
    };
    scene.add_child(
        group,
        SceneObject::new(Shape::Text {
            content: node.text.clone(),
            font_size: LABEL_FONT_SIZE,
        })
        .at(label_x, label_y)
        .with_origin(Origin::Center)
        .with_fill(LABEL_COLOR)
        .editable(),
    )?;
    Ok(group)
}

/// A node unit's current state, read back from the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeVisual {
    /// Group position: top-left or centre depending on the node type.
    pub position: Point,
    /// Base shape size multiplied by the group's scale.
    pub size: Size,
    pub text: String,
    pub style: NodeStyle,
    /// Centre of the shape in canvas space.
    pub center: Point,
}

/// The shape primitive and the label of a node unit.
pub fn node_parts(scene: &Scene, unit: ObjectHandle) -> (Option<ObjectHandle>, Option<ObjectHandle>) {
    let mut shape = None;
    let mut label = None;
    for child in scene.children(unit) {
        match scene.get(child).map(|o| &o.shape) {
            Some(Shape::Text { .. }) => label = label.or(Some(child)),
            Some(_) => shape = shape.or(Some(child)),
            None => {}
        }
    }
    (shape, label)
}

pub fn read_node_unit(scene: &Scene, unit: ObjectHandle) -> Option<NodeVisual> {
    let group = scene.get(unit)?;
    let (shape_handle, label_handle) = node_parts(scene, unit);
    let shape_handle = shape_handle?;
    let shape = scene.get(shape_handle)?;

    let base = shape.shape.local_bounds();
    let size = Size::new(
        base.width() as f32 * group.scale_x,
        base.height() as f32 * group.scale_y,
    );
    let center = scene
        .world_bounds(shape_handle)
        .map(|b| b.center())
        .map(|c| Point::new(c.x as f32, c.y as f32))?;
    let text = label_handle
        .and_then(|h| scene.get(h))
        .and_then(|o| match &o.shape {
            Shape::Text { content, .. } => Some(content.clone()),
            _ => None,
        })
        .unwrap_or_default();

    let defaults = NodeStyle::default();
    Some(NodeVisual {
        position: Point::new(group.left, group.top),
        size,
        text,
        style: NodeStyle {
            fill: shape.fill.clone().unwrap_or(defaults.fill),
            stroke: shape.stroke.clone().unwrap_or(defaults.stroke),
            stroke_width: shape.stroke_width,
        },
        center,
    })
}

/// Compass bearing of `from → to` in degrees, or `None` for a zero-length
/// segment.
pub fn bearing(from: Point, to: Point) -> Option<f32> {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    if dx.hypot(dy) < f32::EPSILON {
        return None;
    }
    Some(dy.atan2(dx).to_degrees())
}

fn arrowhead(conn: &Connection, from: Point, to: Point) -> Option<SceneObject> {
    if !conn.arrow {
        return None;
    }
    let angle = bearing(from, to)?;
    Some(
        SceneObject::new(Shape::Triangle {
            width: ARROW_WIDTH,
            height: ARROW_HEIGHT,
        })
        .at(to.x, to.y)
        .with_origin(Origin::Center)
        // Triangle apex points up at angle 0.
        .rotated(angle + 90.0)
        .with_fill(conn.stroke.clone()),
    )
}

/// Build and add the unit for `conn` between two centres.
pub fn build_connection_unit(
    scene: &mut Scene,
    conn: &Connection,
    from: Point,
    to: Point,
) -> Result<ObjectHandle, SceneError> {
    let group = scene.add(
        SceneObject::new(Shape::Group)
            .tagged(ObjectTag::Connection {
                id: conn.id,
                from: conn.from,
                to: conn.to,
            })
            .locked_scaling(),
    );
    scene.add_child(
        group,
        SceneObject::new(Shape::Line { from, to }).with_stroke(conn.stroke.clone(), conn.stroke_width),
    )?;
    if let Some(head) = arrowhead(conn, from, to) {
        scene.add_child(group, head)?;
    }
    Ok(group)
}

/// Re-derive a connection unit from new endpoint centres. The group is
/// snapped back to the origin so a dragged connector returns to its nodes.
pub fn update_connection_unit(
    scene: &mut Scene,
    unit: ObjectHandle,
    conn: &Connection,
    from: Point,
    to: Point,
) -> Result<(), SceneError> {
    let group = scene.get_mut(unit).ok_or(SceneError::UnknownObject(unit))?;
    group.left = 0.0;
    group.top = 0.0;

    for child in scene.children(unit) {
        match scene.get(child).map(|o| &o.shape) {
            Some(Shape::Line { .. }) => {
                if let Some(line) = scene.get_mut(child) {
                    line.shape = Shape::Line { from, to };
                }
            }
            Some(Shape::Triangle { .. }) => {
                scene.remove(child);
            }
            _ => {}
        }
    }
    if let Some(head) = arrowhead(conn, from, to) {
        scene.add_child(unit, head)?;
    }
    Ok(())
}

/// Rendered endpoints of a connection unit in canvas space.
pub fn connection_endpoints(scene: &Scene, unit: ObjectHandle) -> Option<(Point, Point)> {
    scene.children(unit).into_iter().find_map(|child| {
        let Shape::Line { from, to } = &scene.get(child)?.shape else {
            return None;
        };
        let t = scene.world_transform(child);
        let a = t * kurbo::Point::new(from.x as f64, from.y as f64);
        let b = t * kurbo::Point::new(to.x as f64, to.y as f64);
        Some((
            Point::new(a.x as f32, a.y as f32),
            Point::new(b.x as f32, b.y as f32),
        ))
    })
}

/// The arrowhead of a connection unit, if it has one.
pub fn arrowhead_of(scene: &Scene, unit: ObjectHandle) -> Option<ObjectHandle> {
    scene
        .children(unit)
        .into_iter()
        .find(|&c| matches!(scene.get(c).map(|o| &o.shape), Some(Shape::Triangle { .. })))
}

/// Build a detached scene for a whole document. Connections with
/// unresolved endpoints are skipped.
pub fn scene_from_document(doc: &fc_core::model::Document, width: u32, height: u32) -> Result<Scene, SceneError> {
    let mut scene = Scene::new(width, height);
    for node in &doc.nodes {
        build_node_unit(&mut scene, node)?;
    }
    for conn in &doc.connections {
        let (Some(a), Some(b)) = (doc.node(conn.from), doc.node(conn.to)) else {
            log::warn!("skipping connection {} with unresolved endpoint", conn.id);
            continue;
        };
        build_connection_unit(&mut scene, conn, a.center(), b.center())?;
    }
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_core::model::Document;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_unit_reads_back_as_built() {
        let mut scene = Scene::new(800, 600);
        let node = Node::new(NodeType::Rectangle, 200.0, 200.0);
        let unit = build_node_unit(&mut scene, &node).unwrap();
        let visual = read_node_unit(&scene, unit).unwrap();
        assert_eq!(visual.position, node.position);
        assert_eq!(visual.size, node.size);
        assert_eq!(visual.text, "Text");
        assert_eq!(visual.style, node.style);
        assert_eq!(visual.center, node.center());
    }

    #[test]
    fn circle_unit_is_centred_on_position() {
        let mut scene = Scene::new(800, 600);
        let node = Node::new(NodeType::Circle, 400.0, 200.0);
        let unit = build_node_unit(&mut scene, &node).unwrap();
        let visual = read_node_unit(&scene, unit).unwrap();
        assert_eq!(visual.center, Point::new(400.0, 200.0));

        scene.scale_to(unit, 2.0, 1.0).unwrap();
        let visual = read_node_unit(&scene, unit).unwrap();
        assert_eq!(visual.size, Size::new(200.0, 100.0));
        assert_eq!(visual.center, Point::new(400.0, 200.0));
    }

    #[test]
    fn arrowhead_points_along_bearing() {
        let mut scene = Scene::new(800, 600);
        let a = Node::new(NodeType::Rectangle, 0.0, 0.0);
        let b = Node::new(NodeType::Rectangle, 300.0, 0.0);
        let conn = Connection::new(a.id, b.id);
        let unit = build_connection_unit(&mut scene, &conn, a.center(), b.center()).unwrap();

        let head = arrowhead_of(&scene, unit).unwrap();
        assert_eq!(scene.get(head).unwrap().angle, 90.0);
        assert_eq!(
            connection_endpoints(&scene, unit),
            Some((a.center(), b.center()))
        );
    }

    #[test]
    fn self_loop_has_no_arrowhead() {
        let mut scene = Scene::new(800, 600);
        let a = Node::new(NodeType::Diamond, 0.0, 0.0);
        let conn = Connection::new(a.id, a.id);
        let unit = build_connection_unit(&mut scene, &conn, a.center(), a.center()).unwrap();
        assert!(arrowhead_of(&scene, unit).is_none());
        assert_eq!(scene.children(unit).len(), 1);
    }

    #[test]
    fn update_snaps_dragged_connector_back() {
        let mut scene = Scene::new(800, 600);
        let a = Node::new(NodeType::Rectangle, 0.0, 0.0);
        let b = Node::new(NodeType::Rectangle, 0.0, 300.0);
        let conn = Connection::new(a.id, b.id);
        let unit = build_connection_unit(&mut scene, &conn, a.center(), b.center()).unwrap();
        scene.translate(unit, 40.0, 40.0).unwrap();

        update_connection_unit(&mut scene, unit, &conn, a.center(), b.center()).unwrap();
        assert_eq!(
            connection_endpoints(&scene, unit),
            Some((a.center(), b.center()))
        );
        assert_eq!(scene.children(unit).len(), 2);
    }

    #[test]
    fn document_scene_skips_dangling_connections() {
        let mut doc = Document::new();
        let a = Node::new(NodeType::Rectangle, 0.0, 0.0);
        doc.connections
            .push(Connection::new(a.id, fc_core::NodeId::intern("missing")));
        doc.nodes.push(a);
        let scene = scene_from_document(&doc, 800, 600).unwrap();
        assert_eq!(scene.top_level().len(), 1);
    }
}
