//! Scene → Vello drawing commands.
//!
//! Walks the live scene in paint order and emits fills and strokes with the
//! viewport transform applied. Returns how many primitives were emitted so
//! callers can skip presenting an empty frame.

use crate::scene::{ObjectHandle, Scene, Shape};
use fc_core::model::Color as ModelColor;
use kurbo::{Affine, BezPath, Cap, Ellipse, Join, Line, Point, Rect, Stroke};
use peniko::{Color, Fill};

/// Paint the whole scene into a Vello scene.
///
/// Call once per frame with a freshly-reset `vello::Scene`. Text is logged,
/// not shaped.
pub fn paint_scene(out: &mut vello::Scene, scene: &Scene) -> usize {
    let view = scene.viewport().transform();
    let mut painted = 0;
    for unit in scene.top_level() {
        painted += paint_object(out, scene, unit, view);
    }
    log::trace!("painted {painted} primitives");
    painted
}

fn paint_object(out: &mut vello::Scene, scene: &Scene, handle: ObjectHandle, view: Affine) -> usize {
    let Some(obj) = scene.get(handle) else {
        return 0;
    };
    let transform = view * scene.world_transform(handle);
    let fill = obj.fill.as_deref().and_then(ModelColor::parse).map(to_peniko);
    let stroke = obj
        .stroke
        .as_deref()
        .and_then(ModelColor::parse)
        .map(|c| (to_peniko(c), stroke_style(obj.stroke_width)));

    match &obj.shape {
        Shape::Group => scene
            .children(handle)
            .into_iter()
            .map(|c| paint_object(out, scene, c, view))
            .sum(),
        Shape::Rectangle { width, height } => {
            let rect = Rect::new(0.0, 0.0, *width as f64, *height as f64);
            draw(out, &rect, transform, fill, stroke)
        }
        Shape::Ellipse { rx, ry } => {
            let (rx, ry) = (*rx as f64, *ry as f64);
            let ellipse = Ellipse::new((rx, ry), (rx, ry), 0.0);
            draw(out, &ellipse, transform, fill, stroke)
        }
        Shape::Polygon { points } => {
            let mut path = BezPath::new();
            for (i, p) in points.iter().enumerate() {
                let pt = Point::new(p.x as f64, p.y as f64);
                if i == 0 {
                    path.move_to(pt);
                } else {
                    path.line_to(pt);
                }
            }
            path.close_path();
            draw(out, &path, transform, fill, stroke)
        }
        Shape::Triangle { width, height } => {
            let (w, h) = (*width as f64, *height as f64);
            let mut path = BezPath::new();
            path.move_to((w / 2.0, 0.0));
            path.line_to((w, h));
            path.line_to((0.0, h));
            path.close_path();
            draw(out, &path, transform, fill, stroke)
        }
        Shape::Line { from, to } => {
            let line = Line::new(
                (from.x as f64, from.y as f64),
                (to.x as f64, to.y as f64),
            );
            draw(out, &line, transform, None, stroke)
        }
        Shape::Text { content, .. } => {
            log::trace!("TEXT {content:?} at {:?}", transform.translation());
            0
        }
    }
}

fn draw<S: kurbo::Shape>(
    out: &mut vello::Scene,
    shape: &S,
    transform: Affine,
    fill: Option<Color>,
    stroke: Option<(Color, Stroke)>,
) -> usize {
    let mut painted = 0;
    if let Some(color) = fill {
        out.fill(Fill::NonZero, transform, color, None, shape);
        painted += 1;
    }
    if let Some((color, style)) = stroke {
        out.stroke(&style, transform, color, None, shape);
        painted += 1;
    }
    painted
}

fn stroke_style(width: f32) -> Stroke {
    Stroke {
        width: width as f64,
        join: Join::Miter,
        start_cap: Cap::Butt,
        end_cap: Cap::Butt,
        ..Default::default()
    }
}

fn to_peniko(c: ModelColor) -> Color {
    let [r, g, b, a] = c.to_rgba8();
    Color::from_rgba8(r, g, b, a)
}
