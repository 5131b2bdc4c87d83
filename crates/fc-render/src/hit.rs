//! Hit testing: point → unit lookup.
//!
//! Walks the top-level units front-to-back and returns the first one under
//! the point. Connector lines are hit within a small tolerance of the
//! segment rather than by their bounding box.

use crate::scene::{ObjectHandle, Scene, Shape};
use fc_core::model::Point;
use kurbo::Rect;

/// Extra slack around thin strokes, in canvas units.
pub const LINE_TOLERANCE: f32 = 6.0;

/// Find the topmost selectable unit at screen position (sx, sy).
/// Returns `None` if nothing is hit (background).
pub fn hit_test(scene: &Scene, sx: f32, sy: f32) -> Option<ObjectHandle> {
    let p = scene.screen_to_canvas(sx, sy);
    scene
        .top_level()
        .into_iter()
        .rev()
        .filter(|&h| scene.get(h).is_some_and(|o| o.selectable))
        .find(|&h| hits(scene, h, p))
}

fn hits(scene: &Scene, handle: ObjectHandle, p: Point) -> bool {
    let Some(obj) = scene.get(handle) else {
        return false;
    };
    match &obj.shape {
        Shape::Group => scene
            .children(handle)
            .into_iter()
            .any(|c| hits(scene, c, p)),
        Shape::Line { from, to } => {
            let t = scene.world_transform(handle);
            let a = t * kurbo::Point::new(from.x as f64, from.y as f64);
            let b = t * kurbo::Point::new(to.x as f64, to.y as f64);
            let tolerance = (obj.stroke_width / 2.0).max(LINE_TOLERANCE);
            distance_to_segment(
                p,
                Point::new(a.x as f32, a.y as f32),
                Point::new(b.x as f32, b.y as f32),
            ) <= tolerance
        }
        _ => scene
            .world_bounds(handle)
            .is_some_and(|b| b.contains(kurbo::Point::new(p.x as f64, p.y as f64))),
    }
}

/// Shortest distance from `p` to the segment `a`–`b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

/// All selectable units whose bounds intersect the canvas rectangle.
/// Used for marquee (box) selection.
pub fn hit_test_rect(scene: &Scene, rx: f32, ry: f32, rw: f32, rh: f32) -> Vec<ObjectHandle> {
    let area = Rect::new(
        rx as f64,
        ry as f64,
        (rx + rw) as f64,
        (ry + rh) as f64,
    );
    scene
        .top_level()
        .into_iter()
        .filter(|&h| scene.get(h).is_some_and(|o| o.selectable))
        .filter(|&h| {
            scene
                .world_bounds(h)
                .is_some_and(|b| b.intersect(area).area() > 0.0)
        })
        .collect()
}
