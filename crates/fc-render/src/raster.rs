//! CPU rasterization of the scene into PNG.
//!
//! Shapes and connectors are filled/stroked with tiny-skia. Labels are
//! rasterized with rusttype from the bundled font into a layer that is
//! composited through the label's transform.

use crate::font::{label_font, line_advance};
use crate::scene::{LINE_HEIGHT, ObjectHandle, Scene, SceneError, Shape, text_width};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fc_core::model::Color;
use kurbo::Affine;
use rusttype::{Scale, point};
use tiny_skia::{
    FillRule, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

/// Padding around the content, in canvas units.
pub const RASTER_PADDING: f32 = 20.0;

/// Largest PNG side in pixels. Larger content is scaled down to fit.
pub const MAX_RASTER_SIDE: u32 = 8192;

/// Render the full content to a PNG at 1:1 scale, ignoring zoom and pan.
/// Content wider or taller than [`MAX_RASTER_SIDE`] is scaled down
/// uniformly.
pub fn render_png(scene: &Scene, background: Color) -> Result<Vec<u8>, SceneError> {
    let pad = RASTER_PADDING as f64;
    let (origin_x, origin_y, content_w, content_h) = match scene.content_bounds() {
        Some(b) => (b.x0 - pad, b.y0 - pad, b.width() + pad * 2.0, b.height() + pad * 2.0),
        None => (0.0, 0.0, scene.width() as f64, scene.height() as f64),
    };
    let limit = MAX_RASTER_SIDE as f64;
    let fit = (limit / content_w).min(limit / content_h).min(1.0);
    let width = ((content_w * fit).ceil() as u32).min(MAX_RASTER_SIDE);
    let height = ((content_h * fit).ceil() as u32).min(MAX_RASTER_SIDE);
    if fit.is_nan() || fit <= 0.0 {
        return Err(SceneError::Surface { width, height });
    }
    if fit < 1.0 {
        log::debug!("scaling PNG export by {fit:.4} to {width}x{height}");
    }

    let mut pixmap = Pixmap::new(width, height).ok_or(SceneError::Surface { width, height })?;
    let [r, g, b, a] = background.to_rgba8();
    pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, a));

    let shift = Affine::scale(fit) * Affine::translate((-origin_x, -origin_y));
    for unit in scene.top_level() {
        draw(scene, unit, shift, &mut pixmap);
    }

    pixmap
        .encode_png()
        .map_err(|e| SceneError::Encode(e.to_string()))
}

/// `data:image/png;base64,...`
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

fn draw(scene: &Scene, handle: ObjectHandle, shift: Affine, pixmap: &mut Pixmap) {
    let Some(obj) = scene.get(handle) else {
        return;
    };
    if matches!(obj.shape, Shape::Group) {
        for child in scene.children(handle) {
            draw(scene, child, shift, pixmap);
        }
        return;
    }
    let transform = to_skia(shift * scene.world_transform(handle));
    if let Shape::Text { content, font_size } = &obj.shape {
        let color = obj
            .fill
            .as_deref()
            .and_then(Color::parse)
            .unwrap_or(Color::BLACK);
        draw_text(pixmap, content, *font_size, color, transform);
        return;
    }
    let Some(path) = build_path(&obj.shape) else {
        return;
    };

    if let Some(fill) = obj.fill.as_deref().and_then(Color::parse)
        && !matches!(obj.shape, Shape::Line { .. })
    {
        pixmap.fill_path(&path, &paint_for(fill), FillRule::Winding, transform, None);
    }
    if let Some(stroke) = obj.stroke.as_deref().and_then(Color::parse) {
        let style = Stroke {
            width: obj.stroke_width,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint_for(stroke), &style, transform, None);
    }
}

/// Lay the label out in its local box (lines centred, baselines as in the
/// SVG export), rasterize glyph coverage into a layer, then composite the
/// layer through `transform`.
fn draw_text(pixmap: &mut Pixmap, content: &str, font_size: f32, color: Color, transform: Transform) {
    if content.trim().is_empty() || font_size.is_nan() || font_size <= 0.0 {
        return;
    }
    let Some(font) = label_font() else {
        return;
    };
    let scale = Scale::uniform(font_size);
    let box_width = text_width(content, font_size);
    let line_height = font_size * LINE_HEIGHT;
    let lines = content.lines().count().max(1) as f32;
    // Real glyph extents differ from the estimated box.
    let margin = font_size.ceil();
    let Some(mut layer) = Pixmap::new(
        (box_width + margin * 2.0).ceil() as u32,
        (lines * line_height + margin * 2.0).ceil() as u32,
    ) else {
        return;
    };

    let (w, h) = (layer.width() as i32, layer.height() as i32);
    let [r, g, b, a] = color.to_rgba8();
    let data = layer.data_mut();
    for (i, line) in content.lines().enumerate() {
        let x = margin + (box_width - line_advance(font, line, font_size)) / 2.0;
        let baseline = margin + line_height * (i as f32 + 0.8);
        for glyph in font.layout(line, scale, point(x, baseline)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let (px, py) = (bb.min.x + gx as i32, bb.min.y + gy as i32);
                if px < 0 || py < 0 || px >= w || py >= h {
                    return;
                }
                let alpha = coverage.clamp(0.0, 1.0) * f32::from(a) / 255.0;
                let premul = |c: u8| (f32::from(c) * alpha).round() as u8;
                let idx = (py as usize * w as usize + px as usize) * 4;
                let alpha_byte = (alpha * 255.0).round() as u8;
                // Overlapping glyph edges keep the stronger coverage.
                if alpha_byte > data[idx + 3] {
                    data[idx..idx + 4].copy_from_slice(&[premul(r), premul(g), premul(b), alpha_byte]);
                }
            });
        }
    }

    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    let offset = -(margin as i32);
    pixmap.draw_pixmap(offset, offset, layer.as_ref(), &paint, transform, None);
}

fn build_path(shape: &Shape) -> Option<tiny_skia::Path> {
    match shape {
        Shape::Group | Shape::Text { .. } => None,
        Shape::Rectangle { width, height } => {
            tiny_skia::Rect::from_xywh(0.0, 0.0, *width, *height).map(PathBuilder::from_rect)
        }
        Shape::Ellipse { rx, ry } => {
            tiny_skia::Rect::from_xywh(0.0, 0.0, rx * 2.0, ry * 2.0).and_then(PathBuilder::from_oval)
        }
        Shape::Polygon { points } => {
            let mut pb = PathBuilder::new();
            let mut iter = points.iter();
            let first = iter.next()?;
            pb.move_to(first.x, first.y);
            for p in iter {
                pb.line_to(p.x, p.y);
            }
            pb.close();
            pb.finish()
        }
        Shape::Triangle { width, height } => {
            let mut pb = PathBuilder::new();
            pb.move_to(width / 2.0, 0.0);
            pb.line_to(*width, *height);
            pb.line_to(0.0, *height);
            pb.close();
            pb.finish()
        }
        Shape::Line { from, to } => {
            let mut pb = PathBuilder::new();
            pb.move_to(from.x, from.y);
            pb.line_to(to.x, to.y);
            pb.finish()
        }
    }
}

fn paint_for(color: Color) -> Paint<'static> {
    let [r, g, b, a] = color.to_rgba8();
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    paint
}

fn to_skia(t: Affine) -> Transform {
    let [a, b, c, d, e, f] = t.as_coeffs();
    Transform::from_row(
        a as f32, b as f32, c as f32, d as f32, e as f32, f as f32,
    )
}
