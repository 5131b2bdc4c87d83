//! Canvas2D renderer.
//!
//! Walks the live scene in paint order and draws to an HTML `<canvas>` via
//! `CanvasRenderingContext2d`. Every object is drawn in its own coordinate
//! space with the viewport and parent transforms folded into the context
//! transform, so groups, rotation and scaling come out exactly as the scene
//! defines them.

use fc_render::scene::{ObjectHandle, Scene, Shape};
use kurbo::{Affine, Rect};
use web_sys::CanvasRenderingContext2d;

/// Theme-dependent colors for the canvas renderer.
pub struct CanvasTheme {
    pub bg: &'static str,
    pub grid: &'static str,
    pub selection: &'static str,
    pub hover: &'static str,
    pub label: Option<&'static str>,
}

impl CanvasTheme {
    pub fn light() -> Self {
        Self {
            bg: "#f8f9fa",
            grid: "rgba(0, 0, 0, 0.06)",
            selection: "#0984e3",
            hover: "rgba(9, 132, 227, 0.35)",
            label: None,
        }
    }

    /// Dark canvas; labels are lightened so they stay readable on it.
    pub fn dark() -> Self {
        Self {
            bg: "#1e1e24",
            grid: "rgba(255, 255, 255, 0.05)",
            selection: "#74b9ff",
            hover: "rgba(116, 185, 255, 0.35)",
            label: Some("#e8e8ee"),
        }
    }
}

/// Render the whole scene to a Canvas2D context.
pub fn render_scene(
    ctx: &CanvasRenderingContext2d,
    scene: &Scene,
    canvas_width: f64,
    canvas_height: f64,
    theme: &CanvasTheme,
    hovered: Option<ObjectHandle>,
) {
    let _ = ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
    ctx.set_fill_style_str(theme.bg);
    ctx.fill_rect(0.0, 0.0, canvas_width, canvas_height);
    draw_grid(ctx, canvas_width, canvas_height, theme);

    let view = scene.viewport().transform();
    for unit in scene.top_level() {
        draw_object(ctx, scene, unit, view, theme);
    }

    let _ = ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
    if let Some(unit) = hovered
        && !scene.selection().contains(&unit)
        && let Some(b) = scene.world_bounds(unit)
    {
        draw_hover_outline(ctx, view.transform_rect_bbox(b), theme);
    }
    for &unit in scene.selection() {
        if let Some(b) = scene.world_bounds(unit) {
            draw_selection_handles(ctx, view.transform_rect_bbox(b), theme);
        }
    }
}

fn draw_object(
    ctx: &CanvasRenderingContext2d,
    scene: &Scene,
    handle: ObjectHandle,
    view: Affine,
    theme: &CanvasTheme,
) {
    let Some(obj) = scene.get(handle) else {
        return;
    };
    if let Shape::Group = obj.shape {
        for child in scene.children(handle) {
            draw_object(ctx, scene, child, view, theme);
        }
        return;
    }

    let [a, b, c, d, e, f] = (view * scene.world_transform(handle)).as_coeffs();
    ctx.save();
    let _ = ctx.set_transform(a, b, c, d, e, f);

    let fill = obj.fill.as_deref();
    let stroke = obj.stroke.as_deref();
    match &obj.shape {
        Shape::Group => {}
        Shape::Rectangle { width, height } => {
            ctx.begin_path();
            ctx.rect(0.0, 0.0, *width as f64, *height as f64);
            paint(ctx, fill, stroke, obj.stroke_width);
        }
        Shape::Ellipse { rx, ry } => {
            let (rx, ry) = (*rx as f64, *ry as f64);
            ctx.begin_path();
            let _ = ctx.ellipse(rx, ry, rx, ry, 0.0, 0.0, std::f64::consts::TAU);
            paint(ctx, fill, stroke, obj.stroke_width);
        }
        Shape::Polygon { points } => {
            ctx.begin_path();
            for (i, p) in points.iter().enumerate() {
                if i == 0 {
                    ctx.move_to(p.x as f64, p.y as f64);
                } else {
                    ctx.line_to(p.x as f64, p.y as f64);
                }
            }
            ctx.close_path();
            paint(ctx, fill, stroke, obj.stroke_width);
        }
        Shape::Triangle { width, height } => {
            let (w, h) = (*width as f64, *height as f64);
            ctx.begin_path();
            ctx.move_to(w / 2.0, 0.0);
            ctx.line_to(w, h);
            ctx.line_to(0.0, h);
            ctx.close_path();
            paint(ctx, fill, stroke, obj.stroke_width);
        }
        Shape::Line { from, to } => {
            ctx.begin_path();
            ctx.move_to(from.x as f64, from.y as f64);
            ctx.line_to(to.x as f64, to.y as f64);
            paint(ctx, None, stroke, obj.stroke_width);
        }
        Shape::Text { content, font_size } => {
            let color = theme.label.or(fill).unwrap_or("#333333");
            draw_label(ctx, content, *font_size, color);
        }
    }
    ctx.restore();
}

fn paint(ctx: &CanvasRenderingContext2d, fill: Option<&str>, stroke: Option<&str>, width: f32) {
    if let Some(fill) = fill {
        ctx.set_fill_style_str(fill);
        ctx.fill();
    }
    if let Some(stroke) = stroke {
        ctx.set_stroke_style_str(stroke);
        ctx.set_line_width(width as f64);
        ctx.stroke();
    }
}

/// Multi-line label centred on its own bounds.
fn draw_label(ctx: &CanvasRenderingContext2d, content: &str, font_size: f32, color: &str) {
    let size = font_size as f64;
    let line_height = size * fc_render::scene::LINE_HEIGHT as f64;
    let cx = fc_render::scene::text_width(content, font_size) as f64 / 2.0;

    ctx.set_font(&format!("{size}px sans-serif"));
    ctx.set_fill_style_str(color);
    ctx.set_text_align("center");
    ctx.set_text_baseline("middle");
    for (i, line) in content.lines().enumerate() {
        let _ = ctx.fill_text(line, cx, line_height * (i as f64 + 0.5));
    }
}

// ─── Overlays (screen space) ────────────────────────────────────────────

fn draw_selection_handles(ctx: &CanvasRenderingContext2d, b: Rect, theme: &CanvasTheme) {
    let handle_size = 6.0;
    let half = handle_size / 2.0;

    ctx.set_stroke_style_str(theme.selection);
    ctx.set_line_width(1.0);
    ctx.stroke_rect(b.x0, b.y0, b.width(), b.height());

    ctx.set_fill_style_str("#ffffff");
    ctx.set_line_width(1.5);
    for (hx, hy) in [(b.x0, b.y0), (b.x1, b.y0), (b.x0, b.y1), (b.x1, b.y1)] {
        ctx.fill_rect(hx - half, hy - half, handle_size, handle_size);
        ctx.stroke_rect(hx - half, hy - half, handle_size, handle_size);
    }
}

fn draw_hover_outline(ctx: &CanvasRenderingContext2d, b: Rect, theme: &CanvasTheme) {
    ctx.save();
    ctx.set_stroke_style_str(theme.hover);
    ctx.set_line_width(2.0);
    let _ = ctx.set_line_dash(&js_sys::Array::of2(
        &wasm_bindgen::JsValue::from_f64(4.0),
        &wasm_bindgen::JsValue::from_f64(4.0),
    ));
    ctx.stroke_rect(b.x0 - 2.0, b.y0 - 2.0, b.width() + 4.0, b.height() + 4.0);
    ctx.restore();
}

fn draw_grid(ctx: &CanvasRenderingContext2d, width: f64, height: f64, theme: &CanvasTheme) {
    ctx.set_fill_style_str(theme.grid);
    let spacing = 20.0;
    let mut x = 0.0;
    while x < width {
        let mut y = 0.0;
        while y < height {
            ctx.fill_rect(x, y, 1.0, 1.0);
            y += spacing;
        }
        x += spacing;
    }
}
