//! Standalone SVG export.
//!
//! Output is in canvas coordinates shifted so the content bounds (plus
//! padding) start at the origin, so the current zoom and pan never leak
//! into an export. Each leaf object is emitted with its full world
//! transform as a `matrix(...)`.

use crate::scene::{ObjectHandle, Scene, Shape, text_width};
use crate::units::scene_from_document;
use fc_core::model::Document;
use kurbo::Affine;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
pub struct SvgOptions {
    pub padding: f32,
    /// Solid background; `None` leaves it transparent.
    pub background: Option<String>,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            padding: 20.0,
            background: Some("#ffffff".into()),
        }
    }
}

/// Surface used when exporting a document that has no live scene.
const DETACHED_WIDTH: u32 = 800;
const DETACHED_HEIGHT: u32 = 600;

/// Render the whole scene as an SVG document.
pub fn render_svg(scene: &Scene, options: &SvgOptions) -> String {
    let pad = options.padding as f64;
    let (min_x, min_y, width, height) = match scene.content_bounds() {
        Some(b) => (b.x0 - pad, b.y0 - pad, b.width() + pad * 2.0, b.height() + pad * 2.0),
        None => (0.0, 0.0, scene.width() as f64, scene.height() as f64),
    };
    let shift = Affine::translate((-min_x, -min_y));

    let mut svg = String::new();
    svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
        w = num(width),
        h = num(height)
    );
    if let Some(bg) = &options.background {
        let _ = writeln!(
            svg,
            "  <rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
            escape_xml(bg)
        );
    }

    for unit in scene.top_level() {
        emit_object(scene, unit, shift, &mut svg, 1);
    }
    svg.push_str("</svg>\n");

    log::trace!("svg export: {} bytes", svg.len());
    svg
}

/// Render a document directly, without a live scene. Safe to call off the
/// main thread.
pub fn document_to_svg(doc: &Document, options: &SvgOptions) -> String {
    match scene_from_document(doc, DETACHED_WIDTH, DETACHED_HEIGHT) {
        Ok(scene) => render_svg(&scene, options),
        Err(e) => {
            log::error!("could not build export scene: {e}");
            render_svg(&Scene::new(DETACHED_WIDTH, DETACHED_HEIGHT), options)
        }
    }
}

fn emit_object(scene: &Scene, handle: ObjectHandle, shift: Affine, out: &mut String, depth: usize) {
    let Some(obj) = scene.get(handle) else {
        return;
    };
    let indent = "  ".repeat(depth);

    if matches!(obj.shape, Shape::Group) {
        let _ = writeln!(out, "{indent}<g>");
        for child in scene.children(handle) {
            emit_object(scene, child, shift, out, depth + 1);
        }
        let _ = writeln!(out, "{indent}</g>");
        return;
    }

    let transform = matrix(shift * scene.world_transform(handle));
    let fill = obj.fill.as_deref().map(escape_xml).unwrap_or_else(|| "none".into());
    let stroke = match &obj.stroke {
        Some(s) => format!(
            " stroke=\"{}\" stroke-width=\"{}\"",
            escape_xml(s),
            num(obj.stroke_width as f64)
        ),
        None => String::new(),
    };

    match &obj.shape {
        Shape::Group => {}
        Shape::Rectangle { width, height } => {
            let _ = writeln!(
                out,
                "{indent}<rect transform=\"{transform}\" x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"{fill}\"{stroke}/>",
                num(*width as f64),
                num(*height as f64)
            );
        }
        Shape::Ellipse { rx, ry } => {
            let _ = writeln!(
                out,
                "{indent}<ellipse transform=\"{transform}\" cx=\"{rx}\" cy=\"{ry}\" rx=\"{rx}\" ry=\"{ry}\" fill=\"{fill}\"{stroke}/>",
                rx = num(*rx as f64),
                ry = num(*ry as f64)
            );
        }
        Shape::Polygon { points } => {
            let pts: Vec<String> = points
                .iter()
                .map(|p| format!("{},{}", num(p.x as f64), num(p.y as f64)))
                .collect();
            let _ = writeln!(
                out,
                "{indent}<polygon transform=\"{transform}\" points=\"{}\" fill=\"{fill}\"{stroke}/>",
                pts.join(" ")
            );
        }
        Shape::Triangle { width, height } => {
            let (w, h) = (*width as f64, *height as f64);
            let _ = writeln!(
                out,
                "{indent}<polygon transform=\"{transform}\" points=\"{},0 {},{} 0,{}\" fill=\"{fill}\"{stroke}/>",
                num(w / 2.0),
                num(w),
                num(h),
                num(h)
            );
        }
        Shape::Line { from, to } => {
            let _ = writeln!(
                out,
                "{indent}<line transform=\"{transform}\" x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\"{stroke}/>",
                num(from.x as f64),
                num(from.y as f64),
                num(to.x as f64),
                num(to.y as f64)
            );
        }
        Shape::Text { content, font_size } => {
            let cx = text_width(content, *font_size) as f64 / 2.0;
            let line_height = *font_size as f64 * crate::scene::LINE_HEIGHT as f64;
            let _ = write!(
                out,
                "{indent}<text transform=\"{transform}\" font-family=\"sans-serif\" font-size=\"{}\" text-anchor=\"middle\" fill=\"{fill}\">",
                num(*font_size as f64)
            );
            for (i, line) in content.lines().enumerate() {
                let _ = write!(
                    out,
                    "<tspan x=\"{}\" y=\"{}\">{}</tspan>",
                    num(cx),
                    num(line_height * (i as f64 + 0.8)),
                    escape_xml(line)
                );
            }
            out.push_str("</text>\n");
        }
    }
}

fn matrix(t: Affine) -> String {
    let [a, b, c, d, e, f] = t.as_coeffs();
    format!(
        "matrix({} {} {} {} {} {})",
        num(a),
        num(b),
        num(c),
        num(d),
        num(e),
        num(f)
    )
}

/// Format a coordinate with at most three decimals.
fn num(v: f64) -> String {
    let rounded = (v * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        "0".into()
    } else {
        format!("{rounded}")
    }
}

pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
