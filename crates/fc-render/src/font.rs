//! Label font for raster export.

use rusttype::{Font, Scale, point};
use std::sync::OnceLock;

/// The bundled DejaVu Sans face, parsed once. `None` if the embedded file
/// cannot be read.
pub fn label_font() -> Option<&'static Font<'static>> {
    static FONT: OnceLock<Option<Font<'static>>> = OnceLock::new();
    FONT.get_or_init(|| {
        let data = include_bytes!("../../../assets/fonts/dejavu/DejaVuSans.ttf");
        let font = Font::try_from_bytes(data as &[u8]);
        if font.is_none() {
            log::error!("bundled label font is invalid; PNG labels will be skipped");
        }
        font
    })
    .as_ref()
}

/// Laid-out advance of one line of text at `size`.
pub fn line_advance(font: &Font<'_>, line: &str, size: f32) -> f32 {
    font.layout(line, Scale::uniform(size), point(0.0, 0.0))
        .last()
        .map_or(0.0, |g| {
            g.position().x + g.unpositioned().h_metrics().advance_width
        })
}
