pub mod font;
pub mod hit;
pub mod paint;
pub mod raster;
pub mod scene;
pub mod svg;
pub mod units;

pub use hit::{hit_test, hit_test_rect};
pub use scene::{
    EventKind, ObjectHandle, ObjectTag, Origin, Scene, SceneError, SceneEvent, SceneObject, Shape,
    Viewport,
};
pub use svg::{SvgOptions, document_to_svg, render_svg};

use fc_core::model::Color;
use thiserror::Error;

/// Image formats the editor can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Svg,
}

impl ExportFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Svg => "svg",
        }
    }

    /// Download name: `flowchart.<ext>`.
    pub fn file_name(self) -> String {
        format!("flowchart.{}", self.extension())
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "svg" => Some(ExportFormat::Svg),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("raster export failed: {0}")]
    Raster(#[from] SceneError),
}

/// Export the whole scene: a PNG data URL or a standalone SVG document.
pub fn export(scene: &Scene, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Svg => Ok(render_svg(scene, &SvgOptions::default())),
        ExportFormat::Png => {
            let png = raster::render_png(scene, Color::rgba(1.0, 1.0, 1.0, 1.0))?;
            Ok(raster::png_data_url(&png))
        }
    }
}
