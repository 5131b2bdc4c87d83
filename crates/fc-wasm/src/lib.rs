//! WASM bridge for FlowChart: exposes the editor controller to JavaScript.
//!
//! Compiled via `wasm-pack build --target web`. The page owns the `<canvas>`
//! element and the animation loop; it forwards pointer and key events here,
//! calls [`FlowchartCanvas::tick`] with `performance.now()` so autosave can
//! fire, and calls [`FlowchartCanvas::render`] whenever
//! [`FlowchartCanvas::needs_render`] says so.

mod render2d;
mod storage;

use fc_core::config::Theme;
use fc_core::id::{ConnectionId, NodeId};
use fc_core::layout::{LayoutConfig, suggest_layout};
use fc_core::model::{Document, NodeType};
use fc_core::stats::compute_stats;
use fc_core::EditorConfig;
use fc_editor::sync::{Element, Surface};
use fc_editor::{EditorController, ShortcutAction, ToolKind};
use fc_render::ExportFormat;
use fc_render::scene::ObjectHandle;
use fc_render::svg::{SvgOptions, document_to_svg};
use storage::{LocalStorage, page_location};
use wasm_bindgen::prelude::*;
use web_sys::CanvasRenderingContext2d;

/// An in-progress node drag, in screen coordinates.
struct Drag {
    id: NodeId,
    last_x: f32,
    last_y: f32,
}

/// The main WASM-facing canvas controller.
///
/// Holds the editor controller plus the pointer state the browser needs
/// (hover, active drag). All interaction from JS goes through this struct.
#[wasm_bindgen]
pub struct FlowchartCanvas {
    controller: EditorController<LocalStorage>,
    width: f64,
    height: f64,
    dark_mode: bool,
    hovered: Option<Element>,
    drag: Option<Drag>,
}

#[wasm_bindgen]
impl FlowchartCanvas {
    /// Create the canvas controller and try to attach it. The initial
    /// diagram comes from the page's `#data=` fragment, then localStorage.
    /// If attaching fails the canvas stays in its fallback state; check
    /// [`is_ready`](Self::is_ready) and call [`retry_init`](Self::retry_init).
    #[wasm_bindgen(constructor)]
    pub fn new(width: f64, height: f64) -> Self {
        console_setup();

        let config = EditorConfig::global().clone();
        let dark_mode = config.theme == Theme::Dark;
        let mut canvas = Self {
            controller: EditorController::new(config, LocalStorage),
            width,
            height,
            dark_mode,
            hovered: None,
            drag: None,
        };
        canvas.attach();
        canvas
    }

    fn attach(&mut self) -> bool {
        let hash = page_location().map(|(_, _, hash)| hash);
        let (w, h) = (self.width as u32, self.height as u32);
        // No blocking sleep in the browser; the attempts run back to back
        // and the page offers a manual retry.
        match self.controller.initialize(
            || Surface::new(w, h),
            hash.as_deref(),
            |delay| log::debug!("retrying attach (would wait {delay:?})"),
        ) {
            Ok(()) => true,
            Err(e) => {
                log::error!("{e}");
                false
            }
        }
    }

    /// Retry attaching after a failed start, e.g. once the canvas has been
    /// laid out with a real size.
    pub fn retry_init(&mut self, width: f64, height: f64) -> bool {
        self.width = width;
        self.height = height;
        self.attach()
    }

    pub fn is_ready(&self) -> bool {
        self.controller.is_ready()
    }

    /// Whether the first-run tutorial overlay should be shown.
    pub fn show_tutorial(&self) -> bool {
        self.controller.config().show_tutorial
    }

    // ─── Rendering ───────────────────────────────────────────────────────

    pub fn render(&self, ctx: &CanvasRenderingContext2d) {
        let Some(sync) = self.controller.sync() else {
            return;
        };
        let theme = if self.dark_mode {
            render2d::CanvasTheme::dark()
        } else {
            render2d::CanvasTheme::light()
        };
        let hovered = self.hovered.and_then(|e| self.handle_of(e));
        render2d::render_scene(ctx, sync.scene(), self.width, self.height, &theme, hovered);
    }

    /// Whether something changed since the last call. Resets the flag.
    pub fn needs_render(&mut self) -> bool {
        self.controller.take_render_request()
    }

    pub fn set_theme(&mut self, is_dark: bool) {
        self.dark_mode = is_dark;
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.controller.resize_surface(width as u32, height as u32);
    }

    // ─── Pointer input ───────────────────────────────────────────────────

    /// Pointer pressed at a canvas-element point. Returns true if a
    /// re-render is needed.
    pub fn handle_pointer_down(&mut self, x: f32, y: f32) -> bool {
        let hit = self.controller.sync().and_then(|s| s.hit_test(x, y));
        if let Err(e) = self.controller.click(x, y) {
            log::warn!("click ignored: {e}");
            return false;
        }
        if self.controller.tool() == ToolKind::Select
            && let Some(Element::Node(id)) = hit
        {
            self.drag = Some(Drag {
                id,
                last_x: x,
                last_y: y,
            });
        }
        true
    }

    /// Pointer moved. Drags the pressed node, otherwise tracks hover.
    /// Returns true if a re-render is needed.
    pub fn handle_pointer_move(&mut self, x: f32, y: f32) -> bool {
        if let Some(drag) = self.drag.as_mut() {
            let zoom = self.controller.sync().map_or(1.0, |s| s.zoom());
            let (dx, dy) = ((x - drag.last_x) / zoom, (y - drag.last_y) / zoom);
            drag.last_x = x;
            drag.last_y = y;
            let id = drag.id;
            return self.controller.drag_node(id, dx, dy);
        }

        let hit = self.controller.sync().and_then(|s| s.hit_test(x, y));
        let changed = hit != self.hovered;
        self.hovered = hit;
        changed
    }

    /// Ends any node drag, recording it as one undo step.
    pub fn handle_pointer_up(&mut self) -> bool {
        let dragging = self.drag.take().is_some();
        self.controller.end_drag();
        dragging
    }

    /// Mouse-wheel zoom step. `delta_y < 0` zooms in.
    pub fn handle_wheel(&mut self, delta_y: f64) -> f32 {
        if delta_y < 0.0 {
            self.controller.zoom_in()
        } else {
            self.controller.zoom_out()
        }
    }

    // ─── Tools & keyboard ────────────────────────────────────────────────

    pub fn set_tool(&mut self, name: &str) {
        self.controller
            .set_tool(ToolKind::parse(name).unwrap_or_default());
    }

    pub fn get_tool_name(&self) -> String {
        tool_name(self.controller.tool()).to_string()
    }

    /// Handle a keyboard event. Returns a JSON string:
    /// `{"action":"<action_name>","tool":"<tool_name>"}`
    pub fn handle_key(
        &mut self,
        key: &str,
        ctrl: bool,
        shift: bool,
        alt: bool,
        meta: bool,
    ) -> String {
        let action = self.controller.key_down(key, ctrl, shift, alt, meta);
        let name = action.map_or("none", action_name);
        let tool = tool_name(self.controller.tool());
        format!(r#"{{"action":"{name}","tool":"{tool}"}}"#)
    }

    // ─── Editing ─────────────────────────────────────────────────────────

    /// Place a node with its anchor at a canvas point. Returns the new id,
    /// or an empty string for an unknown kind or a non-finite position.
    pub fn add_node(&mut self, kind: &str, x: f32, y: f32) -> String {
        let Some(kind) = NodeType::parse(kind) else {
            return String::new();
        };
        if !x.is_finite() || !y.is_finite() {
            log::warn!("rejected node position ({x}, {y})");
            return String::new();
        }
        self.controller
            .add_node(kind, x, y)
            .map(|id| id.as_str().to_string())
            .unwrap_or_default()
    }

    pub fn add_connection(&mut self, from: &str, to: &str) -> Result<String, JsValue> {
        self.controller
            .add_connection(NodeId::intern(from), NodeId::intern(to))
            .map(|id| id.as_str().to_string())
            .map_err(to_js)
    }

    pub fn remove_connection(&mut self, id: &str) {
        self.controller.remove_connection(ConnectionId::intern(id));
    }

    pub fn set_node_text(&mut self, id: &str, text: &str) -> bool {
        self.controller.set_node_text(NodeId::intern(id), text)
    }

    pub fn resize_node(&mut self, id: &str, width: f32, height: f32) -> bool {
        if !width.is_finite() || !height.is_finite() {
            log::warn!("rejected node size {width}x{height}");
            return false;
        }
        self.controller.resize_node(NodeId::intern(id), width, height)
    }

    pub fn delete_selected(&mut self) -> bool {
        self.controller.delete_selected() > 0
    }

    /// Selected unit ids as a JSON array.
    pub fn get_selected_ids(&self) -> String {
        let ids: Vec<String> = self
            .controller
            .sync()
            .map(|s| s.selection())
            .unwrap_or_default()
            .into_iter()
            .map(|e| match e {
                Element::Node(id) => id.to_string(),
                Element::Connection(id) => id.to_string(),
            })
            .collect();
        serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn undo(&mut self) -> bool {
        self.controller.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.controller.redo()
    }

    pub fn can_undo(&self) -> bool {
        self.controller.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.controller.can_redo()
    }

    // ─── View ────────────────────────────────────────────────────────────

    pub fn zoom_in(&mut self) -> f32 {
        self.controller.zoom_in()
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.controller.zoom_out()
    }

    pub fn set_zoom(&mut self, level: f32) -> f32 {
        self.controller.set_zoom(level)
    }

    pub fn center_view(&mut self) {
        self.controller.center_view();
    }

    // ─── Document ────────────────────────────────────────────────────────

    pub fn get_document_json(&self) -> String {
        self.controller
            .document()
            .and_then(|d| d.to_json().ok())
            .unwrap_or_default()
    }

    /// Replace the diagram (undoable). Returns false on malformed JSON.
    pub fn load_document_json(&mut self, json: &str) -> bool {
        match Document::from_json(json) {
            Ok(doc) => self.controller.load_document(doc).is_ok(),
            Err(e) => {
                log::warn!("rejected document: {e}");
                false
            }
        }
    }

    pub fn new_document(&mut self) {
        self.controller.new_document();
    }

    /// `"png"` ⇒ data URL, `"svg"` ⇒ SVG markup.
    pub fn export(&mut self, format: &str) -> Result<String, JsValue> {
        let format = ExportFormat::parse(format)
            .ok_or_else(|| JsValue::from_str(&format!("unknown export format `{format}`")))?;
        self.controller.export(format).map_err(to_js)
    }

    pub fn export_file_name(&self, format: &str) -> String {
        ExportFormat::parse(format)
            .map(ExportFormat::file_name)
            .unwrap_or_default()
    }

    /// A link that opens the current diagram on this page.
    pub fn share_link(&mut self) -> Result<String, JsValue> {
        let (origin, pathname, _) =
            page_location().ok_or_else(|| JsValue::from_str("no page location"))?;
        self.controller.share_link(&origin, &pathname).map_err(to_js)
    }

    /// Diagram statistics as JSON.
    pub fn stats_json(&self) -> String {
        self.controller
            .document()
            .map(|d| compute_stats(&d))
            .and_then(|s| serde_json::to_string(&s).ok())
            .unwrap_or_default()
    }

    /// Run the force-directed layout and apply it as one undoable step.
    /// Runs inline: the page has no worker thread.
    pub fn auto_layout(&mut self) -> usize {
        let Some(doc) = self.controller.document() else {
            return 0;
        };
        let positions = suggest_layout(&doc, &LayoutConfig::default());
        self.controller.apply_layout(&positions)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Advance the clock (`performance.now()`); returns true if an autosave
    /// was written.
    pub fn tick(&mut self, now_ms: f64) -> bool {
        self.controller.tick(now_ms.max(0.0) as u64)
    }

    /// Save immediately, e.g. from `beforeunload`.
    pub fn flush(&mut self) -> bool {
        self.controller.flush()
    }

    pub fn destroy(&mut self) {
        self.drag = None;
        self.controller.end_drag();
        self.hovered = None;
        self.controller.destroy();
    }
}

impl FlowchartCanvas {
    fn handle_of(&self, element: Element) -> Option<ObjectHandle> {
        let sync = self.controller.sync()?;
        match element {
            Element::Node(id) => sync.node_handle(id),
            Element::Connection(id) => sync.connection_handle(id),
        }
    }
}

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn tool_name(kind: ToolKind) -> &'static str {
    match kind {
        ToolKind::Select => "select",
        ToolKind::Rectangle => "rectangle",
        ToolKind::Circle => "circle",
        ToolKind::Diamond => "diamond",
        ToolKind::Connect => "connect",
    }
}

fn action_name(action: ShortcutAction) -> &'static str {
    match action {
        ShortcutAction::ToolSelect => "toolSelect",
        ShortcutAction::ToolRectangle => "toolRectangle",
        ShortcutAction::ToolCircle => "toolCircle",
        ShortcutAction::ToolDiamond => "toolDiamond",
        ShortcutAction::ToolConnect => "toolConnect",
        ShortcutAction::Undo => "undo",
        ShortcutAction::Redo => "redo",
        ShortcutAction::Delete => "delete",
        ShortcutAction::ZoomIn => "zoomIn",
        ShortcutAction::ZoomOut => "zoomOut",
        ShortcutAction::CenterView => "centerView",
        ShortcutAction::Cancel => "cancel",
    }
}

// ─── Console logging and panic hook ──────────────────────────────────────

#[cfg(target_arch = "wasm32")]
struct ConsoleLogger;

#[cfg(target_arch = "wasm32")]
impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&msg),
            log::Level::Warn => web_sys::console::warn_1(&msg),
            _ => web_sys::console::log_1(&msg),
        }
    }

    fn flush(&self) {}
}

fn console_setup() {
    #[cfg(target_arch = "wasm32")]
    {
        use std::sync::Once;
        static SETUP: Once = Once::new();
        static LOGGER: ConsoleLogger = ConsoleLogger;
        SETUP.call_once(|| {
            std::panic::set_hook(Box::new(|info| {
                let msg = format!("FlowChart WASM panic: {info}");
                web_sys::console::error_1(&msg.into());
            }));
            if log::set_logger(&LOGGER).is_ok() {
                log::set_max_level(log::LevelFilter::Info);
            }
        });
    }
}

// ─── Standalone functions (no canvas needed) ─────────────────────────────

/// Install the editor configuration from JSON before the first canvas is
/// created. Missing keys take their defaults. Returns false if the JSON is
/// malformed or a config was already installed.
#[wasm_bindgen]
pub fn install_config(json: &str) -> bool {
    match EditorConfig::from_json(json) {
        Ok(config) => EditorConfig::install(config).is_ok(),
        Err(e) => {
            log::warn!("rejected config: {e}");
            false
        }
    }
}

/// Check a document. Returns JSON: `{"ok":true}` or
/// `{"ok":false,"error":"..."}`.
#[wasm_bindgen]
pub fn validate_document(json: &str) -> String {
    let checked = Document::from_json(json).and_then(|doc| doc.validate());
    match checked {
        Ok(()) => r#"{"ok":true}"#.to_string(),
        Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }).to_string(),
    }
}

/// Render a document JSON straight to SVG, or an empty string if it does
/// not parse.
#[wasm_bindgen]
pub fn render_document_svg(json: &str) -> String {
    Document::from_json(json)
        .map(|doc| document_to_svg(&doc, &SvgOptions::default()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_core::model::{Connection, Node};
    use pretty_assertions::assert_eq;

    #[test]
    fn validate_reports_dangling_connection() {
        let mut doc = Document::new();
        let a = Node::new(NodeType::Rectangle, 0.0, 0.0);
        doc.connections
            .push(Connection::new(a.id, NodeId::intern("gone")));
        doc.nodes.push(a);

        let report: serde_json::Value =
            serde_json::from_str(&validate_document(&doc.to_json().unwrap())).unwrap();
        assert_eq!(report["ok"], false);
        assert!(report["error"].as_str().unwrap().contains("gone"));

        assert_eq!(validate_document(r#"{"nodes":[]}"#), r#"{"ok":true}"#);
        assert!(validate_document("{").contains(r#""ok":false"#));
    }

    #[test]
    fn svg_from_json() {
        let mut doc = Document::new();
        doc.nodes.push(Node::new(NodeType::Diamond, 10.0, 10.0));
        let svg = render_document_svg(&doc.to_json().unwrap());
        assert!(svg.contains("<polygon"));
        assert_eq!(render_document_svg("nope"), "");
    }

    #[test]
    fn names_match_tool_parsing() {
        for kind in [
            ToolKind::Select,
            ToolKind::Rectangle,
            ToolKind::Circle,
            ToolKind::Diamond,
            ToolKind::Connect,
        ] {
            assert_eq!(ToolKind::parse(tool_name(kind)), Some(kind));
        }
        assert_eq!(action_name(ShortcutAction::CenterView), "centerView");
    }
}
