//! Editor controller: user intents → synchronizer → history → storage.
//!
//! The controller owns the synchronizer, the `History<Document>`, the
//! persistence adapter and the autosave debouncer. Every Document the
//! synchronizer emits is queued by its change callback, then drained after
//! the intent completes: recorded in history and scheduled for saving.
//! Undo and redo push the history's current Document back through
//! `load_from_data`, which emits nothing, so history never records its own
//! replays.
//!
//! A drag is one history step: its moves are not recorded until
//! [`EditorController::end_drag`] or the next intent closes the gesture.
//!
//! Until [`EditorController::initialize`] succeeds the controller is in a
//! fallback state: intents are ignored and `initialize` may be called again.

use crate::debounce::Debouncer;
use crate::history::History;
use crate::retry::RetryPolicy;
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use crate::sync::{Element, SceneSync, Surface, SyncError};
use crate::tools::{ConnectStep, ConnectTool, ToolKind};
use crate::worker::{WorkKind, WorkRequest, WorkResult, Worker};
use fc_core::id::{ConnectionId, NodeId};
use fc_core::layout::LayoutConfig;
use fc_core::model::{Document, NodeType, Point};
use fc_core::persist::{KeyValueStore, PersistError, Persistence, parse_share_fragment};
use fc_core::stats::DiagramStats;
use fc_core::EditorConfig;
use fc_render::{ExportError, ExportFormat};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;

/// Stroke used to mark the pending source in connection mode.
pub const CONNECT_HIGHLIGHT: &str = "#0984e3";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("editor failed to initialize after {attempts} attempts: {last}")]
    InitFailed { attempts: u32, last: SyncError },
    #[error("editor is not initialized")]
    NotReady,
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub struct EditorController<S: KeyValueStore> {
    config: EditorConfig,
    sync: Option<SceneSync>,
    history: History<Document>,
    persistence: Persistence<S>,
    autosave: Debouncer,
    /// Documents emitted by the synchronizer, not yet absorbed.
    changes: Rc<RefCell<VecDeque<Document>>>,
    /// Last time reported by the host, in milliseconds.
    now: u64,
    tool: ToolKind,
    connect: ConnectTool,
    worker: Option<Worker>,
    last_svg: Option<String>,
    last_stats: Option<DiagramStats>,
}

impl<S: KeyValueStore> EditorController<S> {
    /// A controller in the fallback (uninitialized) state.
    pub fn new(config: EditorConfig, store: S) -> Self {
        let persistence = Persistence::new(store, config.storage_key.clone(), config.app_version.clone());
        Self {
            history: History::new(Document::new(), config.max_history),
            autosave: Debouncer::new(config.autosave_debounce_ms),
            persistence,
            config,
            sync: None,
            changes: Rc::new(RefCell::new(VecDeque::new())),
            now: 0,
            tool: ToolKind::Select,
            connect: ConnectTool::new(),
            worker: None,
            last_svg: None,
            last_stats: None,
        }
    }

    /// Attach the synchronizer, retrying with backoff. The initial Document
    /// comes from `share_fragment` if it carries one, else from storage,
    /// else it is empty. On failure the controller stays uninitialized and
    /// this may be called again.
    pub fn initialize(
        &mut self,
        mut surface: impl FnMut() -> Surface,
        share_fragment: Option<&str>,
        sleep: impl FnMut(Duration),
    ) -> Result<(), ControllerError> {
        if let Some(mut old) = self.sync.take() {
            old.destroy();
        }
        let initial = self.initial_document(share_fragment);
        let policy = RetryPolicy::from_config(&self.config);
        let (min_zoom, max_zoom) = (self.config.min_zoom, self.config.max_zoom);

        let sync = policy
            .run(
                |attempt| {
                    log::debug!("initializing editor (attempt {attempt})");
                    let sink = Rc::clone(&self.changes);
                    SceneSync::initialize(
                        surface(),
                        initial.clone(),
                        Box::new(move |doc: &Document| sink.borrow_mut().push_back(doc.clone())),
                    )
                },
                sleep,
            )
            .map_err(|e| {
                log::error!("editor initialization gave up: {}", e.last);
                ControllerError::InitFailed {
                    attempts: e.attempts,
                    last: e.last,
                }
            })?
            .with_zoom_limits(min_zoom, max_zoom);

        self.history.reset(sync.get_data());
        self.changes.borrow_mut().clear();
        self.sync = Some(sync);
        self.tool = ToolKind::Select;
        self.connect.reset();
        Ok(())
    }

    fn initial_document(&self, share_fragment: Option<&str>) -> Option<Document> {
        if let Some(fragment) = share_fragment {
            match parse_share_fragment(fragment) {
                Ok(Some(doc)) => {
                    log::debug!("loading shared document {}", doc.id);
                    return Some(doc);
                }
                Ok(None) => {}
                Err(e) => log::warn!("ignoring unreadable share link: {e}"),
            }
        }
        match self.persistence.load() {
            Ok(doc) => doc,
            Err(e) => {
                log::error!("could not load saved document: {e}");
                None
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.sync.is_some()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn sync(&self) -> Option<&SceneSync> {
        self.sync.as_ref()
    }

    pub fn history(&self) -> &History<Document> {
        &self.history
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    pub fn document(&self) -> Option<Document> {
        self.sync.as_ref().map(SceneSync::get_data)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    /// Whether a repaint is due; resets the flag.
    pub fn take_render_request(&mut self) -> bool {
        self.sync.as_mut().is_some_and(SceneSync::take_render_request)
    }

    /// Whether an autosave is waiting for its quiet period.
    pub fn save_pending(&self) -> bool {
        self.autosave.is_pending()
    }

    fn ready(&mut self) -> Result<&mut SceneSync, ControllerError> {
        self.sync.as_mut().ok_or(ControllerError::NotReady)
    }

    /// Record queued Documents in history; schedule a save if any changed.
    /// Mid-gesture Documents are dropped; `end_drag` records the result.
    fn absorb(&mut self) {
        let pending: Vec<Document> = self.changes.borrow_mut().drain(..).collect();
        if self.sync.as_ref().is_some_and(SceneSync::is_dragging) {
            return;
        }
        let mut changed = false;
        for doc in pending {
            changed |= self.history.update(doc);
        }
        if changed {
            self.autosave.schedule(self.now);
        }
    }

    // ── Intents ──

    pub fn add_node(&mut self, kind: NodeType, x: f32, y: f32) -> Result<NodeId, ControllerError> {
        self.end_drag();
        let id = self.ready()?.add_node(kind, x, y)?;
        self.absorb();
        Ok(id)
    }

    pub fn add_connection(&mut self, from: NodeId, to: NodeId) -> Result<ConnectionId, ControllerError> {
        self.end_drag();
        let id = self.ready()?.add_connection(from, to)?;
        self.absorb();
        Ok(id)
    }

    pub fn delete_selected(&mut self) -> usize {
        self.end_drag();
        let Ok(sync) = self.ready() else { return 0 };
        let deleted = sync.delete_selected();
        self.absorb();
        deleted
    }

    pub fn remove_node(&mut self, id: NodeId) {
        self.end_drag();
        if let Ok(sync) = self.ready() {
            sync.remove_node(id);
            self.absorb();
        }
    }

    pub fn remove_connection(&mut self, id: ConnectionId) {
        self.end_drag();
        if let Ok(sync) = self.ready() {
            sync.remove_connection(id);
            self.absorb();
        }
    }

    /// One step of a drag gesture. Observers see every step; history sees
    /// the gesture once it ends.
    pub fn drag_node(&mut self, id: NodeId, dx: f32, dy: f32) -> bool {
        let moved = self.ready().is_ok_and(|s| s.drag_node(id, dx, dy));
        self.absorb();
        moved
    }

    /// Close the drag gesture and record where it ended as one history
    /// step. Returns whether a step was recorded.
    pub fn end_drag(&mut self) -> bool {
        let Some(sync) = self.sync.as_mut() else {
            return false;
        };
        if !sync.end_drag() {
            return false;
        }
        let doc = sync.get_data();
        self.changes.borrow_mut().clear();
        let recorded = self.history.update(doc);
        if recorded {
            self.autosave.schedule(self.now);
        }
        recorded
    }

    pub fn resize_node(&mut self, id: NodeId, width: f32, height: f32) -> bool {
        self.end_drag();
        let resized = self.ready().is_ok_and(|s| s.resize_node(id, width, height));
        self.absorb();
        resized
    }

    pub fn set_node_text(&mut self, id: NodeId, text: &str) -> bool {
        self.end_drag();
        let edited = self.ready().is_ok_and(|s| s.set_node_text(id, text));
        self.absorb();
        edited
    }

    pub fn select(&mut self, ids: &[NodeId]) {
        if let Ok(sync) = self.ready() {
            sync.select(ids);
        }
    }

    pub fn select_connection(&mut self, id: ConnectionId) {
        if let Ok(sync) = self.ready() {
            sync.select_connection(id);
        }
    }

    pub fn undo(&mut self) -> bool {
        self.step_history(History::undo)
    }

    pub fn redo(&mut self) -> bool {
        self.step_history(History::redo)
    }

    fn step_history(&mut self, step: fn(&mut History<Document>) -> bool) -> bool {
        self.end_drag();
        if self.sync.is_none() || !step(&mut self.history) {
            return false;
        }
        self.reload_current();
        true
    }

    /// Rebuild the scene from the history's current Document.
    fn reload_current(&mut self) {
        let doc = self.history.current().clone();
        if let Some(source) = self.connect.reset()
            && let Some(sync) = self.sync.as_mut()
        {
            sync.clear_highlight(source);
        }
        if let Some(sync) = self.sync.as_mut()
            && let Err(e) = sync.load_from_data(doc)
        {
            log::error!("could not rebuild scene: {e}");
        }
        self.autosave.schedule(self.now);
    }

    pub fn zoom_in(&mut self) -> f32 {
        let step = self.config.zoom_step;
        self.ready().map_or(1.0, |s| {
            let level = s.zoom() * step;
            s.set_zoom(level)
        })
    }

    pub fn zoom_out(&mut self) -> f32 {
        let step = self.config.zoom_step;
        self.ready().map_or(1.0, |s| {
            let level = s.zoom() / step;
            s.set_zoom(level)
        })
    }

    pub fn set_zoom(&mut self, level: f32) -> f32 {
        self.ready().map_or(1.0, |s| s.set_zoom(level))
    }

    pub fn center_view(&mut self) {
        if let Ok(sync) = self.ready() {
            sync.center_view();
        }
    }

    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if let Ok(sync) = self.ready() {
            sync.handle_resize(width, height);
        }
    }

    pub fn export(&mut self, format: ExportFormat) -> Result<String, ControllerError> {
        Ok(self.ready()?.export_as_image(format)?)
    }

    pub fn share_link(&mut self, origin: &str, pathname: &str) -> Result<String, ControllerError> {
        let doc = self.ready()?.get_data();
        Ok(self.persistence.share_link(origin, pathname, &doc)?)
    }

    /// Start over with an empty Document and no history.
    pub fn new_document(&mut self) {
        self.load_fresh(Document::new());
    }

    /// Replace the diagram with `doc` as one undoable step.
    pub fn load_document(&mut self, doc: Document) -> Result<(), ControllerError> {
        self.end_drag();
        self.ready()?.load_from_data(doc)?;
        let loaded = self.ready()?.get_data();
        if self.history.update(loaded) {
            self.autosave.schedule(self.now);
        }
        Ok(())
    }

    fn load_fresh(&mut self, doc: Document) {
        self.end_drag();
        let Ok(sync) = self.ready() else { return };
        if let Err(e) = sync.load_from_data(doc) {
            log::error!("could not load document: {e}");
            return;
        }
        let loaded = sync.get_data();
        self.connect.reset();
        self.history.reset(loaded);
        self.autosave.schedule(self.now);
    }

    /// Apply layout anchors as one undoable step.
    pub fn apply_layout(&mut self, positions: &[(NodeId, Point)]) -> usize {
        self.end_drag();
        let moved = self.ready().map_or(0, |s| s.apply_positions(positions));
        self.absorb();
        moved
    }

    // ── Tools and input ──

    pub fn set_tool(&mut self, tool: ToolKind) {
        if tool != ToolKind::Connect
            && let Some(source) = self.connect.reset()
            && let Some(sync) = self.sync.as_mut()
        {
            sync.clear_highlight(source);
        }
        self.tool = tool;
    }

    /// A click on the canvas at a screen point, interpreted by the active
    /// tool.
    pub fn click(&mut self, x: f32, y: f32) -> Result<(), ControllerError> {
        let hit = self.ready()?.hit_test(x, y);
        match self.tool {
            ToolKind::Select => {
                let sync = self.ready()?;
                match hit {
                    Some(Element::Node(id)) => sync.select(&[id]),
                    Some(Element::Connection(id)) => sync.select_connection(id),
                    None => sync.clear_selection(),
                }
            }
            ToolKind::Rectangle | ToolKind::Circle | ToolKind::Diamond => {
                let Some(kind) = self.tool.node_type() else {
                    return Ok(());
                };
                let p = self.ready()?.scene().screen_to_canvas(x, y);
                // Place the new shape centred on the click.
                let size = kind.default_size();
                let (ax, ay) = if kind.anchored_at_center() {
                    (p.x, p.y)
                } else {
                    (p.x - size.width / 2.0, p.y - size.height / 2.0)
                };
                self.add_node(kind, ax, ay)?;
                self.tool = ToolKind::Select;
            }
            ToolKind::Connect => {
                let node = match hit {
                    Some(Element::Node(id)) => Some(id),
                    _ => None,
                };
                match self.connect.click(node) {
                    ConnectStep::SourcePicked(id) => {
                        self.ready()?.highlight_node(id, CONNECT_HIGHLIGHT);
                    }
                    ConnectStep::Connect { from, to } => {
                        self.ready()?.clear_highlight(from);
                        self.add_connection(from, to)?;
                    }
                    ConnectStep::Cancelled(id) => {
                        self.ready()?.clear_highlight(id);
                    }
                    ConnectStep::Idle => {}
                }
            }
        }
        Ok(())
    }

    /// Resolve and run a keyboard shortcut. Returns the action taken.
    pub fn key_down(
        &mut self,
        key: &str,
        ctrl: bool,
        shift: bool,
        alt: bool,
        meta: bool,
    ) -> Option<ShortcutAction> {
        let action = ShortcutMap::resolve(key, ctrl, shift, alt, meta)?;
        match action {
            ShortcutAction::ToolSelect | ShortcutAction::Cancel => self.set_tool(ToolKind::Select),
            ShortcutAction::ToolRectangle => self.set_tool(ToolKind::Rectangle),
            ShortcutAction::ToolCircle => self.set_tool(ToolKind::Circle),
            ShortcutAction::ToolDiamond => self.set_tool(ToolKind::Diamond),
            ShortcutAction::ToolConnect => self.set_tool(ToolKind::Connect),
            ShortcutAction::Undo => {
                self.undo();
            }
            ShortcutAction::Redo => {
                self.redo();
            }
            ShortcutAction::Delete => {
                self.delete_selected();
            }
            ShortcutAction::ZoomIn => {
                self.zoom_in();
            }
            ShortcutAction::ZoomOut => {
                self.zoom_out();
            }
            ShortcutAction::CenterView => self.center_view(),
        }
        Some(action)
    }

    // ── Autosave ──

    /// Advance the host clock; writes the pending save once the quiet
    /// period has passed. Returns whether a save was attempted.
    pub fn tick(&mut self, now: u64) -> bool {
        self.now = now;
        if self.autosave.fire_due(now) {
            self.save_now();
            return true;
        }
        false
    }

    /// Write immediately if a save is pending.
    pub fn flush(&mut self) -> bool {
        self.end_drag();
        if !self.autosave.is_pending() {
            return false;
        }
        self.autosave.cancel();
        self.save_now();
        true
    }

    /// Failures are logged, never surfaced.
    fn save_now(&mut self) {
        let doc = self.history.current().clone();
        if let Err(e) = self.persistence.save(&doc) {
            log::error!("autosave failed: {e}");
        }
    }

    // ── Worker ──

    /// Start the background worker. Not available on targets without
    /// threads.
    pub fn enable_worker(&mut self) -> std::io::Result<()> {
        if self.worker.is_none() {
            self.worker = Some(Worker::spawn()?);
        }
        Ok(())
    }

    fn submit(&mut self, request: impl FnOnce(Document) -> WorkRequest) -> Option<u64> {
        let doc = self.sync.as_ref()?.get_data();
        self.worker.as_mut()?.submit(request(doc))
    }

    pub fn request_layout(&mut self, config: LayoutConfig) -> Option<u64> {
        self.submit(|doc| WorkRequest::Layout(doc, config))
    }

    pub fn request_svg(&mut self) -> Option<u64> {
        self.submit(WorkRequest::Svg)
    }

    pub fn request_stats(&mut self) -> Option<u64> {
        self.submit(WorkRequest::Stats)
    }

    /// Apply whatever current worker results have arrived. Returns the
    /// kinds handled.
    pub fn poll_worker(&mut self) -> Vec<WorkKind> {
        let Some(worker) = self.worker.as_mut() else {
            return Vec::new();
        };
        let mut handled = Vec::new();
        for response in worker.poll() {
            handled.push(response.kind);
            self.apply_work(response.result);
        }
        handled
    }

    /// Block up to `timeout` for the next current worker result and apply it.
    pub fn wait_worker(&mut self, timeout: Duration) -> Option<WorkKind> {
        let response = self.worker.as_mut()?.wait(timeout)?;
        let kind = response.kind;
        self.apply_work(response.result);
        Some(kind)
    }

    fn apply_work(&mut self, result: WorkResult) {
        match result {
            WorkResult::Layout(positions) => {
                self.apply_layout(&positions);
            }
            WorkResult::Svg(svg) => self.last_svg = Some(svg),
            WorkResult::Stats(stats) => self.last_stats = Some(stats),
        }
    }

    pub fn last_svg(&self) -> Option<&str> {
        self.last_svg.as_deref()
    }

    pub fn last_stats(&self) -> Option<&DiagramStats> {
        self.last_stats.as_ref()
    }

    /// Save anything pending and release the scene. Safe to call in the
    /// fallback state and more than once.
    pub fn destroy(&mut self) {
        self.flush();
        if let Some(mut sync) = self.sync.take() {
            sync.destroy();
        }
        self.worker = None;
    }
}
