use fc_core::EditorConfig;
use fc_core::layout::LayoutConfig;
use fc_core::model::{Document, Node, NodeType, Point};
use fc_core::persist::{KeyValueStore, MemoryStore, fragment_of};
use fc_editor::sync::Surface;
use fc_editor::{ControllerError, EditorController, ShortcutAction, ToolKind, WorkKind};
use fc_render::ExportFormat;
use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::time::Duration;

fn surface() -> Surface {
    Surface::new(800, 600)
}

fn no_sleep(_: Duration) {}

fn ready(store: MemoryStore) -> EditorController<MemoryStore> {
    let mut ctrl = EditorController::new(EditorConfig::default(), store);
    ctrl.initialize(surface, None, no_sleep).unwrap();
    ctrl
}

fn stored(store: &MemoryStore) -> Option<Document> {
    let key = EditorConfig::default().storage_key;
    store
        .get(&key)
        .unwrap()
        .map(|json| Document::from_json(&json).unwrap())
}

#[test]
fn initialize_retries_until_surface_has_size() {
    let calls = Cell::new(0);
    let flaky = || {
        calls.set(calls.get() + 1);
        if calls.get() < 3 {
            Surface::new(0, 0)
        } else {
            surface()
        }
    };
    let mut delays = Vec::new();
    let mut ctrl = EditorController::new(EditorConfig::default(), MemoryStore::new());
    ctrl.initialize(flaky, None, |d| delays.push(d)).unwrap();

    assert!(ctrl.is_ready());
    assert_eq!(calls.get(), 3);
    assert_eq!(
        delays,
        vec![Duration::from_millis(200), Duration::from_millis(400)]
    );
}

#[test]
fn failed_initialize_leaves_fallback_state() {
    let mut ctrl = EditorController::new(EditorConfig::default(), MemoryStore::new());
    let err = ctrl
        .initialize(|| Surface::new(0, 0), None, no_sleep)
        .unwrap_err();
    assert!(matches!(err, ControllerError::InitFailed { attempts: 3, .. }));
    assert!(!ctrl.is_ready());
    assert!(ctrl.document().is_none());
    assert!(matches!(
        ctrl.add_node(NodeType::Rectangle, 0.0, 0.0),
        Err(ControllerError::NotReady)
    ));
    assert!(!ctrl.undo());
    assert_eq!(ctrl.delete_selected(), 0);

    // A manual retry recovers.
    ctrl.initialize(surface, None, no_sleep).unwrap();
    assert!(ctrl.is_ready());
    ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
}

#[test]
fn autosave_waits_for_quiet_period() {
    let store = MemoryStore::new();
    let mut ctrl = ready(store.clone());

    ctrl.add_node(NodeType::Rectangle, 10.0, 10.0).unwrap();
    assert!(ctrl.save_pending());
    assert!(!ctrl.tick(500));

    ctrl.add_node(NodeType::Circle, 400.0, 300.0).unwrap();
    assert!(!ctrl.tick(1200));
    assert!(stored(&store).is_none());

    assert!(ctrl.tick(1500));
    assert!(!ctrl.save_pending());
    let saved = stored(&store).unwrap();
    assert_eq!(saved.nodes.len(), 2);
    let meta = saved.metadata.unwrap();
    assert!(meta.updated_at.is_some());
    assert_eq!(meta.version.as_deref(), Some(ctrl.config().app_version.as_str()));

    assert!(!ctrl.tick(5000), "nothing left to save");
}

#[test]
fn reload_restores_saved_diagram() {
    let store = MemoryStore::new();
    let mut first = ready(store.clone());
    let a = first.add_node(NodeType::Rectangle, 200.0, 200.0).unwrap();
    let b = first.add_node(NodeType::Diamond, 500.0, 180.0).unwrap();
    first.add_connection(a, b).unwrap();
    first.set_node_text(b, "OK?");
    assert!(first.flush());
    let before = first.document().unwrap();

    let second = ready(store);
    let after = second.document().unwrap();
    assert_eq!(after.nodes, before.nodes);
    assert_eq!(after.connections, before.connections);
    assert!(!second.can_undo());
}

#[test]
fn share_link_wins_over_storage() {
    let mut author = ready(MemoryStore::new());
    let a = author.add_node(NodeType::Circle, 300.0, 300.0).unwrap();
    let b = author.add_node(NodeType::Rectangle, 500.0, 260.0).unwrap();
    author.add_connection(a, b).unwrap();
    let link = author.share_link("https://flow.test", "/edit").unwrap();
    assert!(link.starts_with("https://flow.test/edit#data="));

    let mut saved = Document::new();
    saved.nodes.push(Node::new(NodeType::Diamond, 0.0, 0.0));
    let store = MemoryStore::new();
    let mut previous = ready(store.clone());
    previous.load_document(saved).unwrap();
    assert!(previous.flush());

    let mut reader = EditorController::new(EditorConfig::default(), store);
    reader
        .initialize(surface, fragment_of(&link), no_sleep)
        .unwrap();
    let shared = reader.document().unwrap();
    let original = author.document().unwrap();
    assert_eq!(shared.nodes, original.nodes);
    assert_eq!(shared.connections.len(), 1);
}

#[test]
fn broken_share_fragment_falls_back_to_storage() {
    let store = MemoryStore::new();
    let mut writer = ready(store.clone());
    writer.add_node(NodeType::Rectangle, 5.0, 5.0).unwrap();
    writer.flush();

    let mut reader = EditorController::new(EditorConfig::default(), store);
    reader
        .initialize(surface, Some("#data=%7Bnot-json"), no_sleep)
        .unwrap();
    assert_eq!(reader.document().unwrap().nodes.len(), 1);
}

#[test]
fn storage_failures_are_not_surfaced() {
    let store = MemoryStore::with_quota(16);
    let mut ctrl = ready(store.clone());
    ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    assert!(ctrl.tick(1000));
    assert!(store.is_empty());
    assert!(ctrl.is_ready());
    ctrl.add_node(NodeType::Circle, 300.0, 300.0).unwrap();
}

#[test]
fn undo_and_redo_drive_the_scene() {
    let mut ctrl = ready(MemoryStore::new());
    let a = ctrl.add_node(NodeType::Rectangle, 100.0, 100.0).unwrap();
    assert!(ctrl.drag_node(a, 50.0, 0.0));

    assert!(ctrl.undo());
    let sync = ctrl.sync().unwrap();
    assert_eq!(sync.node_center(a), Some(Point::new(175.0, 140.0)));
    assert_eq!(ctrl.document().unwrap().nodes[0].position, Point::new(100.0, 100.0));
    assert!(ctrl.can_redo());

    assert!(ctrl.redo());
    assert_eq!(ctrl.document().unwrap().nodes[0].position, Point::new(150.0, 100.0));

    assert!(ctrl.undo());
    assert!(ctrl.undo());
    assert!(ctrl.document().unwrap().nodes.is_empty());
    assert!(!ctrl.undo());
}

#[test]
fn replay_is_not_recorded() {
    let mut ctrl = ready(MemoryStore::new());
    ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    ctrl.add_node(NodeType::Circle, 300.0, 300.0).unwrap();
    assert_eq!(ctrl.history().past_len(), 2);

    ctrl.undo();
    assert_eq!(ctrl.history().past_len(), 1);
    assert_eq!(ctrl.history().future_len(), 1);
}

#[test]
fn drag_there_and_back_records_nothing() {
    let mut ctrl = ready(MemoryStore::new());
    let a = ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    assert_eq!(ctrl.history().past_len(), 1);
    let before = ctrl.document().unwrap();

    assert!(ctrl.drag_node(a, 30.0, 0.0));
    assert!(ctrl.drag_node(a, -30.0, 0.0));
    assert!(!ctrl.end_drag());
    assert_eq!(ctrl.history().past_len(), 1);
    assert_eq!(ctrl.document().unwrap().updated_at, before.updated_at);
}

#[test]
fn drag_gesture_is_one_undo_step() {
    let store = MemoryStore::new();
    let mut ctrl = ready(store.clone());
    let a = ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    ctrl.flush();

    for _ in 0..5 {
        assert!(ctrl.drag_node(a, 10.0, 4.0));
    }
    assert_eq!(ctrl.history().past_len(), 1);
    assert!(!ctrl.save_pending());
    assert_eq!(ctrl.document().unwrap().nodes[0].position, Point::new(50.0, 20.0));

    assert!(ctrl.end_drag());
    assert_eq!(ctrl.history().past_len(), 2);
    assert!(ctrl.flush());
    assert_eq!(stored(&store).unwrap().nodes[0].position, Point::new(50.0, 20.0));

    assert!(ctrl.undo());
    assert_eq!(ctrl.document().unwrap().nodes[0].position, Point::new(0.0, 0.0));
}

#[test]
fn next_intent_closes_open_drag() {
    let mut ctrl = ready(MemoryStore::new());
    let a = ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    assert!(ctrl.drag_node(a, 20.0, 0.0));
    assert!(ctrl.set_node_text(a, "Moved"));
    assert_eq!(ctrl.history().past_len(), 3);

    assert!(ctrl.undo());
    let node = ctrl.document().unwrap().nodes[0].clone();
    assert_eq!(node.position, Point::new(20.0, 0.0));
    assert_eq!(node.text, "Text");
}

#[test]
fn shape_tools_place_centred_and_revert() {
    let mut ctrl = ready(MemoryStore::new());
    assert_eq!(
        ctrl.key_down("r", false, false, false, false),
        Some(ShortcutAction::ToolRectangle)
    );
    assert_eq!(ctrl.tool(), ToolKind::Rectangle);
    ctrl.click(300.0, 300.0).unwrap();
    assert_eq!(ctrl.tool(), ToolKind::Select);

    ctrl.set_tool(ToolKind::Circle);
    ctrl.click(600.0, 400.0).unwrap();

    let doc = ctrl.document().unwrap();
    assert_eq!(doc.nodes[0].position, Point::new(225.0, 260.0));
    assert_eq!(doc.nodes[1].position, Point::new(600.0, 400.0));
}

#[test]
fn connect_tool_links_two_clicked_nodes() {
    let mut ctrl = ready(MemoryStore::new());
    let a = ctrl.add_node(NodeType::Rectangle, 100.0, 100.0).unwrap();
    let b = ctrl.add_node(NodeType::Circle, 600.0, 400.0).unwrap();

    ctrl.key_down("a", false, false, false, false);
    ctrl.click(120.0, 120.0).unwrap();
    assert!(ctrl.sync().unwrap().is_highlighted(a));
    // The highlight is visual only.
    assert!(ctrl.document().unwrap().connections.is_empty());

    ctrl.click(600.0, 400.0).unwrap();
    let doc = ctrl.document().unwrap();
    assert_eq!(doc.connections.len(), 1);
    assert_eq!((doc.connections[0].from, doc.connections[0].to), (a, b));
    assert!(!ctrl.sync().unwrap().is_highlighted(a));
    assert_eq!(doc.nodes[0].style.stroke, "#333333");
}

#[test]
fn escape_cancels_pending_connection() {
    let mut ctrl = ready(MemoryStore::new());
    let a = ctrl.add_node(NodeType::Rectangle, 100.0, 100.0).unwrap();
    ctrl.set_tool(ToolKind::Connect);
    ctrl.click(120.0, 120.0).unwrap();
    assert!(ctrl.sync().unwrap().is_highlighted(a));

    assert_eq!(
        ctrl.key_down("Escape", false, false, false, false),
        Some(ShortcutAction::Cancel)
    );
    assert_eq!(ctrl.tool(), ToolKind::Select);
    assert!(!ctrl.sync().unwrap().is_highlighted(a));
}

#[test]
fn select_and_delete_via_keyboard() {
    let mut ctrl = ready(MemoryStore::new());
    let a = ctrl.add_node(NodeType::Rectangle, 100.0, 100.0).unwrap();
    let b = ctrl.add_node(NodeType::Circle, 600.0, 400.0).unwrap();
    ctrl.add_connection(a, b).unwrap();

    ctrl.click(110.0, 110.0).unwrap();
    ctrl.key_down("Delete", false, false, false, false);
    let doc = ctrl.document().unwrap();
    assert_eq!(doc.nodes.len(), 1);
    assert!(doc.connections.is_empty());

    ctrl.key_down("z", true, false, false, false);
    let doc = ctrl.document().unwrap();
    assert_eq!(doc.nodes.len(), 2);
    assert_eq!(doc.connections.len(), 1);
}

#[test]
fn zoom_steps_are_clamped() {
    let mut ctrl = ready(MemoryStore::new());
    let level = ctrl.zoom_in();
    assert!((level - 1.1).abs() < 1e-6);
    for _ in 0..100 {
        ctrl.zoom_in();
    }
    assert_eq!(ctrl.set_zoom(50.0), 5.0);
    assert_eq!(ctrl.set_zoom(0.0), 0.1);
    assert_eq!(ctrl.set_zoom(f32::NAN), 1.0);
}

#[test]
fn new_document_forgets_history() {
    let store = MemoryStore::new();
    let mut ctrl = ready(store.clone());
    ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    ctrl.new_document();
    assert!(ctrl.document().unwrap().is_empty());
    assert!(!ctrl.can_undo());
    assert!(ctrl.flush());
    assert!(stored(&store).unwrap().nodes.is_empty());
}

#[test]
fn loading_a_document_is_undoable() {
    let mut ctrl = ready(MemoryStore::new());
    ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    let mut other = Document::new();
    other.nodes.push(Node::new(NodeType::Diamond, 40.0, 40.0));
    other.nodes.push(Node::new(NodeType::Circle, 400.0, 40.0));
    ctrl.load_document(other).unwrap();
    assert_eq!(ctrl.document().unwrap().nodes.len(), 2);

    assert!(ctrl.undo());
    assert_eq!(ctrl.document().unwrap().nodes.len(), 1);
}

#[test]
fn export_formats() {
    let mut ctrl = ready(MemoryStore::new());
    ctrl.add_node(NodeType::Rectangle, 200.0, 200.0).unwrap();
    let svg = ctrl.export(ExportFormat::Svg).unwrap();
    assert!(svg.contains("<svg"));
    let png = ctrl.export(ExportFormat::Png).unwrap();
    assert!(png.starts_with("data:image/png;base64,"));
}

#[test]
fn worker_results_flow_back() {
    let mut ctrl = ready(MemoryStore::new());
    let a = ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    let b = ctrl.add_node(NodeType::Circle, 10.0, 10.0).unwrap();
    ctrl.add_connection(a, b).unwrap();
    ctrl.enable_worker().unwrap();

    ctrl.request_stats().unwrap();
    assert_eq!(ctrl.wait_worker(Duration::from_secs(5)), Some(WorkKind::Stats));
    assert_eq!(ctrl.last_stats().unwrap().nodes, 2);

    ctrl.request_svg().unwrap();
    assert_eq!(ctrl.wait_worker(Duration::from_secs(5)), Some(WorkKind::Svg));
    assert!(ctrl.last_svg().unwrap().contains("<svg"));

    let past = ctrl.history().past_len();
    ctrl.request_layout(LayoutConfig::default()).unwrap();
    assert_eq!(ctrl.wait_worker(Duration::from_secs(5)), Some(WorkKind::Layout));
    assert!(ctrl.history().past_len() <= past + 1);
    assert!(ctrl.document().unwrap().validate().is_ok());
}

#[test]
fn destroy_flushes_and_is_idempotent() {
    let store = MemoryStore::new();
    let mut ctrl = ready(store.clone());
    ctrl.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    ctrl.destroy();
    assert!(!ctrl.is_ready());
    assert_eq!(stored(&store).unwrap().nodes.len(), 1);
    ctrl.destroy();
}
