use fc_core::id::{ConnectionId, NodeId};
use fc_core::model::{Connection, Document, Node, NodeType, Point, Size};
use fc_editor::sync::{Element, SceneSync, Surface, SyncError};
use fc_render::ExportFormat;
use fc_render::units::{arrowhead_of, connection_endpoints};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<Document>>>;

fn attach(initial: Option<Document>) -> (SceneSync, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let sync = SceneSync::initialize(
        Surface::new(1024, 768),
        initial,
        Box::new(move |doc: &Document| sink.borrow_mut().push(doc.clone())),
    )
    .unwrap();
    (sync, log)
}

fn flowchart() -> Document {
    let mut doc = Document::new();
    doc.name = "Checkout".into();
    let start = Node {
        text: "Start".into(),
        ..Node::with_id(NodeId::intern("start"), NodeType::Circle, 100.0, 100.0)
    };
    let check = Node {
        text: "In stock?".into(),
        ..Node::with_id(NodeId::intern("check"), NodeType::Diamond, 300.0, 60.0)
    };
    let ship = Node::with_id(NodeId::intern("ship"), NodeType::Rectangle, 600.0, 80.0);
    doc.connections.push(Connection::with_id(
        ConnectionId::intern("c1"),
        start.id,
        check.id,
    ));
    doc.connections.push(Connection {
        arrow: false,
        stroke: "#d63031".into(),
        ..Connection::with_id(ConnectionId::intern("c2"), check.id, ship.id)
    });
    doc.nodes.extend([start, check, ship]);
    doc
}

#[test]
fn load_then_get_data_roundtrips() {
    let doc = flowchart();
    let json = doc.to_json().unwrap();
    let (mut sync, log) = attach(None);
    sync.load_from_data(Document::from_json(&json).unwrap())
        .unwrap();
    assert_eq!(sync.get_data(), doc);
    assert!(log.borrow().is_empty(), "loading must not emit a change");
    assert_eq!(sync.scene().top_level().len(), 5);
}

#[test]
fn initialize_with_document_populates_scene() {
    let (sync, log) = attach(Some(flowchart()));
    assert_eq!(sync.node_ids().len(), 3);
    assert_eq!(sync.connection_ids().len(), 2);
    assert!(log.borrow().is_empty());

    // The arrowless connection has no arrowhead.
    let c2 = sync.connection_handle(ConnectionId::intern("c2")).unwrap();
    assert!(arrowhead_of(sync.scene(), c2).is_none());
    let c1 = sync.connection_handle(ConnectionId::intern("c1")).unwrap();
    assert!(arrowhead_of(sync.scene(), c1).is_some());
}

#[test]
fn connector_follows_dragged_node() {
    let (mut sync, log) = attach(None);
    let a = sync.add_node(NodeType::Rectangle, 200.0, 200.0).unwrap();
    let b = sync.add_node(NodeType::Circle, 400.0, 200.0).unwrap();
    let conn = sync.add_connection(a, b).unwrap();
    log.borrow_mut().clear();

    assert!(sync.drag_node(a, -100.0, 150.0));
    let handle = sync.connection_handle(conn).unwrap();
    let (from, to) = connection_endpoints(sync.scene(), handle).unwrap();
    assert_eq!(from, Point::new(175.0, 390.0));
    assert_eq!(to, Point::new(400.0, 200.0));
    assert_eq!(from, sync.node_center(a).unwrap());

    let doc = sync.get_data();
    assert_eq!(doc.nodes[0].position, Point::new(100.0, 350.0));
    assert_eq!(
        doc.connections[0].points,
        Some([175.0, 390.0, 400.0, 200.0])
    );
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn drag_back_to_start_keeps_timestamp() {
    let (mut sync, _) = attach(None);
    let a = sync.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    let before = sync.get_data();
    std::thread::sleep(std::time::Duration::from_millis(5));
    assert!(sync.drag_node(a, 30.0, 0.0));
    assert!(sync.get_data().updated_at > before.updated_at);
    assert!(sync.drag_node(a, -30.0, 0.0));
    assert!(sync.end_drag());
    assert_eq!(sync.get_data(), before);

    assert!(sync.move_node_to(a, 0.0, 0.0));
    sync.end_drag();
    assert_eq!(sync.get_data().updated_at, before.updated_at);
}

#[test]
fn drag_away_restamps_document() {
    let (mut sync, log) = attach(None);
    let a = sync.add_node(NodeType::Rectangle, 0.0, 0.0).unwrap();
    let before = sync.get_data();
    log.borrow_mut().clear();
    std::thread::sleep(std::time::Duration::from_millis(5));

    assert!(sync.drag_node(a, 30.0, 0.0));
    assert!(sync.drag_node(a, 10.0, 5.0));
    assert!(sync.end_drag());
    let after = sync.get_data();
    assert_eq!(after.nodes[0].position, Point::new(40.0, 5.0));
    assert!(after.updated_at > before.updated_at);
    assert_eq!(log.borrow().len(), 2, "every drag step still notifies");
}

#[test]
fn dragged_connector_snaps_back() {
    let (mut sync, _) = attach(Some(flowchart()));
    let c1 = ConnectionId::intern("c1");
    let before = sync.get_data();
    assert!(sync.drag_connection(c1, 50.0, 50.0));

    let handle = sync.connection_handle(c1).unwrap();
    let (from, to) = connection_endpoints(sync.scene(), handle).unwrap();
    assert_eq!(from, sync.node_center(NodeId::intern("start")).unwrap());
    assert_eq!(to, sync.node_center(NodeId::intern("check")).unwrap());
    assert_eq!(sync.get_data().nodes, before.nodes);
}

#[test]
fn remove_node_cascades_once() {
    let (mut sync, log) = attach(Some(flowchart()));
    sync.remove_node(NodeId::intern("check"));

    let doc = sync.get_data();
    assert_eq!(doc.nodes.len(), 2);
    assert!(doc.connections.is_empty());
    assert!(doc.validate().is_ok());
    assert_eq!(sync.scene().top_level().len(), 2);
    assert_eq!(log.borrow().len(), 1);

    sync.remove_node(NodeId::intern("check"));
    sync.remove_connection(ConnectionId::intern("c1"));
    assert_eq!(log.borrow().len(), 1, "unknown ids are no-ops");
}

#[test]
fn delete_selected_connection_leaves_nodes() {
    let (mut sync, log) = attach(Some(flowchart()));
    sync.select_connection(ConnectionId::intern("c1"));
    assert_eq!(
        sync.selection(),
        vec![Element::Connection(ConnectionId::intern("c1"))]
    );

    assert_eq!(sync.delete_selected(), 1);
    let doc = sync.get_data();
    assert_eq!(doc.nodes.len(), 3);
    assert_eq!(doc.connections.len(), 1);
    assert!(doc.validate().is_ok());
    assert!(sync.selection().is_empty());
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn delete_selected_node_and_its_connection_together() {
    let (mut sync, log) = attach(Some(flowchart()));
    sync.select(&[NodeId::intern("start"), NodeId::intern("ship")]);
    assert_eq!(sync.delete_selected(), 2);

    let doc = sync.get_data();
    assert_eq!(doc.nodes.len(), 1);
    assert!(doc.connections.is_empty());
    assert!(doc.validate().is_ok());
    assert_eq!(log.borrow().len(), 1, "one change for the whole batch");

    assert_eq!(sync.delete_selected(), 0);
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn add_connection_to_missing_node_fails_cleanly() {
    let (mut sync, log) = attach(Some(flowchart()));
    let before = sync.get_data();
    let err = sync
        .add_connection(NodeId::intern("nowhere"), NodeId::intern("start"))
        .unwrap_err();
    assert!(matches!(err, SyncError::NodesNotFound { .. }));
    assert_eq!(sync.get_data(), before);
    assert!(log.borrow().is_empty());
}

#[test]
fn dangling_connections_are_skipped_on_load() {
    let mut doc = flowchart();
    doc.connections.push(Connection::with_id(
        ConnectionId::intern("ghost_link"),
        NodeId::intern("ship"),
        NodeId::intern("ghost"),
    ));
    let (sync, _) = attach(Some(doc));
    let loaded = sync.get_data();
    assert_eq!(loaded.connections.len(), 2);
    assert!(loaded.validate().is_ok());
}

#[test]
fn self_loop_renders_without_arrowhead() {
    let (mut sync, _) = attach(None);
    let a = sync.add_node(NodeType::Diamond, 50.0, 50.0).unwrap();
    let loop_id = sync.add_connection(a, a).unwrap();
    let handle = sync.connection_handle(loop_id).unwrap();
    assert!(arrowhead_of(sync.scene(), handle).is_none());

    sync.remove_node(a);
    assert!(sync.get_data().connections.is_empty());
}

#[test]
fn resize_and_text_edit_flow_into_document() {
    let (mut sync, log) = attach(None);
    let c = sync.add_node(NodeType::Circle, 300.0, 300.0).unwrap();
    assert!(sync.resize_node(c, 200.0, 120.0));
    assert!(sync.set_node_text(c, "Done"));

    let node = sync.get_data().nodes[0].clone();
    assert_eq!(node.size, Size::new(200.0, 120.0));
    assert_eq!(node.position, Point::new(300.0, 300.0));
    assert_eq!(node.text, "Done");
    assert_eq!(log.borrow().len(), 3);

    assert!(!sync.resize_node(c, 0.0, 10.0));
    assert!(!sync.set_node_text(NodeId::intern("missing"), "x"));
}

#[test]
fn generated_ids_skip_loaded_ones() {
    let probe = NodeId::generate();
    let n: u64 = probe.as_str().trim_start_matches("node_").parse().unwrap();
    let mut doc = Document::new();
    for i in 1..=20 {
        doc.nodes.push(Node::with_id(
            NodeId::intern(&format!("node_{}", n + i)),
            NodeType::Rectangle,
            0.0,
            0.0,
        ));
    }
    let loaded: Vec<NodeId> = doc.nodes.iter().map(|n| n.id).collect();
    let (mut sync, _) = attach(Some(doc));
    let fresh = sync.add_node(NodeType::Circle, 0.0, 0.0).unwrap();
    assert!(!loaded.contains(&fresh));
    assert_eq!(sync.get_data().nodes.len(), 21);
    assert!(sync.get_data().validate().is_ok());
}

#[test]
fn apply_positions_is_one_change() {
    let (mut sync, log) = attach(Some(flowchart()));
    let moved = sync.apply_positions(&[
        (NodeId::intern("start"), Point::new(0.0, 0.0)),
        (NodeId::intern("ship"), Point::new(900.0, 500.0)),
        (NodeId::intern("unknown"), Point::new(1.0, 1.0)),
    ]);
    assert_eq!(moved, 2);
    assert_eq!(log.borrow().len(), 1);

    let c1 = sync.connection_handle(ConnectionId::intern("c1")).unwrap();
    let (from, _) = connection_endpoints(sync.scene(), c1).unwrap();
    assert_eq!(from, Point::new(0.0, 0.0));
}

#[test]
fn hit_test_finds_nodes_and_background() {
    let (mut sync, _) = attach(None);
    let a = sync.add_node(NodeType::Rectangle, 100.0, 100.0).unwrap();
    assert_eq!(sync.hit_test(110.0, 110.0), Some(Element::Node(a)));
    assert_eq!(sync.hit_test(900.0, 700.0), None);
}

#[test]
fn svg_export_scenario() {
    let (mut sync, _) = attach(None);
    let a = sync.add_node(NodeType::Rectangle, 200.0, 200.0).unwrap();
    let b = sync.add_node(NodeType::Circle, 400.0, 200.0).unwrap();
    sync.add_connection(a, b).unwrap();
    sync.set_zoom(2.5);

    let svg = sync.export_as_image(ExportFormat::Svg).unwrap();
    assert!(svg.contains("<svg"));
    assert!(svg.contains("</svg>"));
    assert!(svg.contains("<rect transform="));
    assert!(svg.contains("<ellipse"));
    assert!(svg.contains("<line"));

    let png = sync.export_as_image(ExportFormat::Png).unwrap();
    assert!(png.starts_with("data:image/png;base64,"));
}
