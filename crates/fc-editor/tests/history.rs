use fc_core::id::NodeId;
use fc_core::model::{Document, Node, NodeType};
use fc_editor::History;
use pretty_assertions::assert_eq;

fn with_nodes(base: &Document, names: &[&str]) -> Document {
    let mut doc = base.clone();
    doc.nodes = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Node::with_id(
                NodeId::intern(name),
                NodeType::Rectangle,
                i as f32 * 200.0,
                0.0,
            )
        })
        .collect();
    doc
}

#[test]
fn recording_an_equal_document_changes_nothing() {
    let s0 = Document::new();
    let s1 = with_nodes(&s0, &["a"]);
    let mut history = History::new(s0.clone(), 50);
    assert!(history.update(s1.clone()));
    history.undo();
    assert!(history.can_redo());

    assert!(!history.update(s0.clone()));
    assert_eq!(history.past_len(), 0);
    assert!(history.can_redo(), "no-op update keeps the redo stack");
    assert_eq!(history.current(), &s0);
}

#[test]
fn oldest_snapshots_fall_off() {
    let s0 = Document::new();
    let s1 = with_nodes(&s0, &["a"]);
    let s2 = with_nodes(&s0, &["a", "b"]);
    let s3 = with_nodes(&s0, &["a", "b", "c"]);

    let mut history = History::new(s0, 2);
    for s in [&s1, &s2, &s3] {
        assert!(history.update(s.clone()));
    }
    assert_eq!(history.past_len(), 2);

    assert!(history.undo());
    assert!(history.undo());
    assert!(!history.undo());
    assert_eq!(history.current(), &s1);
    assert!(!history.can_undo());
}

#[test]
fn undo_then_redo_restores_each_state() {
    let s0 = Document::new();
    let s1 = with_nodes(&s0, &["a"]);
    let s2 = with_nodes(&s0, &["a", "b"]);
    let mut history = History::new(s0.clone(), 50);
    history.update(s1.clone());
    history.update(s2.clone());

    assert!(history.undo());
    assert_eq!(history.current(), &s1);
    assert!(history.undo());
    assert_eq!(history.current(), &s0);
    assert!(history.redo());
    assert_eq!(history.current(), &s1);
    assert!(history.redo());
    assert_eq!(history.current(), &s2);
    assert!(!history.redo());
}

#[test]
fn new_change_after_undo_drops_redo() {
    let s0 = Document::new();
    let s1 = with_nodes(&s0, &["a"]);
    let alt = with_nodes(&s0, &["z"]);
    let mut history = History::new(s0, 50);
    history.update(s1);
    history.undo();
    assert!(history.update(alt.clone()));
    assert!(!history.can_redo());
    assert_eq!(history.current(), &alt);
}

#[test]
fn reset_forgets_everything() {
    let s0 = Document::new();
    let s1 = with_nodes(&s0, &["a"]);
    let mut history = History::new(s0, 50);
    history.update(s1.clone());
    history.undo();

    let fresh = Document::new();
    history.reset(fresh.clone());
    assert_eq!(history.current(), &fresh);
    assert!(!history.can_undo());
    assert!(!history.can_redo());
}
