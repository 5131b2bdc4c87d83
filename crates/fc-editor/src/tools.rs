//! Tool system for canvas clicks.
//!
//! The active tool decides what a click on the canvas means: select a unit,
//! place a shape, or pick the two ends of a new connection.

use fc_core::id::NodeId;
use fc_core::model::NodeType;

/// The active tool determines how clicks are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolKind {
    #[default]
    Select,
    Rectangle,
    Circle,
    Diamond,
    Connect,
}

impl ToolKind {
    /// The shape a placement tool creates.
    pub const fn node_type(self) -> Option<NodeType> {
        match self {
            ToolKind::Rectangle => Some(NodeType::Rectangle),
            ToolKind::Circle => Some(NodeType::Circle),
            ToolKind::Diamond => Some(NodeType::Diamond),
            ToolKind::Select | ToolKind::Connect => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "select" => Some(ToolKind::Select),
            "rectangle" | "rect" => Some(ToolKind::Rectangle),
            "circle" => Some(ToolKind::Circle),
            "diamond" => Some(ToolKind::Diamond),
            "connect" => Some(ToolKind::Connect),
            _ => None,
        }
    }
}

/// What a click in connection mode resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    /// First endpoint chosen; highlight it.
    SourcePicked(NodeId),
    /// Second endpoint chosen; create the connection and unhighlight `from`.
    Connect { from: NodeId, to: NodeId },
    /// Clicked empty space or the source again; unhighlight it.
    Cancelled(NodeId),
    /// Empty-space click with nothing picked.
    Idle,
}

/// Two-click connection state machine.
#[derive(Debug, Clone, Default)]
pub struct ConnectTool {
    source: Option<NodeId>,
}

impl ConnectTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    /// Feed a click; `hit` is the node under the pointer, if any.
    pub fn click(&mut self, hit: Option<NodeId>) -> ConnectStep {
        match (self.source, hit) {
            (None, Some(node)) => {
                self.source = Some(node);
                ConnectStep::SourcePicked(node)
            }
            (None, None) => ConnectStep::Idle,
            (Some(from), Some(to)) if from != to => {
                self.source = None;
                ConnectStep::Connect { from, to }
            }
            (Some(from), _) => {
                self.source = None;
                ConnectStep::Cancelled(from)
            }
        }
    }

    /// Drop a pending source, returning it so the caller can unhighlight.
    pub fn reset(&mut self) -> Option<NodeId> {
        self.source.take()
    }
}
