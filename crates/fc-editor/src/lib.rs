pub mod controller;
pub mod debounce;
pub mod history;
pub mod retry;
pub mod shortcuts;
pub mod sync;
pub mod tools;
pub mod worker;

pub use controller::{ControllerError, EditorController};
pub use debounce::Debouncer;
pub use history::History;
pub use retry::RetryPolicy;
pub use shortcuts::{ShortcutAction, ShortcutMap};
pub use sync::{ChangeCallback, Element, SceneSync, Surface, SyncError};
pub use tools::{ConnectStep, ConnectTool, ToolKind};
pub use worker::{WorkKind, WorkRequest, WorkResult, Worker};
