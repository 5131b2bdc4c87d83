pub mod config;
pub mod id;
pub mod layout;
pub mod model;
pub mod persist;
pub mod sanitize;
pub mod stats;

pub use config::{EditorConfig, Theme};
pub use id::{ConnectionId, NodeId};
pub use layout::{LayoutConfig, suggest_layout};
pub use model::*;
pub use persist::{KeyValueStore, MemoryStore, PersistError, Persistence, parse_share_fragment};
pub use sanitize::{MarkupSanitizer, Sanitizer};
pub use stats::{DiagramStats, compute_stats};
