use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global string interner for diagram ids.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

static NODE_COUNTER: AtomicU64 = AtomicU64::new(1);
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Defines an interned identifier newtype.
///
/// Internally a 4-byte `Spur` index, so comparison and hashing are O(1). Serialized
/// as the plain string so documents stay readable JSON.
macro_rules! interned_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $counter:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Spur);

        impl $name {
            /// Intern a string as an id, or return the existing one.
            pub fn intern(s: &str) -> Self {
                Self(INTERNER.get_or_intern(s))
            }

            /// Resolve back to a string slice.
            pub fn as_str(&self) -> &str {
                INTERNER.resolve(&self.0)
            }

            /// Generate a fresh id (`node_12`, `conn_3`).
            ///
            /// The counter is process-wide and monotonic, so a generated id is
            /// never handed out twice. Callers that also hold ids loaded from
            /// storage must still check for collisions.
            pub fn generate() -> Self {
                let n = $counter.fetch_add(1, Ordering::Relaxed);
                Self::intern(&format!(concat!($prefix, "_{}"), n))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.as_str())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::intern(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::intern(&s))
            }
        }
    };
}

interned_id!(
    /// Identifier of a [`Node`](crate::model::Node).
    NodeId,
    "node",
    NODE_COUNTER
);

interned_id!(
    /// Identifier of a [`Connection`](crate::model::Connection) between two nodes.
    ConnectionId,
    "conn",
    CONNECTION_COUNTER
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = NodeId::intern("start");
        let b = NodeId::intern("start");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "start");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("node_"));

        let c = ConnectionId::generate();
        assert!(c.as_str().starts_with("conn_"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = NodeId::intern("decision_1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"decision_1\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
