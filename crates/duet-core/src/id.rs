use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global string interner for element IDs.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// A lightweight, interned identifier for diagram nodes and edges.
/// Internally a 4-byte `Spur` index with O(1) equality and hashing.
///
/// Ordering follows interning order, not the lexical order of the string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Spur);

/// Edges share the identifier space with nodes.
pub type EdgeId = NodeId;

impl NodeId {
    /// Intern a new string as a NodeId, or return existing if already interned.
    pub fn intern(s: &str) -> Self {
        NodeId(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Generate a unique ID with a kind prefix (e.g. `entity_1`, `container_2`).
    pub fn with_prefix(prefix: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::intern(&format!("{prefix}_{n}"))
    }
}

/// Deterministic edge ID for the `ordinal`-th edge between `source` and `target`.
pub fn edge_id(source: NodeId, target: NodeId, ordinal: usize) -> EdgeId {
    NodeId::intern(&format!(
        "{}__{}__{ordinal}",
        source.as_str(),
        target.as_str()
    ))
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::intern(s)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NodeId::intern(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = NodeId::intern("order_service");
        let b = NodeId::intern("order_service");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "order_service");
    }

    #[test]
    fn prefixed_ids_are_unique() {
        let a = NodeId::with_prefix("entity");
        let b = NodeId::with_prefix("entity");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("entity_"));
    }

    #[test]
    fn edge_ids_are_deterministic() {
        let a = NodeId::intern("api");
        let b = NodeId::intern("db");
        assert_eq!(edge_id(a, b, 0), edge_id(a, b, 0));
        assert_ne!(edge_id(a, b, 0), edge_id(a, b, 1));
        assert_ne!(edge_id(a, b, 0), edge_id(b, a, 0));
        assert_eq!(edge_id(a, b, 1).as_str(), "api__db__1");
    }
}
