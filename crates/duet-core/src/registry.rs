//! Category → adapter lookup.

use crate::adapter::{C4Adapter, DiagramAdapter, ErAdapter, FlowchartAdapter, SequenceAdapter};
use crate::category::DiagramCategory;
use std::sync::LazyLock;

static REGISTRY: LazyLock<AdapterRegistry> = LazyLock::new(AdapterRegistry::builtin);

/// Immutable mapping from every [`DiagramCategory`] to its adapter.
pub struct AdapterRegistry {
    er: ErAdapter,
    c4: C4Adapter,
    flowchart: FlowchartAdapter,
    sequence: SequenceAdapter,
}

impl AdapterRegistry {
    /// Registry holding the built-in adapter for each category.
    pub fn builtin() -> Self {
        Self {
            er: ErAdapter,
            c4: C4Adapter,
            flowchart: FlowchartAdapter,
            sequence: SequenceAdapter,
        }
    }

    pub fn get(&self, category: DiagramCategory) -> &dyn DiagramAdapter {
        match category {
            DiagramCategory::Er => &self.er,
            DiagramCategory::C4 => &self.c4,
            DiagramCategory::Flowchart => &self.flowchart,
            DiagramCategory::Sequence => &self.sequence,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn DiagramAdapter> {
        DiagramCategory::ALL.into_iter().map(|c| self.get(c))
    }

    /// Category of the first line that opens a known diagram.
    pub fn detect_category(&self, text: &str) -> Option<DiagramCategory> {
        text.lines().map(str::trim).find_map(|line| {
            self.iter()
                .find(|adapter| adapter.is_header(line))
                .map(|adapter| adapter.category())
        })
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Process-wide registry.
pub fn registry() -> &'static AdapterRegistry {
    &REGISTRY
}

/// Shorthand for `registry().get(category)`.
pub fn adapter(category: DiagramCategory) -> &'static dyn DiagramAdapter {
    REGISTRY.get(category)
}

/// Shorthand for `registry().detect_category(text)`.
pub fn detect_category(text: &str) -> Option<DiagramCategory> {
    REGISTRY.detect_category(text)
}
