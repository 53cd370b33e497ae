use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A diagram grammar family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramCategory {
    /// Entity-relationship (`erDiagram`).
    Er,
    /// Layered architecture / C4 (`C4Context`, `C4Container`, ...).
    C4,
    /// Flowchart (`flowchart TD`, `graph LR`).
    Flowchart,
    /// Sequence (`sequenceDiagram`).
    Sequence,
}

impl DiagramCategory {
    pub const ALL: [DiagramCategory; 4] = [
        DiagramCategory::Er,
        DiagramCategory::C4,
        DiagramCategory::Flowchart,
        DiagramCategory::Sequence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DiagramCategory::Er => "erd",
            DiagramCategory::C4 => "c4",
            DiagramCategory::Flowchart => "flowchart",
            DiagramCategory::Sequence => "sequence",
        }
    }
}

impl fmt::Display for DiagramCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagramCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "erd" | "er" | "entity_relationship" | "entity-relationship" => Ok(DiagramCategory::Er),
            "c4" | "architecture" | "c4_context" | "c4_container" | "c4_component" => {
                Ok(DiagramCategory::C4)
            }
            "flowchart" | "flow" | "graph" => Ok(DiagramCategory::Flowchart),
            "sequence" | "sequence_diagram" | "seq" => Ok(DiagramCategory::Sequence),
            other => Err(format!("unknown diagram category `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for category in DiagramCategory::ALL {
            assert_eq!(category.as_str().parse::<DiagramCategory>(), Ok(category));
        }
    }

    #[test]
    fn aliases_and_unknowns() {
        assert_eq!("ER".parse::<DiagramCategory>(), Ok(DiagramCategory::Er));
        assert_eq!("c4_container".parse::<DiagramCategory>(), Ok(DiagramCategory::C4));
        assert!("gantt".parse::<DiagramCategory>().is_err());
    }
}
