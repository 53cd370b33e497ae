//! Structural lint for diagram graphs.
//!
//! Reports invariant violations without modifying the graph. Adapters run
//! [`ensure_valid`] on every parse result; the editor runs it on repair
//! candidates.

use crate::error::ParseError;
use crate::id::NodeId;
use crate::model::{DiagramGraph, NodeKind};
use petgraph::algo::is_cyclic_directed;
use std::collections::HashSet;

// ─── Diagnostic types ────────────────────────────────────────────────────

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintSeverity {
    /// The graph violates a model invariant and must be rejected.
    Error,
    /// Informational.
    Warning,
}

/// A single lint diagnostic.
#[derive(Debug, Clone)]
pub struct LintDiagnostic {
    /// The node or edge this diagnostic refers to, if any.
    pub subject: Option<NodeId>,
    pub message: String,
    pub severity: LintSeverity,
    /// Short rule identifier (e.g. "dangling-edge").
    pub rule: &'static str,
}

// ─── Public API ──────────────────────────────────────────────────────────

/// Run all lint rules over the graph and return diagnostics.
#[must_use]
pub fn lint_graph(graph: &DiagramGraph) -> Vec<LintDiagnostic> {
    let mut diags = Vec::new();
    lint_duplicate_ids(graph, &mut diags);
    lint_dangling_edges(graph, &mut diags);
    lint_parents(graph, &mut diags);
    lint_containment_cycles(graph, &mut diags);
    lint_empty_boundaries(graph, &mut diags);
    diags
}

/// Reject the graph if any `Error`-severity rule fires.
pub fn ensure_valid(graph: &DiagramGraph) -> Result<(), ParseError> {
    let errors: Vec<String> = lint_graph(graph)
        .into_iter()
        .filter(|d| d.severity == LintSeverity::Error)
        .map(|d| d.message)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ParseError::Invariant(errors.join("; ")))
    }
}

// ─── Rules ───────────────────────────────────────────────────────────────

fn lint_duplicate_ids(graph: &DiagramGraph, diags: &mut Vec<LintDiagnostic>) {
    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id) {
            diags.push(error(
                node.id,
                "duplicate-id",
                format!("node `{}` appears more than once", node.id),
            ));
        }
    }
    let mut seen_edges = HashSet::new();
    for edge in &graph.edges {
        if !seen_edges.insert(edge.id) {
            diags.push(error(
                edge.id,
                "duplicate-id",
                format!("edge `{}` appears more than once", edge.id),
            ));
        }
    }
}

fn lint_dangling_edges(graph: &DiagramGraph, diags: &mut Vec<LintDiagnostic>) {
    for edge in &graph.edges {
        for end in [edge.source, edge.target] {
            if !graph.contains(end) {
                diags.push(error(
                    edge.id,
                    "dangling-edge",
                    format!("edge `{}` references missing node `{end}`", edge.id),
                ));
            }
        }
    }
}

fn lint_parents(graph: &DiagramGraph, diags: &mut Vec<LintDiagnostic>) {
    for node in &graph.nodes {
        let Some(parent) = node.parent else { continue };
        match graph.get(parent) {
            None => diags.push(error(
                node.id,
                "missing-parent",
                format!("node `{}` is inside missing group `{parent}`", node.id),
            )),
            Some(p) if !p.kind.is_grouping() => diags.push(error(
                node.id,
                "parent-not-boundary",
                format!(
                    "node `{}` is inside `{parent}`, which is a {} and cannot contain elements",
                    node.id,
                    p.kind.as_str()
                ),
            )),
            Some(_) => {}
        }
    }
}

fn lint_containment_cycles(graph: &DiagramGraph, diags: &mut Vec<LintDiagnostic>) {
    if is_cyclic_directed(&graph.containment()) {
        diags.push(LintDiagnostic {
            subject: None,
            message: "group containment forms a cycle".to_string(),
            severity: LintSeverity::Error,
            rule: "containment-cycle",
        });
    }
}

fn lint_empty_boundaries(graph: &DiagramGraph, diags: &mut Vec<LintDiagnostic>) {
    for node in graph.nodes.iter().filter(|n| n.kind == NodeKind::Boundary) {
        if graph.children(Some(node.id)).next().is_none() {
            diags.push(LintDiagnostic {
                subject: Some(node.id),
                message: format!("group `{}` contains no elements", node.id),
                severity: LintSeverity::Warning,
                rule: "empty-boundary",
            });
        }
    }
}

fn error(subject: NodeId, rule: &'static str, message: String) -> LintDiagnostic {
    LintDiagnostic {
        subject: Some(subject),
        message,
        severity: LintSeverity::Error,
        rule,
    }
}
