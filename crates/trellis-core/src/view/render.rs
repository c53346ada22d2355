//! Text renderers: Markdown outline, Mermaid flowchart, Graphviz DOT.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use super::{EdgeKind, PlanGraph, outline};
use crate::model::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkdownOptions {
    /// Append `(status)` to every line.
    pub include_status: bool,
    /// Put the initial scope entry above the outline.
    pub include_scope: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            include_status: true,
            include_scope: false,
        }
    }
}

/// Render the hierarchy as a nested Markdown list:
///
/// ```text
/// - epic1: Core engine (in_progress)
///   - story1: Parse plans (in_progress)
///     - task1: Write parser (complete)
/// ```
pub fn markdown(plan: &Plan, options: MarkdownOptions) -> String {
    let mut out = String::new();

    if options.include_scope {
        if let Some(scope) = plan.ledger().initial_scope() {
            let fence = "`".repeat(longest_backtick_run(scope.message()).max(2) + 1);
            let _ = writeln!(out, "## Initial scope ({})\n", scope.id());
            let _ = writeln!(out, "{fence}\n{}\n{fence}\n", scope.message().trim_end_matches('\n'));
        }
    }

    for line in outline(plan) {
        let _ = write!(
            out,
            "{:indent$}- {}: {}",
            "",
            line.id,
            single_line(line.description),
            indent = line.depth * 2
        );
        if options.include_status {
            let _ = write!(out, " ({})", line.status);
        }
        out.push('\n');
    }
    out
}

/// Render a Mermaid flowchart. Containment edges are solid, dependency
/// edges dotted.
pub fn mermaid(graph: &PlanGraph, include_descriptions: bool) -> String {
    let ids = mermaid_ids(graph);
    let mut out = String::from("graph TD\n");

    for node in &graph.nodes {
        let label = if include_descriptions {
            format!("{}: {}", node.id, single_line(&node.description))
        } else {
            node.id.clone()
        };
        let _ = writeln!(out, "    {}[\"{}\"]", ids[node.id.as_str()], mermaid_escape(&label));
    }
    for edge in &graph.edges {
        let (Some(from), Some(to)) = (ids.get(edge.from.as_str()), ids.get(edge.to.as_str())) else {
            continue;
        };
        let arrow = match edge.kind {
            EdgeKind::Contains => "-->",
            EdgeKind::DependsOn => "-.->",
        };
        let _ = writeln!(out, "    {from} {arrow} {to}");
    }
    out
}

/// Render a Graphviz digraph. Dependency edges are dashed.
pub fn graphviz(graph: &PlanGraph, include_descriptions: bool) -> String {
    let mut out = String::from("digraph plan {\n");

    for node in &graph.nodes {
        let label = if include_descriptions {
            format!("{}\n{}", node.id, node.description)
        } else {
            node.id.clone()
        };
        let _ = writeln!(
            out,
            "    \"{}\" [label=\"{}\"];",
            dot_escape(&node.id),
            dot_escape(&label)
        );
    }
    for edge in &graph.edges {
        let style = match edge.kind {
            EdgeKind::Contains => "",
            EdgeKind::DependsOn => " [style=dashed]",
        };
        let _ = writeln!(
            out,
            "    \"{}\" -> \"{}\"{style};",
            dot_escape(&edge.from),
            dot_escape(&edge.to)
        );
    }
    out.push_str("}\n");
    out
}

/// Mermaid node ids: the plan id with anything outside `[A-Za-z0-9_]`
/// replaced by `_`, suffixed when two ids collapse to the same name.
fn mermaid_ids(graph: &PlanGraph) -> HashMap<&str, String> {
    let mut issued: HashSet<String> = HashSet::new();
    let mut ids = HashMap::new();
    for node in &graph.nodes {
        let mut base: String = node
            .id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        // A lowercase `end` closes a subgraph.
        if base == "end" {
            base.push('_');
        }
        let mut id = base.clone();
        let mut n = 1;
        while issued.contains(&id) {
            n += 1;
            id = format!("{base}_{n}");
        }
        issued.insert(id.clone());
        ids.insert(node.id.as_str(), id);
    }
    ids
}

fn mermaid_escape(label: &str) -> String {
    label.replace('"', "#quot;")
}

fn dot_escape(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn longest_backtick_run(text: &str) -> usize {
    text.split(|c| c != '`').map(str::len).max().unwrap_or(0)
}
