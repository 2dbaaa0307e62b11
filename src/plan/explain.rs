//! Text rendering of a plan tree.
//!
//! One line per operator, indented by depth, with the figures a reader
//! scans for first: physical operator, estimated rows, and cost share.

use std::fmt::Write;

use crate::plan::metrics::metrics_for;
use crate::plan::model::{Operator, Statement};

/// Renders a statement's plan tree as an indented outline.
///
/// ```text
/// Nested Loops (Inner Join)  rows=100  cost=100.0%
///   Index Seek  rows=100  cost=4.0%
///   Key Lookup  rows=100  cost=95.0%
/// ```
pub fn explain(statement: &Statement) -> String {
    let mut out = String::new();
    render(&mut out, &statement.query_plan.root, statement, 0);
    out
}

fn render(out: &mut String, op: &Operator, statement: &Statement, depth: usize) {
    let metrics = metrics_for(op, statement);
    let name = if op.physical_op.is_empty() {
        "(empty)"
    } else {
        op.physical_op.as_str()
    };
    let _ = write!(out, "{:indent$}{name}", "", indent = depth * 2);
    if !op.logical_op.is_empty() && op.logical_op != op.physical_op {
        let _ = write!(out, " ({})", op.logical_op);
    }
    let _ = write!(out, "  rows={:.0}  cost={:.1}%", op.estimate_rows, metrics.cost_percentage);
    if let Some(ms) = metrics.own_elapsed_ms {
        let _ = write!(out, "  elapsed={ms}ms");
    }
    out.push('\n');
    for child in &op.children {
        render(out, child, statement, depth + 1);
    }
}
