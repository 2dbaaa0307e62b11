//! Structural and scalar comparison of two plans.
//!
//! Both inputs are read-only; the result is independent of which plan came
//! first except that swapping the inputs swaps the added/removed sets and
//! negates the scalar deltas.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::plan::metrics::tree_has_runtime;
use crate::plan::model::{flatten, Operator, Statement};

/// Outcome of comparing two statements' plans.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// Declared-cost change from primary to comparison, in percent. `None`
    /// when the primary cost is zero.
    pub cost_delta_pct: Option<f64>,
    /// Elapsed-time change from primary to comparison, in percent. `None`
    /// unless both sides carry runtime info and the primary time is nonzero.
    pub elapsed_delta_pct: Option<f64>,
    /// Operator-count change from primary to comparison.
    pub node_count_delta: i64,
    /// Per-operator-kind differences, sorted by kind name. Kinds with equal
    /// counts on both sides are omitted.
    pub diffs: Vec<OperatorKindDiff>,
}

/// One operator kind whose usage differs between the two plans.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorKindDiff {
    /// Physical operator name.
    pub kind: String,
    /// Occurrences in the primary plan.
    pub primary_count: u64,
    /// Occurrences in the comparison plan.
    pub comparison_count: u64,
    /// How the usage changed.
    pub change: DiffChange,
}

/// Classification of an operator-kind difference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiffChange {
    /// Absent from the primary plan, present in the comparison plan.
    Added,
    /// Present in the primary plan, absent from the comparison plan.
    Removed,
    /// Present in both with different counts.
    Changed,
}

/// Compares two statements' plans.
pub fn compare(primary: &Statement, comparison: &Statement) -> ComparisonResult {
    let primary_ops = flatten(&primary.query_plan.root);
    let comparison_ops = flatten(&comparison.query_plan.root);

    let cost_delta_pct = percentage_delta(primary.subtree_cost, comparison.subtree_cost);
    let elapsed_delta_pct = match (total_elapsed(primary), total_elapsed(comparison)) {
        (Some(a), Some(b)) => percentage_delta(a as f64, b as f64),
        _ => None,
    };

    ComparisonResult {
        cost_delta_pct,
        elapsed_delta_pct,
        node_count_delta: comparison_ops.len() as i64 - primary_ops.len() as i64,
        diffs: kind_diffs(&primary_ops, &comparison_ops),
    }
}

/// `(comparison - primary) / primary * 100`, or `None` when the base is
/// zero. Never infinity or NaN.
fn percentage_delta(primary: f64, comparison: f64) -> Option<f64> {
    if primary == 0.0 {
        None
    } else {
        Some((comparison - primary) / primary * 100.0)
    }
}

/// Total elapsed time for a statement: the root's cumulative actual elapsed
/// time. Elapsed is cumulative per operator like subtree cost, so the root
/// already covers the whole tree. `None` for estimate-only plans.
fn total_elapsed(statement: &Statement) -> Option<u64> {
    let root = &statement.query_plan.root;
    if !tree_has_runtime(root) {
        return None;
    }
    Some(root.runtime.as_ref().map_or(0, |rt| rt.actual_elapsed_ms))
}

fn count_by_kind(ops: &[&Operator]) -> FxHashMap<String, u64> {
    let mut counts = FxHashMap::default();
    for op in ops {
        *counts.entry(op.physical_op.clone()).or_insert(0) += 1;
    }
    counts
}

fn kind_diffs(primary_ops: &[&Operator], comparison_ops: &[&Operator]) -> Vec<OperatorKindDiff> {
    let primary = count_by_kind(primary_ops);
    let comparison = count_by_kind(comparison_ops);
    let mut kinds: Vec<&String> = primary.keys().chain(comparison.keys()).collect();
    kinds.sort();
    kinds.dedup();

    let mut diffs = Vec::new();
    for kind in kinds {
        let a = primary.get(kind).copied().unwrap_or(0);
        let b = comparison.get(kind).copied().unwrap_or(0);
        let change = match (a, b) {
            (0, _) => DiffChange::Added,
            (_, 0) => DiffChange::Removed,
            _ if a != b => DiffChange::Changed,
            _ => continue, // equal counts are omitted
        };
        diffs.push(OperatorKindDiff {
            kind: kind.clone(),
            primary_count: a,
            comparison_count: b,
            change,
        });
    }
    diffs
}
