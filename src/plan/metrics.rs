//! Per-operator metric derivation.
//!
//! Pure functions over one statement's tree. Nothing here is memoized;
//! callers that want caching own that cache.

use crate::plan::model::{flatten, Operator, Statement};

/// Derived cost and time figures for one operator.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OperatorMetrics {
    /// Share of the statement's total cost covered by this operator's
    /// subtree, in percent.
    pub cost_percentage: f64,
    /// Share of the statement's total cost attributable to this operator
    /// alone, in percent.
    pub own_cost_percentage: f64,
    /// Elapsed time attributable to this operator alone, in ms. `None` when
    /// no runtime info exists anywhere in the statement tree, which is
    /// distinct from a recorded zero.
    pub own_elapsed_ms: Option<u64>,
}

/// Computes derived metrics for one operator of a statement's tree.
///
/// The statement's declared subtree cost is the total; operator costs are
/// already cumulative over their subtrees, so they are never summed.
pub fn metrics_for(op: &Operator, statement: &Statement) -> OperatorMetrics {
    let total = statement.subtree_cost;
    let own_elapsed_ms = if tree_has_runtime(&statement.query_plan.root) {
        Some(own_elapsed(op))
    } else {
        None
    };
    OperatorMetrics {
        cost_percentage: percentage(op.subtree_cost, total),
        own_cost_percentage: percentage(own_cost(op), total),
        own_elapsed_ms,
    }
}

/// Cost attributable to the operator alone: its subtree cost minus its
/// children's. Clamped at zero to absorb floating-point noise and plans
/// where children nominally cost more than their parent.
pub fn own_cost(op: &Operator) -> f64 {
    let children: f64 = op.children.iter().map(|c| c.subtree_cost).sum();
    (op.subtree_cost - children).max(0.0)
}

fn own_elapsed(op: &Operator) -> u64 {
    let mine = op.runtime.as_ref().map_or(0, |rt| rt.actual_elapsed_ms);
    let children: u64 = op
        .children
        .iter()
        .map(|c| c.runtime.as_ref().map_or(0, |rt| rt.actual_elapsed_ms))
        .sum();
    mine.saturating_sub(children)
}

/// Whether any operator in the tree carries runtime info.
pub fn tree_has_runtime(root: &Operator) -> bool {
    flatten(root).iter().any(|op| op.runtime.is_some())
}

fn percentage(value: f64, total: f64) -> f64 {
    // A zero-cost plan yields 0 for every operator, never NaN or infinity.
    if total == 0.0 {
        0.0
    } else {
        value / total * 100.0
    }
}
