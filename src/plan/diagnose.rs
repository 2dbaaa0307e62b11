//! Rule-based diagnostic engine.
//!
//! Each rule is an independent predicate over one operator and its derived
//! metrics; a single operator may trigger several rules at once. Rules are
//! entries in a table, so adding one appends an entry and never touches the
//! logic of another.

use serde::Serialize;

use crate::plan::metrics::{metrics_for, OperatorMetrics};
use crate::plan::model::{flatten, OperationDetail, Operator, Statement};

/// How many issues a diagnosis reports at most.
const MAX_ISSUES: usize = 10;

/// Row count above which a full scan is worth flagging.
const SCAN_ROWS_WARNING: f64 = 1_000.0;
/// Row count above which a full scan is critical.
const SCAN_ROWS_CRITICAL: f64 = 10_000.0;
/// Row count above which a clustered index scan is worth flagging.
const CLUSTERED_SCAN_ROWS: f64 = 10_000.0;
/// Execution count above which a lookup is worth flagging.
const LOOKUP_EXECUTIONS_WARNING: u64 = 100;
/// Execution count above which a lookup is critical.
const LOOKUP_EXECUTIONS_CRITICAL: u64 = 1_000;
/// Cost share above which a sort is worth flagging, in percent.
const SORT_COST_WARNING: f64 = 15.0;
/// Cost share above which a sort is critical, in percent.
const SORT_COST_CRITICAL: f64 = 30.0;
/// Row count above which a hash join is worth flagging.
const HASH_JOIN_ROWS: f64 = 100_000.0;
/// Cost share above which a single operator dominates the plan, in percent.
const DOMINANT_COST_SHARE: f64 = 50.0;
/// Actual/estimated row ratio beyond which estimates are off.
const ESTIMATE_RATIO_HIGH: f64 = 10.0;
/// Actual/estimated row ratio below which estimates are off.
const ESTIMATE_RATIO_LOW: f64 = 0.1;

/// Severity of a diagnostic finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Likely worth attention.
    Warning,
    /// Likely a significant performance problem.
    Critical,
}

/// One diagnostic finding.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// How serious the finding is.
    pub severity: Severity,
    /// Short title of the finding.
    pub title: String,
    /// Human-readable explanation.
    pub description: String,
    /// Node id of the operator that triggered the rule, when one did.
    pub operator_id: Option<i64>,
    /// Impact score in `[0, 100]`, used for ranking.
    pub impact: f64,
}

type RuleFn = fn(&Operator, &OperatorMetrics) -> Option<Issue>;

/// The rule table. Order here only breaks ties between issues of equal
/// impact on the same operator; ranking is by impact.
const RULES: &[RuleFn] = &[
    large_scan,
    large_clustered_scan,
    hot_lookup,
    expensive_sort,
    large_hash_join,
    dominant_cost,
    estimate_mismatch,
];

/// Diagnoses one statement's plan tree.
///
/// Returns at most ten issues sorted by impact descending; ties keep tree
/// pre-order. Calling this repeatedly on the same statement yields the same
/// sequence.
pub fn diagnose(statement: &Statement) -> Vec<Issue> {
    let mut issues = Vec::new();
    for op in flatten(&statement.query_plan.root) {
        let metrics = metrics_for(op, statement);
        for rule in RULES {
            if let Some(issue) = rule(op, &metrics) {
                issues.push(issue);
            }
        }
    }
    // Stable sort keeps pre-order as the secondary key.
    issues.sort_by(|a, b| b.impact.total_cmp(&a.impact));
    issues.truncate(MAX_ISSUES);
    issues
}

fn clamp_impact(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn is_full_scan(op: &Operator) -> bool {
    op.physical_op == "Table Scan" || op.physical_op == "Index Scan"
}

fn large_scan(op: &Operator, _m: &OperatorMetrics) -> Option<Issue> {
    if !is_full_scan(op) || op.estimate_rows <= SCAN_ROWS_WARNING {
        return None;
    }
    let severity = if op.estimate_rows > SCAN_ROWS_CRITICAL {
        Severity::Critical
    } else {
        Severity::Warning
    };
    Some(Issue {
        severity,
        title: format!("Large scan: {}", op.physical_op),
        description: format!(
            "{} reads an estimated {:.0} rows without an index seek; consider an index that supports the predicate.",
            op.physical_op, op.estimate_rows
        ),
        operator_id: Some(op.node_id),
        impact: clamp_impact(op.estimate_rows / 1_000.0),
    })
}

fn large_clustered_scan(op: &Operator, _m: &OperatorMetrics) -> Option<Issue> {
    if op.physical_op != "Clustered Index Scan" || op.estimate_rows <= CLUSTERED_SCAN_ROWS {
        return None;
    }
    Some(Issue {
        severity: Severity::Warning,
        title: "Large clustered index scan".to_owned(),
        description: format!(
            "Clustered index scan over an estimated {:.0} rows; a narrower nonclustered index may serve this query.",
            op.estimate_rows
        ),
        operator_id: Some(op.node_id),
        impact: clamp_impact(op.estimate_rows / 2_000.0),
    })
}

fn hot_lookup(op: &Operator, _m: &OperatorMetrics) -> Option<Issue> {
    if op.physical_op != "Key Lookup" && op.physical_op != "RID Lookup" {
        return None;
    }
    let executions = op.runtime.as_ref()?.actual_executions;
    if executions <= LOOKUP_EXECUTIONS_WARNING {
        return None;
    }
    let severity = if executions > LOOKUP_EXECUTIONS_CRITICAL {
        Severity::Critical
    } else {
        Severity::Warning
    };
    Some(Issue {
        severity,
        title: format!("Hot lookup: {}", op.physical_op),
        description: format!(
            "{} executed {executions} times; covering the queried columns in the index would remove it.",
            op.physical_op
        ),
        operator_id: Some(op.node_id),
        impact: clamp_impact(executions as f64 / 20.0),
    })
}

fn expensive_sort(op: &Operator, m: &OperatorMetrics) -> Option<Issue> {
    if !matches!(op.detail, OperationDetail::Sort { .. }) || m.cost_percentage <= SORT_COST_WARNING
    {
        return None;
    }
    let severity = if m.cost_percentage > SORT_COST_CRITICAL {
        Severity::Critical
    } else {
        Severity::Warning
    };
    Some(Issue {
        severity,
        title: "Expensive sort".to_owned(),
        description: format!(
            "Sort accounts for {:.1}% of the plan cost; an index providing the required order would avoid it.",
            m.cost_percentage
        ),
        operator_id: Some(op.node_id),
        impact: clamp_impact(m.cost_percentage),
    })
}

fn large_hash_join(op: &Operator, _m: &OperatorMetrics) -> Option<Issue> {
    if op.physical_op != "Hash Match" || op.estimate_rows <= HASH_JOIN_ROWS {
        return None;
    }
    Some(Issue {
        severity: Severity::Warning,
        title: "Large hash join".to_owned(),
        description: format!(
            "Hash match over an estimated {:.0} rows may spill to tempdb under memory pressure.",
            op.estimate_rows
        ),
        operator_id: Some(op.node_id),
        impact: clamp_impact(op.estimate_rows / 10_000.0),
    })
}

fn dominant_cost(op: &Operator, m: &OperatorMetrics) -> Option<Issue> {
    if m.cost_percentage <= DOMINANT_COST_SHARE {
        return None;
    }
    Some(Issue {
        severity: Severity::Critical,
        title: format!("Dominant cost: {}", op.physical_op),
        description: format!(
            "{} accounts for {:.1}% of the plan cost.",
            op.physical_op, m.cost_percentage
        ),
        operator_id: Some(op.node_id),
        impact: clamp_impact(m.cost_percentage),
    })
}

fn estimate_mismatch(op: &Operator, _m: &OperatorMetrics) -> Option<Issue> {
    let runtime = op.runtime.as_ref()?;
    // Both sides floored at one row, so zero estimates and zero actuals
    // keep the ratio finite and an all-zero operator stays quiet.
    let estimated = op.estimate_rows.max(1.0);
    let actual = (runtime.actual_rows as f64).max(1.0);
    let ratio = actual / estimated;
    if (ESTIMATE_RATIO_LOW..=ESTIMATE_RATIO_HIGH).contains(&ratio) {
        return None;
    }
    let factor = if ratio >= 1.0 { ratio } else { 1.0 / ratio };
    Some(Issue {
        severity: Severity::Warning,
        title: format!("Estimate mismatch: {}", op.physical_op),
        description: format!(
            "Actual rows ({}) differ from the estimate ({:.0}) by a factor of {:.1}; statistics may be stale.",
            runtime.actual_rows, op.estimate_rows, factor
        ),
        operator_id: Some(op.node_id),
        impact: clamp_impact(factor.log10() * 25.0),
    })
}
