//! Typed plan tree built from showplan XML.
//!
//! Every type here is an immutable value: the tree is built once per parse
//! and never mutated afterwards. Derived figures (percentages, issues,
//! diffs) are computed fresh from the tree and never stored on it.

use serde::Serialize;

/// A parsed execution-plan document.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDocument {
    /// Showplan format version, empty when the root omits it.
    pub version: String,
    /// Producing engine build string, empty when the root omits it.
    pub build: String,
    /// Batches in document order.
    pub batches: Vec<Batch>,
}

/// One batch of statements.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Statements in document order.
    pub statements: Vec<Statement>,
}

/// One statement and its query plan.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    /// Statement id as declared by the plan source.
    pub statement_id: i64,
    /// Source text of the statement.
    pub statement_text: String,
    /// Declared statement type (e.g. `SELECT`).
    pub statement_type: String,
    /// Authoritative total cost of the statement's whole plan tree.
    pub subtree_cost: f64,
    /// Estimated row count for the statement.
    pub estimated_rows: f64,
    /// The statement's query plan.
    pub query_plan: QueryPlan,
}

/// The plan attached to a statement.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    /// Degree of parallelism the plan was compiled for.
    pub degree_of_parallelism: i64,
    /// Memory-grant figures, absent when the plan carries none.
    pub memory_grant: Option<MemoryGrant>,
    /// Compiled parameter bindings in document order.
    pub parameters: Vec<ParameterBinding>,
    /// Root operator of the plan tree.
    pub root: Operator,
}

/// Memory-grant figures in kilobytes.
#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryGrant {
    /// Required memory for a serial plan.
    pub serial_required_kb: f64,
    /// Desired memory for a serial plan.
    pub serial_desired_kb: f64,
    /// Required memory at the chosen degree of parallelism.
    pub required_kb: f64,
    /// Desired memory at the chosen degree of parallelism.
    pub desired_kb: f64,
    /// Memory actually granted.
    pub granted_kb: f64,
    /// Peak memory used during execution.
    pub max_used_kb: f64,
}

/// One compiled parameter binding.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterBinding {
    /// Parameter name.
    pub column: String,
    /// Value the plan was compiled with.
    pub compiled_value: String,
}

/// One node in the execution-plan tree.
///
/// `node_id` is unique only within a single statement's tree. All numeric
/// fields default to zero and `parallel` to false when the source attribute
/// is absent.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    /// Node id within the statement tree.
    pub node_id: i64,
    /// Physical operator name (e.g. `Clustered Index Scan`).
    pub physical_op: String,
    /// Logical operator name (e.g. `Inner Join`).
    pub logical_op: String,
    /// Estimated CPU cost of this operator alone.
    pub estimate_cpu: f64,
    /// Estimated I/O cost of this operator alone.
    pub estimate_io: f64,
    /// Cumulative estimated cost of this operator and its descendants.
    pub subtree_cost: f64,
    /// Estimated rows produced per execution.
    pub estimate_rows: f64,
    /// Average output row size in bytes.
    pub avg_row_size: f64,
    /// Whether the operator runs in parallel.
    pub parallel: bool,
    /// Output column references in document order.
    pub output_columns: Vec<String>,
    /// Execution statistics, present only for captured ("actual") plans.
    pub runtime: Option<RuntimeInfo>,
    /// Operation-specific detail selected from the wrapper element.
    pub detail: OperationDetail,
    /// Direct children in document order.
    pub children: Vec<Operator>,
}

/// Execution statistics captured from an actual run.
///
/// Counters are summed across the per-thread records of the source document.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    /// Rows actually produced.
    pub actual_rows: u64,
    /// Times the operator was executed.
    pub actual_executions: u64,
    /// Elapsed wall-clock time, cumulative over the subtree, in ms.
    pub actual_elapsed_ms: u64,
    /// CPU time in ms.
    pub actual_cpu_ms: u64,
    /// Logical page reads.
    pub logical_reads: u64,
    /// Physical page reads.
    pub physical_reads: u64,
    /// Wait statistics ordered by total wait time descending.
    pub waits: Vec<WaitStat>,
}

/// One named category of time an operator spent blocked.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitStat {
    /// Wait-type name (e.g. `PAGEIOLATCH_SH`).
    pub wait_type: String,
    /// Total wait time in ms.
    pub wait_time_ms: u64,
    /// Number of waits recorded.
    pub wait_count: u64,
}

/// Operation-specific detail selected by the operator's wrapper element.
///
/// A closed set: an operator whose wrapper is not recognized gets
/// [`OperationDetail::None`], keeping only the raw operator attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum OperationDetail {
    /// Index or table scan/seek over a named object.
    IndexScan {
        /// Qualified name of the scanned table.
        object: String,
        /// Index name, empty for heap table scans.
        index: String,
        /// Whether output is ordered.
        ordered: bool,
        /// Scan direction (`FORWARD`/`BACKWARD`), empty when unspecified.
        scan_direction: String,
        /// Whether this is a bookmark lookup.
        lookup: bool,
    },
    /// Nested-loops join.
    NestedLoops {
        /// Whether the optimized prefetch variant was chosen.
        optimized: bool,
    },
    /// Hash match (join, union, or aggregate by hashing).
    Hash,
    /// Merge join.
    Merge {
        /// Whether the join is many-to-many.
        many_to_many: bool,
    },
    /// Sort.
    Sort {
        /// Whether the sort removes duplicates.
        distinct: bool,
    },
    /// Scalar computation.
    ComputeScalar,
    /// Row filter.
    Filter {
        /// Whether the predicate is a startup expression.
        startup: bool,
    },
    /// Parallelism exchange.
    Parallelism {
        /// Exchange kind (e.g. `GatherStreams`), empty when unspecified.
        #[serde(rename = "exchangeKind")]
        kind: String,
    },
    /// Stream aggregate.
    Aggregate {
        /// Grouping column names in document order.
        group_by: Vec<String>,
    },
    /// No recognized wrapper element.
    #[default]
    None,
}

/// Flattens an operator tree in pre-order.
///
/// The root comes first, then each child's subtree in document order. Every
/// operator element of the source document appears exactly once.
pub fn flatten(root: &Operator) -> Vec<&Operator> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(op) = stack.pop() {
        out.push(op);
        // Reverse push keeps document order in the output.
        for child in op.children.iter().rev() {
            stack.push(child);
        }
    }
    out
}
