//! Showplan XML tree builder.
//!
//! Elements are matched by local name only, so any namespace prefix the
//! producing tool uses is accepted. The parser walks the fixed structural
//! path (batch sequence, batch, statements, statement, query plan, root
//! operator) and substitutes empty defaults for anything structurally
//! absent; the only fatal condition is input that is not well-formed XML.

use roxmltree::{Document, Node};
use tracing::{debug, warn};

use crate::error::{ParseError, Result};
use crate::plan::model::{
    Batch, MemoryGrant, OperationDetail, Operator, ParameterBinding, PlanDocument, QueryPlan,
    RuntimeInfo, Statement, WaitStat,
};

/// Local name of the operator element.
const OPERATOR_ELEMENT: &str = "RelOp";

/// Parses showplan XML text into a plan document.
///
/// Fails only when the input is not well-formed XML; every structural or
/// attribute-level defect beneath that degrades to a default value.
pub fn parse(text: &str) -> Result<PlanDocument> {
    let doc = Document::parse(text).map_err(|e| ParseError::Malformed(e.to_string()))?;
    Ok(build_document(doc.root_element()))
}

/// Parses showplan bytes, sniffing UTF-8 / UTF-16 before delegating.
///
/// Captured `.sqlplan` files are commonly UTF-16; a byte-order mark is
/// honored when present and a zero-byte heuristic covers BOM-less UTF-16.
pub fn parse_bytes(bytes: &[u8]) -> Result<PlanDocument> {
    let text = decode_text(bytes)?;
    parse(&text)
}

fn decode_text(bytes: &[u8]) -> Result<String> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return utf8(rest);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return utf16(rest, u16::from_be_bytes);
    }
    // BOM-less UTF-16 puts a zero byte in the first code unit of "<".
    match bytes {
        [0, _, ..] => utf16(bytes, u16::from_be_bytes),
        [_, 0, ..] => utf16(bytes, u16::from_le_bytes),
        _ => utf8(bytes),
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| ParseError::Encoding(e.to_string()))
}

fn utf16(bytes: &[u8], read: fn([u8; 2]) -> u16) -> Result<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| read([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| ParseError::Encoding(e.to_string()))
}

fn build_document(root: Node<'_, '_>) -> PlanDocument {
    let batches = match find_child(root, "BatchSequence") {
        Some(seq) => children_named(seq, "Batch").map(build_batch).collect(),
        None => {
            debug!("document has no batch sequence; producing empty plan document");
            Vec::new()
        }
    };
    PlanDocument {
        version: attr_string(root, "Version"),
        build: attr_string(root, "Build"),
        batches,
    }
}

fn build_batch(batch: Node<'_, '_>) -> Batch {
    let statements = match find_child(batch, "Statements") {
        Some(stmts) => element_children(stmts)
            .filter(|n| local_name(*n).starts_with("Stmt"))
            .map(build_statement)
            .collect(),
        None => {
            debug!("batch has no statements element");
            Vec::new()
        }
    };
    Batch { statements }
}

fn build_statement(stmt: Node<'_, '_>) -> Statement {
    let query_plan = match find_child(stmt, "QueryPlan") {
        Some(plan) => build_query_plan(plan),
        None => {
            debug!(
                statement_id = attr_i64(stmt, "StatementId"),
                "statement has no query plan; substituting empty placeholder"
            );
            QueryPlan::default()
        }
    };
    Statement {
        statement_id: attr_i64(stmt, "StatementId"),
        statement_text: attr_string(stmt, "StatementText"),
        statement_type: attr_string(stmt, "StatementType"),
        subtree_cost: attr_f64(stmt, "StatementSubTreeCost"),
        estimated_rows: attr_f64(stmt, "StatementEstRows"),
        query_plan,
    }
}

fn build_query_plan(plan: Node<'_, '_>) -> QueryPlan {
    let root = match direct_operator_children(plan).into_iter().next() {
        Some(op) => build_operator(op),
        None => {
            debug!("query plan has no root operator; substituting empty placeholder");
            Operator::default()
        }
    };
    let parameters = find_child(plan, "ParameterList")
        .map(|list| {
            children_named(list, "ColumnReference")
                .map(|col| ParameterBinding {
                    column: attr_string(col, "Column"),
                    compiled_value: attr_string(col, "ParameterCompiledValue"),
                })
                .collect()
        })
        .unwrap_or_default();
    QueryPlan {
        degree_of_parallelism: attr_i64(plan, "DegreeOfParallelism"),
        memory_grant: find_child(plan, "MemoryGrantInfo").map(build_memory_grant),
        parameters,
        root,
    }
}

fn build_memory_grant(grant: Node<'_, '_>) -> MemoryGrant {
    MemoryGrant {
        serial_required_kb: attr_f64(grant, "SerialRequiredMemory"),
        serial_desired_kb: attr_f64(grant, "SerialDesiredMemory"),
        required_kb: attr_f64(grant, "RequiredMemory"),
        desired_kb: attr_f64(grant, "DesiredMemory"),
        granted_kb: attr_f64(grant, "GrantedMemory"),
        max_used_kb: attr_f64(grant, "MaxUsedMemory"),
    }
}

fn build_operator(op: Node<'_, '_>) -> Operator {
    let children = direct_operator_children(op)
        .into_iter()
        .map(build_operator)
        .collect();
    Operator {
        node_id: attr_i64(op, "NodeId"),
        physical_op: attr_string(op, "PhysicalOp"),
        logical_op: attr_string(op, "LogicalOp"),
        estimate_cpu: attr_f64(op, "EstimateCPU"),
        estimate_io: attr_f64(op, "EstimateIO"),
        subtree_cost: attr_f64(op, "EstimatedTotalSubtreeCost"),
        estimate_rows: attr_f64(op, "EstimateRows"),
        avg_row_size: attr_f64(op, "AvgRowSize"),
        parallel: attr_bool(op, "Parallel"),
        output_columns: output_columns(op),
        runtime: find_child(op, "RunTimeInformation").map(|rt| build_runtime(op, rt)),
        detail: build_detail(op),
        children,
    }
}

/// Finds the operator elements that are this element's rendered children.
///
/// Operator elements are not necessarily direct XML children: wrapper
/// elements (join bodies, predicate/expression/subquery chains) may nest
/// them arbitrarily deep. The walk descends through non-operator elements
/// and stops at each operator boundary it meets, so every operator element
/// in the document is claimed by exactly one ancestor.
fn direct_operator_children<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    let mut found = Vec::new();
    let mut work: Vec<Node<'a, 'input>> = element_children(node).collect();
    work.reverse();
    while let Some(el) = work.pop() {
        if local_name(el) == OPERATOR_ELEMENT {
            // Boundary: the subtree below belongs to this operator and is
            // discovered when the operator itself is expanded.
            found.push(el);
        } else {
            let mut nested: Vec<_> = element_children(el).collect();
            nested.reverse();
            work.append(&mut nested);
        }
    }
    found
}

fn output_columns(op: Node<'_, '_>) -> Vec<String> {
    find_child(op, "OutputList")
        .map(|list| {
            children_named(list, "ColumnReference")
                .map(column_name)
                .collect()
        })
        .unwrap_or_default()
}

fn column_name(col: Node<'_, '_>) -> String {
    ["Database", "Schema", "Table", "Column"]
        .iter()
        .map(|key| attr_string(col, key))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn build_runtime(op: Node<'_, '_>, rt: Node<'_, '_>) -> RuntimeInfo {
    let mut info = RuntimeInfo::default();
    for thread in children_named(rt, "RunTimeCountersPerThread") {
        info.actual_rows += attr_u64(thread, "ActualRows");
        info.actual_executions += attr_u64(thread, "ActualExecutions");
        info.actual_elapsed_ms += attr_u64(thread, "ActualElapsedms");
        info.actual_cpu_ms += attr_u64(thread, "ActualCPUms");
        info.logical_reads += attr_u64(thread, "ActualLogicalReads");
        info.physical_reads += attr_u64(thread, "ActualPhysicalReads");
    }
    if let Some(waits) = find_child(op, "WaitStats") {
        info.waits = children_named(waits, "Wait")
            .map(|w| WaitStat {
                wait_type: attr_string(w, "WaitType"),
                wait_time_ms: attr_u64(w, "WaitTimeMs"),
                wait_count: attr_u64(w, "WaitCount"),
            })
            .collect();
        info.waits.sort_by(|a, b| b.wait_time_ms.cmp(&a.wait_time_ms));
    }
    info
}

fn build_detail(op: Node<'_, '_>) -> OperationDetail {
    // First recognized wrapper element wins.
    if let Some(scan) = find_child(op, "IndexScan").or_else(|| find_child(op, "TableScan")) {
        let object = find_child(scan, "Object");
        return OperationDetail::IndexScan {
            object: object.map(object_name).unwrap_or_default(),
            index: object
                .map(|o| attr_string(o, "Index"))
                .unwrap_or_default(),
            ordered: attr_bool(scan, "Ordered"),
            scan_direction: attr_string(scan, "ScanDirection"),
            lookup: attr_bool(scan, "Lookup"),
        };
    }
    if let Some(nl) = find_child(op, "NestedLoops") {
        return OperationDetail::NestedLoops {
            optimized: attr_bool(nl, "Optimized"),
        };
    }
    if find_child(op, "Hash").is_some() {
        return OperationDetail::Hash;
    }
    if let Some(merge) = find_child(op, "Merge") {
        return OperationDetail::Merge {
            many_to_many: attr_bool(merge, "ManyToMany"),
        };
    }
    if let Some(sort) = find_child(op, "Sort") {
        return OperationDetail::Sort {
            distinct: attr_bool(sort, "Distinct"),
        };
    }
    if find_child(op, "ComputeScalar").is_some() {
        return OperationDetail::ComputeScalar;
    }
    if let Some(filter) = find_child(op, "Filter") {
        return OperationDetail::Filter {
            startup: attr_bool(filter, "StartupExpression"),
        };
    }
    if find_child(op, "Parallelism").is_some() {
        // The exchange kind lives in the operator's logical name.
        return OperationDetail::Parallelism {
            kind: attr_string(op, "LogicalOp"),
        };
    }
    if let Some(agg) = find_child(op, "StreamAggregate") {
        let group_by = find_child(agg, "GroupBy")
            .map(|g| children_named(g, "ColumnReference").map(column_name).collect())
            .unwrap_or_default();
        return OperationDetail::Aggregate { group_by };
    }
    OperationDetail::None
}

fn object_name(object: Node<'_, '_>) -> String {
    ["Database", "Schema", "Table"]
        .iter()
        .map(|key| attr_string(object, key))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn local_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

fn children_named<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a
where
    'input: 'a,
{
    element_children(node).filter(move |n| local_name(*n) == name)
}

fn find_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    element_children(node).find(|n| local_name(*n) == name)
}

fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == name)
        .map(|a| a.value())
}

fn attr_string(node: Node<'_, '_>, name: &str) -> String {
    attr(node, name).unwrap_or_default().to_owned()
}

fn attr_f64(node: Node<'_, '_>, name: &str) -> f64 {
    coerce(node, name, |s| s.parse().ok())
}

fn attr_i64(node: Node<'_, '_>, name: &str) -> i64 {
    coerce(node, name, |s| s.parse().ok())
}

fn attr_u64(node: Node<'_, '_>, name: &str) -> u64 {
    coerce(node, name, |s| s.parse().ok())
}

fn attr_bool(node: Node<'_, '_>, name: &str) -> bool {
    coerce(node, name, |s| match s {
        _ if s.eq_ignore_ascii_case("true") || s == "1" => Some(true),
        _ if s.eq_ignore_ascii_case("false") || s == "0" => Some(false),
        _ => None,
    })
}

/// Total attribute coercion: absent or unparseable values degrade to the
/// type's default and never fail the parse.
fn coerce<T: Default>(node: Node<'_, '_>, name: &str, convert: fn(&str) -> Option<T>) -> T {
    match attr(node, name) {
        None => T::default(),
        Some(raw) => convert(raw.trim()).unwrap_or_else(|| {
            warn!(
                element = local_name(node),
                attribute = name,
                value = raw,
                "attribute failed to coerce; using default"
            );
            T::default()
        }),
    }
}
