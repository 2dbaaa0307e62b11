use planscope::plan::compare::DiffChange;
use planscope::plan::diagnose::Severity;
use planscope::plan::model::Statement;
use planscope::{compare, diagnose, explain, flatten, metrics_for, parse, ParseError};

fn document(plan_body: &str, stmt_attrs: &str) -> String {
    format!(
        r#"<ShowPlanXML xmlns="http://schemas.microsoft.com/sqlserver/2004/07/showplan" Version="1.539" Build="16.0.1000.6">
  <BatchSequence><Batch><Statements>
    <StmtSimple StatementId="1" StatementType="SELECT" {stmt_attrs}>
      <QueryPlan DegreeOfParallelism="1">{plan_body}</QueryPlan>
    </StmtSimple>
  </Statements></Batch></BatchSequence>
</ShowPlanXML>"#
    )
}

fn only_statement(text: &str) -> Statement {
    let doc = parse(text).expect("document parses");
    doc.batches[0].statements[0].clone()
}

#[test]
fn single_table_scan_covers_all_cost() {
    let stmt = only_statement(&document(
        r#"<RelOp NodeId="0" PhysicalOp="Table Scan" LogicalOp="Table Scan"
                 EstimateRows="100" EstimatedTotalSubtreeCost="0.01"/>"#,
        r#"StatementSubTreeCost="0.01" StatementEstRows="100""#,
    ));
    let metrics = metrics_for(&stmt.query_plan.root, &stmt);
    assert_eq!(metrics.cost_percentage, 100.0);
    assert_eq!(metrics.own_elapsed_ms, None);
}

#[test]
fn nested_loops_with_two_children() {
    let stmt = only_statement(&document(
        r#"<RelOp NodeId="0" PhysicalOp="Nested Loops" LogicalOp="Inner Join"
                 EstimateRows="100" EstimatedTotalSubtreeCost="0.1">
             <NestedLoops Optimized="false"/>
             <RelOp NodeId="1" PhysicalOp="Index Seek" EstimatedTotalSubtreeCost="0.004"/>
             <RelOp NodeId="2" PhysicalOp="Key Lookup" EstimatedTotalSubtreeCost="0.095"/>
           </RelOp>"#,
        r#"StatementSubTreeCost="0.1" StatementEstRows="100""#,
    ));
    assert_eq!(flatten(&stmt.query_plan.root).len(), 3);
    let first_child = metrics_for(&stmt.query_plan.root.children[0], &stmt);
    assert!((first_child.cost_percentage - 4.0).abs() < 1e-9);
}

#[test]
fn malformed_input_yields_no_document() {
    let err = parse("<invalid>xml</bad>").expect_err("mismatched close tag");
    assert!(matches!(err, ParseError::Malformed(_)));
}

#[test]
fn large_dominant_scan_raises_two_critical_issues() {
    let stmt = only_statement(&document(
        r#"<RelOp NodeId="0" PhysicalOp="Table Scan" LogicalOp="Table Scan"
                 EstimateRows="50000" EstimatedTotalSubtreeCost="1.5"/>"#,
        r#"StatementSubTreeCost="1.5" StatementEstRows="50000""#,
    ));
    let issues = diagnose(&stmt);
    let large_scan = issues
        .iter()
        .find(|i| i.title.starts_with("Large scan"))
        .expect("large scan flagged");
    assert_eq!(large_scan.severity, Severity::Critical);
    let dominant = issues
        .iter()
        .find(|i| i.title.starts_with("Dominant cost"))
        .expect("dominant cost flagged");
    assert_eq!(dominant.severity, Severity::Critical);
    assert_eq!(dominant.impact, 100.0);
}

#[test]
fn scan_replaced_by_seek_shows_in_diff() {
    let scan_plan = only_statement(&document(
        r#"<RelOp NodeId="0" PhysicalOp="Nested Loops" EstimatedTotalSubtreeCost="0.2">
             <RelOp NodeId="1" PhysicalOp="Table Scan" EstimatedTotalSubtreeCost="0.19"/>
           </RelOp>"#,
        r#"StatementSubTreeCost="0.2""#,
    ));
    let seek_plan = only_statement(&document(
        r#"<RelOp NodeId="0" PhysicalOp="Nested Loops" EstimatedTotalSubtreeCost="0.05">
             <RelOp NodeId="1" PhysicalOp="Index Seek" EstimatedTotalSubtreeCost="0.04"/>
           </RelOp>"#,
        r#"StatementSubTreeCost="0.05""#,
    ));
    let result = compare(&scan_plan, &seek_plan);
    assert_eq!(result.node_count_delta, 0);
    let removed: Vec<&str> = result
        .diffs
        .iter()
        .filter(|d| d.change == DiffChange::Removed)
        .map(|d| d.kind.as_str())
        .collect();
    assert_eq!(removed, vec!["Table Scan"]);
    let added: Vec<&str> = result
        .diffs
        .iter()
        .filter(|d| d.change == DiffChange::Added)
        .map(|d| d.kind.as_str())
        .collect();
    assert_eq!(added, vec!["Index Seek"]);
    // Cost dropped from 0.2 to 0.05.
    let delta = result.cost_delta_pct.expect("base cost nonzero");
    assert!((delta + 75.0).abs() < 1e-9);
}

#[test]
fn captured_plan_end_to_end() {
    let stmt = only_statement(&document(
        r#"<RelOp NodeId="0" PhysicalOp="Nested Loops" LogicalOp="Inner Join"
                 EstimateRows="120" EstimatedTotalSubtreeCost="0.5" Parallel="false">
             <OutputList>
               <ColumnReference Database="[shop]" Schema="[dbo]" Table="[orders]" Column="id"/>
             </OutputList>
             <RunTimeInformation>
               <RunTimeCountersPerThread Thread="0" ActualRows="2400" ActualExecutions="1"
                                         ActualElapsedms="90" ActualCPUms="40"/>
             </RunTimeInformation>
             <NestedLoops Optimized="true"/>
             <RelOp NodeId="1" PhysicalOp="Index Seek" LogicalOp="Index Seek"
                    EstimateRows="120" EstimatedTotalSubtreeCost="0.1">
               <RunTimeInformation>
                 <RunTimeCountersPerThread Thread="0" ActualRows="2400" ActualExecutions="1"
                                           ActualElapsedms="30" ActualCPUms="10"/>
               </RunTimeInformation>
               <IndexScan Ordered="true" ScanDirection="FORWARD">
                 <Object Database="[shop]" Schema="[dbo]" Table="[orders]" Index="[ix_orders]"/>
               </IndexScan>
             </RelOp>
             <RelOp NodeId="2" PhysicalOp="Key Lookup" LogicalOp="Key Lookup"
                    EstimateRows="1" EstimatedTotalSubtreeCost="0.35">
               <RunTimeInformation>
                 <RunTimeCountersPerThread Thread="0" ActualRows="2400" ActualExecutions="2400"
                                           ActualElapsedms="55" ActualCPUms="25"/>
               </RunTimeInformation>
             </RelOp>
           </RelOp>"#,
        r#"StatementText="SELECT id FROM orders" StatementSubTreeCost="0.5" StatementEstRows="120""#,
    ));

    // Runtime info flows to metrics: root own elapsed excludes children.
    let root_metrics = metrics_for(&stmt.query_plan.root, &stmt);
    assert_eq!(root_metrics.own_elapsed_ms, Some(5));

    // The hot lookup and its estimate mismatch both surface.
    let issues = diagnose(&stmt);
    assert!(issues.iter().any(|i| i.title.starts_with("Hot lookup")));
    assert!(issues
        .iter()
        .any(|i| i.title.starts_with("Estimate mismatch")));
    for pair in issues.windows(2) {
        assert!(pair[0].impact >= pair[1].impact);
    }

    // The outline mentions every operator at increasing indentation.
    let text = explain(&stmt);
    assert!(text.contains("Nested Loops (Inner Join)"));
    assert!(text.contains("\n  Index Seek"));
    assert!(text.contains("\n  Key Lookup"));
}

#[test]
fn model_serializes_to_camel_case_json() {
    let stmt = only_statement(&document(
        r#"<RelOp NodeId="0" PhysicalOp="Table Scan" EstimateRows="10"
                 EstimatedTotalSubtreeCost="0.01"/>"#,
        r#"StatementSubTreeCost="0.01""#,
    ));
    let json = serde_json::to_value(&stmt).expect("statement serializes");
    assert_eq!(json["statementId"], 1);
    assert_eq!(json["queryPlan"]["root"]["physicalOp"], "Table Scan");
    // The whole-plan table scan dominates its own cost, so one issue comes
    // back and serializes with camelCase keys.
    let issues = serde_json::to_value(diagnose(&stmt)).expect("issues serialize");
    assert_eq!(issues[0]["severity"], "critical");
    assert_eq!(issues[0]["operatorId"], 0);
}
