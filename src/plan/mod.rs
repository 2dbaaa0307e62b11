#![forbid(unsafe_code)]

//! Execution-plan analysis core.
//!
//! This module provides the typed plan tree, the showplan XML parser, and the
//! pure derivation functions (metrics, diagnostics, comparison) computed from
//! the immutable tree on every call.

/// Two-plan structural and scalar comparison.
///
/// Produces cost/time deltas and an operator-kind diff between two trees.
pub mod compare;

/// Rule-based diagnostic engine.
///
/// Flags likely performance problems as a ranked issue list.
pub mod diagnose;

/// Plan-tree text rendering.
///
/// Indented outline of the operator tree with per-operator cost shares.
pub mod explain;

/// Per-operator metric derivation.
///
/// Cost and elapsed-time percentages computed against statement totals.
pub mod metrics;

/// Typed plan tree model.
///
/// Document, batch, statement, and recursive operator value types.
pub mod model;

/// Showplan XML tree builder.
///
/// Parses document text into the model, recovering from structural gaps.
pub mod parser;

pub use compare::{compare, ComparisonResult};
pub use diagnose::{diagnose, Issue, Severity};
pub use metrics::{metrics_for, OperatorMetrics};
pub use model::{flatten, Operator, PlanDocument, Statement};
pub use parser::{parse, parse_bytes};
