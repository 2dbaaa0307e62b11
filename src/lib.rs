//! In-process analysis core for SQL Server execution plans.
//!
//! Parses showplan XML into an immutable operator tree and derives metrics,
//! diagnostics, and plan-to-plan comparisons on demand. Rendering, UI state,
//! and persistence live in the hosting application.

#![warn(missing_docs)]

pub mod error;
pub mod plan;

pub use error::{ParseError, Result};
pub use plan::compare::compare;
pub use plan::diagnose::diagnose;
pub use plan::explain::explain;
pub use plan::metrics::metrics_for;
pub use plan::model::{flatten, PlanDocument};
pub use plan::parser::{parse, parse_bytes};
