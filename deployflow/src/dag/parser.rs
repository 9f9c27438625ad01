//! Parser for DAG expressions.
//!
//! Grammar:
//!
//! ```text
//! Plan := Step (">>" Step)*
//! Step := Name ("," Name)*
//! ```
//!
//! Whitespace around tokens is ignored. Whether the named stages exist is not
//! checked here; that is the resolver's job.

use super::{ExecutionPlan, Step};
use crate::errors::MalformedDagError;
use tracing::debug;

/// Separator between steps.
pub const STEP_SEPARATOR: &str = ">>";

/// Separator between stage names within a step.
pub const STAGE_SEPARATOR: char = ',';

/// Parses DAG expressions into execution plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct DagParser;

impl DagParser {
    /// Creates a new parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parses `expression` into an [`ExecutionPlan`].
    ///
    /// # Errors
    ///
    /// Returns [`MalformedDagError`] citing the 1-based index of the first
    /// step that contains an empty stage token.
    pub fn parse(&self, expression: &str) -> Result<ExecutionPlan, MalformedDagError> {
        let mut steps = Vec::new();

        for (idx, raw_step) in expression.split(STEP_SEPARATOR).enumerate() {
            let step_index = idx + 1;
            let names: Vec<&str> = raw_step.split(STAGE_SEPARATOR).map(str::trim).collect();

            if names.iter().any(|name| name.is_empty()) {
                return Err(MalformedDagError::new(step_index, expression));
            }

            let step = Step::new(names)
                .ok_or_else(|| MalformedDagError::new(step_index, expression))?;
            steps.push(step);
        }

        let plan = ExecutionPlan::new(steps);
        debug!(steps = plan.len(), plan = %plan, "Parsed DAG expression");
        Ok(plan)
    }
}

/// Parses a DAG expression with the default parser.
///
/// # Errors
///
/// See [`DagParser::parse`].
pub fn parse_dag(expression: &str) -> Result<ExecutionPlan, MalformedDagError> {
    DagParser::new().parse(expression)
}
