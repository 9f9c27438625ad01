//! DAG expressions and the execution plans parsed from them.

mod parser;
mod plan;

pub use parser::{parse_dag, DagParser, STAGE_SEPARATOR, STEP_SEPARATOR};
pub use plan::{ExecutionPlan, Step};
