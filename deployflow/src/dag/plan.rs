//! Execution plan produced from a DAG expression.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A set of stage names that are deployed concurrently.
///
/// Names are kept in the order they were written so that iteration is
/// deterministic; the order carries no scheduling meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStep")]
pub struct Step {
    stages: Vec<String>,
}

#[derive(Deserialize)]
struct RawStep {
    stages: Vec<String>,
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        if let Some(blank) = raw.stages.iter().find(|name| name.trim().is_empty()) {
            return Err(format!("blank stage name {blank:?} in step"));
        }
        Self::new(raw.stages).ok_or_else(|| "a step must name at least one stage".to_string())
    }
}

impl Step {
    /// Creates a step from stage names, dropping repeated names.
    ///
    /// Returns `None` if no names are given.
    #[must_use]
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Option<Self> {
        let mut seen = HashSet::new();
        let stages: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|name| seen.insert(name.clone()))
            .collect();

        if stages.is_empty() {
            None
        } else {
            Some(Self { stages })
        }
    }

    /// The stage names in this step.
    #[must_use]
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Number of stages in the step.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false; a step holds at least one stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether the step contains the named stage.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stages.iter().any(|s| s == name)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stages.join(","))
    }
}

/// An ordered sequence of steps separated by barriers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    steps: Vec<Step>,
}

impl ExecutionPlan {
    /// Creates a plan from steps.
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// The steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All stage names in plan order (step order, then within-step order).
    ///
    /// A name referenced by several steps appears once per reference.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .flat_map(|step| step.stages.iter().map(String::as_str))
    }

    /// Distinct stage names in first-reference order.
    #[must_use]
    pub fn distinct_stage_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.stage_names().filter(|name| seen.insert(*name)).collect()
    }

    /// The plan as nested name lists, one list per step.
    #[must_use]
    pub fn to_nested(&self) -> Vec<Vec<String>> {
        self.steps.iter().map(|step| step.stages.clone()).collect()
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
        write!(f, "{}", steps.join(" >> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_rejects_empty() {
        assert!(Step::new(Vec::<String>::new()).is_none());
    }

    #[test]
    fn test_deserialize_enforces_non_empty_steps() {
        let plan: ExecutionPlan =
            serde_json::from_str(r#"{"steps": [{"stages": ["a"]}, {"stages": ["b", "b"]}]}"#)
                .unwrap();
        assert_eq!(plan.to_nested(), vec![vec!["a".to_string()], vec!["b".to_string()]]);

        assert!(serde_json::from_str::<Step>(r#"{"stages": []}"#).is_err());
        assert!(serde_json::from_str::<Step>(r#"{"stages": ["a", " "]}"#).is_err());
        assert!(serde_json::from_str::<ExecutionPlan>(r#"{"steps": [{"stages": []}]}"#).is_err());
    }

    #[test]
    fn test_step_drops_repeated_names() {
        let step = Step::new(["a", "b", "a"]).unwrap();
        assert_eq!(step.stages(), &["a".to_string(), "b".to_string()]);
        assert!(step.contains("b"));
    }

    #[test]
    fn test_distinct_stage_names_in_first_reference_order() {
        let plan = ExecutionPlan::new(vec![
            Step::new(["a"]).unwrap(),
            Step::new(["b", "c"]).unwrap(),
            Step::new(["a"]).unwrap(),
        ]);

        assert_eq!(plan.stage_names().count(), 4);
        assert_eq!(plan.distinct_stage_names(), vec!["a", "b", "c"]);
        assert_eq!(plan.to_string(), "a >> b,c >> a");
    }
}
