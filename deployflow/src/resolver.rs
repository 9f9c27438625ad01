//! Resolution of plan stage names into stage descriptors.

use crate::config::StageDescriptor;
use crate::core::StageKind;
use crate::dag::ExecutionPlan;
use crate::errors::UnresolvedStageError;
use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::{debug, warn};

/// Immutable mapping from stage name to its descriptor.
///
/// A name referenced by several steps maps to one shared descriptor.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: HashMap<String, Arc<StageDescriptor>>,
}

impl StageRegistry {
    /// Looks up a stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<StageDescriptor>> {
        self.stages.get(name)
    }

    /// Whether the registry holds `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Number of distinct stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterates over name and descriptor pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<StageDescriptor>)> {
        self.stages.iter().map(|(name, stage)| (name.as_str(), stage))
    }

    /// Names of stages of the given kind, sorted.
    #[must_use]
    pub fn names_of_kind(&self, kind: StageKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .stages
            .iter()
            .filter(|(_, stage)| stage.kind() == kind)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// Resolves stage names against the stage directories of a project.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageResolver;

impl StageResolver {
    /// Creates a new resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds the registry for every stage referenced by `plan`.
    ///
    /// Names are visited in plan order and the first one that cannot be
    /// resolved stops resolution; later names are never read.
    ///
    /// # Errors
    ///
    /// Returns [`UnresolvedStageError`] naming the first stage whose
    /// directory or descriptor is missing or invalid.
    pub fn resolve(
        &self,
        plan: &ExecutionPlan,
        project_root: &Path,
    ) -> Result<StageRegistry, UnresolvedStageError> {
        let mut stages: HashMap<String, Arc<StageDescriptor>> = HashMap::new();

        for name in plan.stage_names() {
            if stages.contains_key(name) {
                continue;
            }

            if !is_plain_directory_name(name) {
                warn!(stage = %name, "Stage name is not a plain directory name");
                return Err(UnresolvedStageError::new(
                    name,
                    "stage names must be a single directory name",
                ));
            }

            let descriptor = StageDescriptor::load(name, &project_root.join(name)).map_err(|e| {
                warn!(stage = %name, error = %e, "Failed to resolve stage");
                UnresolvedStageError::new(name, e.to_string())
            })?;

            debug!(stage = %name, kind = %descriptor.kind(), "Resolved stage");
            stages.insert(name.to_string(), Arc::new(descriptor));
        }

        Ok(StageRegistry { stages })
    }
}

fn is_plain_directory_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::parse_dag;
    use crate::testing::ProjectFixture;
    use tempfile::TempDir;

    fn project() -> (TempDir, ProjectFixture) {
        let dir = tempfile::tempdir().unwrap();
        let fixture = ProjectFixture::new("deployflow-test-project")
            .with_batch_stage("stage_1_good")
            .with_batch_stage("stage_4_good")
            .with_service_stage("stage_5_good")
            .with_raw_stage("stage_2_bad_config", "[stage]\nkind = \"cron\"\n")
            .with_empty_stage_dir("stage_3_no_config");
        fixture.write_to(dir.path()).unwrap();
        (dir, fixture)
    }

    #[test]
    fn test_resolves_valid_multi_step_plan() {
        let (dir, _) = project();
        let plan = parse_dag("stage_1_good >> stage_4_good,stage_5_good").unwrap();

        let registry = StageResolver::new().resolve(&plan, dir.path()).unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names_of_kind(StageKind::Batch), vec!["stage_1_good", "stage_4_good"]);
        assert_eq!(registry.names_of_kind(StageKind::Service), vec!["stage_5_good"]);

        let stage_1 = registry.get("stage_1_good").unwrap();
        assert_eq!(stage_1.name(), "stage_1_good");
        assert_eq!(stage_1.source_directory(), dir.path().join("stage_1_good"));
    }

    #[test]
    fn test_invalid_stage_named_regardless_of_position() {
        let (dir, _) = project();
        let resolver = StageResolver::new();

        for expression in [
            "stage_2_bad_config >> stage_1_good",
            "stage_1_good >> stage_2_bad_config",
            "stage_1_good >> stage_4_good,stage_2_bad_config",
        ] {
            let plan = parse_dag(expression).unwrap();
            let err = resolver.resolve(&plan, dir.path()).unwrap_err();
            assert_eq!(err.stage, "stage_2_bad_config", "expression: {expression}");
        }
    }

    #[test]
    fn test_first_failure_wins() {
        let (dir, _) = project();
        let plan = parse_dag("stage_1_good >> stage_3_no_config >> stage_2_bad_config").unwrap();

        let err = StageResolver::new().resolve(&plan, dir.path()).unwrap_err();
        assert_eq!(err.stage, "stage_3_no_config");
        assert!(err.reason.contains("not found"));
    }

    #[test]
    fn test_missing_directory() {
        let (dir, _) = project();
        let plan = parse_dag("stage_1_good >> does_not_exist").unwrap();

        let err = StageResolver::new().resolve(&plan, dir.path()).unwrap_err();
        assert_eq!(err.stage, "does_not_exist");
        assert!(err.reason.contains("does not exist"));
    }

    #[test]
    fn test_repeated_name_shares_descriptor() {
        let (dir, _) = project();
        let plan = parse_dag("stage_1_good >> stage_4_good >> stage_1_good").unwrap();

        let registry = StageResolver::new().resolve(&plan, dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_rejects_path_like_names() {
        let (dir, _) = project();
        let plan = parse_dag("../stage_1_good").unwrap();

        let err = StageResolver::new().resolve(&plan, dir.path()).unwrap_err();
        assert_eq!(err.stage, "../stage_1_good");
    }
}
