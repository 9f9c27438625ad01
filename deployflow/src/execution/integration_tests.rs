//! End-to-end runs of the executor against an in-memory cluster.

use super::WorkflowExecutor;
use crate::config::{ExecutorConfig, ImageCheckPolicy, RegistryConfig};
use crate::core::{StageStatus, WorkflowState};
use crate::observability::project_dispatch_with_writer;
use parking_lot::Mutex;
use std::io::Write;
use crate::errors::DeployflowError;
use crate::events::CollectingEventSink;
use crate::image::{DockerImageValidator, MockRegistryClient};
use crate::testing::{ClusterCall, MockCluster, ProjectFixture};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const NAMESPACE: &str = "bodywork-dev";

fn registry_returning(status: u16) -> DockerImageValidator {
    let mut client = MockRegistryClient::new();
    client.expect_get_status().returning(move |_| Ok(status));
    DockerImageValidator::new(Arc::new(client), RegistryConfig::default())
}

fn unused_registry() -> DockerImageValidator {
    let mut client = MockRegistryClient::new();
    client.expect_get_status().never();
    DockerImageValidator::new(Arc::new(client), RegistryConfig::default())
}

fn quiet_config() -> ExecutorConfig {
    ExecutorConfig::new().with_print_stage_logs(false)
}

fn write_project(fixture: &ProjectFixture) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fixture.write_to(dir.path()).unwrap();
    dir
}

fn executor(cluster: &Arc<MockCluster>, images: DockerImageValidator) -> WorkflowExecutor {
    WorkflowExecutor::new(cluster.clone(), images).with_config(quiet_config())
}

async fn run(
    executor: &WorkflowExecutor,
    root: &Path,
) -> Result<super::WorkflowResult, DeployflowError> {
    executor.run(NAMESPACE, root).await
}

fn three_stage_project() -> ProjectFixture {
    ProjectFixture::new("bodywork-test-project")
        .with_batch_stage("stage_1")
        .with_batch_stage("stage_2")
        .with_service_stage("stage_3")
        .with_dag("stage_1 >> stage_2, stage_3")
}

#[tokio::test]
async fn test_full_workflow_succeeds() {
    let dir = write_project(&three_stage_project());
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));

    let result = run(&executor(&cluster, registry_returning(200)), dir.path())
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.state, WorkflowState::Succeeded);
    assert_eq!(result.steps_total, 2);
    assert_eq!(result.steps_completed, 2);
    for stage in ["stage_1", "stage_2", "stage_3"] {
        assert_eq!(result.status(stage), Some(StageStatus::Succeeded));
    }
    assert!(result.failed_stages().is_empty());
    assert!(result.into_result().is_ok());
}

#[tokio::test]
async fn test_missing_namespace_aborts_before_deploying() {
    let dir = write_project(&three_stage_project());
    let cluster = Arc::new(MockCluster::new());

    let err = run(&executor(&cluster, unused_registry()), dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, DeployflowError::WorkflowExecution(_)));
    assert!(err.to_string().contains("bodywork-dev is not a valid namespace"));
    assert_eq!(cluster.deploy_count(), 0);
}

#[tokio::test]
async fn test_next_step_starts_only_after_barrier() {
    let dir = write_project(
        &ProjectFixture::new("barrier")
            .with_batch_stage("a")
            .with_batch_stage("b")
            .with_batch_stage("c")
            .with_dag("a, b >> c"),
    );
    let cluster = Arc::new(
        MockCluster::new()
            .with_namespace(NAMESPACE)
            .with_stage_delay("a", Duration::from_millis(60))
            .with_stage_delay("b", Duration::from_millis(10)),
    );

    let result = run(&executor(&cluster, registry_returning(200)), dir.path())
        .await
        .unwrap();
    assert!(result.is_success());

    let deploy_c = cluster.position(&ClusterCall::DeployBatch("c".to_string())).unwrap();
    let finished_a = cluster.position(&ClusterCall::WaitFinished("a".to_string())).unwrap();
    let finished_b = cluster.position(&ClusterCall::WaitFinished("b".to_string())).unwrap();
    assert!(deploy_c > finished_a);
    assert!(deploy_c > finished_b);

    // Both stages of step 1 are submitted before either finishes.
    let deploy_b = cluster.position(&ClusterCall::DeployBatch("b".to_string())).unwrap();
    assert!(deploy_b < finished_a);
}

#[tokio::test]
async fn test_failed_stage_stops_later_steps_but_not_siblings() {
    let dir = write_project(
        &ProjectFixture::new("failing")
            .with_batch_stage("a")
            .with_batch_stage("b")
            .with_batch_stage("c")
            .with_dag("a, b >> c"),
    );
    let cluster = Arc::new(
        MockCluster::new()
            .with_namespace(NAMESPACE)
            .with_failing_stage("a", Duration::ZERO, "exit code 1")
            .with_stage_delay("b", Duration::from_millis(40)),
    );

    let result = run(&executor(&cluster, registry_returning(200)), dir.path())
        .await
        .unwrap();

    assert_eq!(result.state, WorkflowState::Failed);
    assert_eq!(result.status("a"), Some(StageStatus::Failed));
    assert_eq!(result.status("b"), Some(StageStatus::Succeeded));
    assert_eq!(result.status("c"), Some(StageStatus::Pending));
    assert_eq!(result.steps_completed, 0);
    assert_eq!(result.failures.get("a").map(String::as_str), Some("failed: exit code 1"));
    assert_eq!(cluster.deployed_stages(), vec!["a".to_string(), "b".to_string()]);

    let err = result.into_result().unwrap_err();
    assert_eq!(err.failed_stages, vec!["a".to_string()]);
    assert!(err.to_string().contains("failed in step 1"));
}

#[tokio::test]
async fn test_rejected_submission_fails_stage() {
    let dir = write_project(&ProjectFixture::new("rejected").with_batch_stage("a"));
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE).with_stage(
        "a",
        crate::testing::MockStageBehavior {
            reject_deploy: true,
            ..Default::default()
        },
    ));

    let result = run(&executor(&cluster, registry_returning(200)), dir.path())
        .await
        .unwrap();

    assert_eq!(result.status("a"), Some(StageStatus::Failed));
    assert!(result.failures["a"].contains("rejected"));
    assert_eq!(cluster.position(&ClusterCall::WaitFinished("a".to_string())), None);
}

#[tokio::test]
async fn test_stage_exceeding_deadline_times_out() {
    let dir = write_project(&ProjectFixture::new("slow").with_batch_stage("slow"));
    let cluster = Arc::new(
        MockCluster::new()
            .with_namespace(NAMESPACE)
            .with_stage_delay("slow", Duration::from_secs(30)),
    );
    let executor = WorkflowExecutor::new(cluster.clone(), registry_returning(200))
        .with_config(quiet_config().with_default_stage_timeout(Duration::from_millis(50)));

    let result = run(&executor, dir.path()).await.unwrap();

    assert_eq!(result.status("slow"), Some(StageStatus::Failed));
    assert!(result.failures["slow"].contains("timed out"));
}

#[tokio::test]
async fn test_ready_service_counts_as_success() {
    let dir = write_project(&ProjectFixture::new("svc").with_service_stage("serve"));
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));

    let result = run(&executor(&cluster, registry_returning(200)), dir.path())
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(
        cluster.position(&ClusterCall::DeployService("serve".to_string())),
        Some(1)
    );
}

#[tokio::test]
async fn test_missing_image_aborts_by_default() {
    let dir = write_project(&three_stage_project());
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));

    let err = run(&executor(&cluster, registry_returning(404)), dir.path())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("alexioannides/bodywork:latest"));
    assert_eq!(cluster.deploy_count(), 0);
}

#[tokio::test]
async fn test_missing_image_warns_under_warn_policy() {
    let dir = write_project(&three_stage_project());
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));
    let executor = WorkflowExecutor::new(cluster.clone(), registry_returning(404))
        .with_config(quiet_config().with_image_check_policy(ImageCheckPolicy::Warn));

    let result = run(&executor, dir.path()).await.unwrap();

    assert!(result.is_success());
    assert_eq!(cluster.deploy_count(), 3);
}

#[tokio::test]
async fn test_unreachable_registry_aborts() {
    let dir = write_project(&three_stage_project());
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));
    let mut client = MockRegistryClient::new();
    client
        .expect_get_status()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("connection refused")));
    let images = DockerImageValidator::new(Arc::new(client), RegistryConfig::default());

    let err = run(&executor(&cluster, images), dir.path()).await.unwrap_err();

    assert_eq!(err.kind(), "RegistryUnreachableError");
    assert!(err.to_string().contains("cannot connect to"));
    assert_eq!(cluster.deploy_count(), 0);
}

#[tokio::test]
async fn test_malformed_dag_fails_before_cluster_calls() {
    let dir = write_project(
        &ProjectFixture::new("bad-dag")
            .with_batch_stage("a")
            .with_dag("a >> >> b"),
    );
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));

    let err = run(&executor(&cluster, unused_registry()), dir.path())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "MalformedDagError");
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn test_unresolved_stage_fails_before_cluster_calls() {
    let dir = write_project(
        &ProjectFixture::new("missing-stage")
            .with_batch_stage("a")
            .with_dag("a >> ghost"),
    );
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));

    let err = run(&executor(&cluster, unused_registry()), dir.path())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "UnresolvedStageError");
    assert!(err.to_string().contains("ghost"));
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn test_bad_image_format_fails_before_deploying() {
    let dir = write_project(
        &ProjectFixture::new("bad-image")
            .with_batch_stage("a")
            .with_image("bodywork:latest"),
    );
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));

    let err = run(&executor(&cluster, unused_registry()), dir.path())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "InvalidImageFormatError");
    assert_eq!(cluster.deploy_count(), 0);
}

#[tokio::test]
async fn test_events_follow_run_lifecycle() {
    let dir = write_project(
        &ProjectFixture::new("events")
            .with_batch_stage("a")
            .with_batch_stage("b")
            .with_dag("a >> b"),
    );
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));
    let sink = Arc::new(CollectingEventSink::new());
    let executor = executor(&cluster, registry_returning(200)).with_event_sink(sink.clone());

    run(&executor, dir.path()).await.unwrap();

    assert_eq!(
        sink.event_types(),
        vec![
            "workflow.started",
            "workflow.preflight_passed",
            "step.started",
            "stage.started",
            "stage.succeeded",
            "step.completed",
            "step.started",
            "stage.started",
            "stage.succeeded",
            "step.completed",
            "workflow.succeeded",
        ]
    );
}

#[tokio::test]
async fn test_preflight_failure_emits_workflow_failed() {
    let dir = write_project(&three_stage_project());
    let cluster = Arc::new(MockCluster::new());
    let sink = Arc::new(CollectingEventSink::new());
    let executor = executor(&cluster, unused_registry()).with_event_sink(sink.clone());

    assert!(run(&executor, dir.path()).await.is_err());
    assert_eq!(sink.event_types(), vec!["workflow.started", "workflow.failed"]);
}

#[tokio::test]
async fn test_stage_logs_printed_after_each_step() {
    let dir = write_project(&ProjectFixture::new("logs").with_batch_stage("train"));
    let cluster = Arc::new(
        MockCluster::new()
            .with_namespace(NAMESPACE)
            .with_pod("logs--train", "logs--train-x1", "training done"),
    );
    let executor = WorkflowExecutor::new(cluster.clone(), registry_returning(200));

    run(&executor, dir.path()).await.unwrap();

    let finished = cluster
        .position(&ClusterCall::WaitFinished("train".to_string()))
        .unwrap();
    let lookup = cluster
        .position(&ClusterCall::LatestPodName("logs--train".to_string()))
        .unwrap();
    assert!(lookup > finished);
    assert!(cluster
        .calls()
        .contains(&ClusterCall::PodLogs("logs--train-x1".to_string())));
}

#[tokio::test]
async fn test_stage_repeated_across_steps_keeps_each_run() {
    let dir = write_project(
        &ProjectFixture::new("repeat")
            .with_batch_stage("a")
            .with_batch_stage("b")
            .with_dag("a >> b >> a"),
    );
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));

    let result = run(&executor(&cluster, registry_returning(200)), dir.path())
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.steps_completed, 3);
    assert_eq!(
        cluster.deployed_stages(),
        vec!["a".to_string(), "b".to_string(), "a".to_string()]
    );

    let steps: Vec<(usize, &str)> = result
        .outcomes
        .iter()
        .map(|o| (o.step, o.stage.as_str()))
        .collect();
    assert_eq!(steps, vec![(1, "a"), (2, "b"), (3, "a")]);

    let runs_of_a = result.outcomes_for("a");
    assert_eq!(runs_of_a.len(), 2);
    assert!(runs_of_a.iter().all(|o| o.status == StageStatus::Succeeded));
    assert_eq!(result.status("a"), Some(StageStatus::Succeeded));
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

async fn run_logged_at(level: &str) -> String {
    let dir = write_project(
        &ProjectFixture::new("levels")
            .with_batch_stage("train")
            .with_log_level(level),
    );
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));
    let captured = CapturedLogs::default();
    let writer = captured.clone();
    let executor = executor(&cluster, registry_returning(200)).with_project_logging(move |level| {
        let writer = writer.clone();
        project_dispatch_with_writer(level, BoxMakeWriter::new(move || writer.clone()))
    });

    assert!(run(&executor, dir.path()).await.unwrap().is_success());
    captured.text()
}

#[tokio::test]
async fn test_project_log_level_is_applied_to_run() {
    let debug = run_logged_at("DEBUG").await;
    assert!(debug.contains("Starting workflow"));
    assert!(debug.contains("Workflow state transition"));
    // Logged from inside the spawned stage task.
    assert!(debug.contains("Stage submitted"));

    let error = run_logged_at("ERROR").await;
    assert!(!error.contains("Starting workflow"));
    assert!(!error.contains("Stage submitted"));
    assert!(!error.contains("Workflow succeeded"));
}

#[tokio::test]
async fn test_project_logging_can_be_disabled() {
    let dir = write_project(&ProjectFixture::new("plain").with_batch_stage("a"));
    let cluster = Arc::new(MockCluster::new().with_namespace(NAMESPACE));
    let executor = executor(&cluster, registry_returning(200)).without_project_logging();

    assert!(run(&executor, dir.path()).await.unwrap().is_success());
}
