//! Tracing setup and spans for workflow runs.

use crate::core::LogLevel;
use tracing::{Dispatch, Span};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber filtered at `level`.
///
/// `RUST_LOG`, when set, takes precedence over `level`. Returns false if a
/// global subscriber was already installed, which is not an error.
pub fn init_tracing(level: LogLevel) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// A dispatcher that logs to stderr at the project's level.
///
/// The executor installs it as the default while a run is polled, so the
/// project descriptor's log level decides what the run emits.
#[must_use]
pub fn project_dispatch(level: LogLevel) -> Dispatch {
    project_dispatch_with_writer(level, BoxMakeWriter::new(std::io::stderr))
}

/// Like [`project_dispatch`], writing to `writer`.
#[must_use]
pub fn project_dispatch_with_writer(level: LogLevel, writer: BoxMakeWriter) -> Dispatch {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level.as_tracing_level())
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .finish();
    Dispatch::new(subscriber)
}

/// Span covering one workflow run.
#[must_use]
pub fn workflow_span(run_id: &str, namespace: &str) -> Span {
    tracing::info_span!("workflow", run_id = %run_id, namespace = %namespace)
}

/// Span covering one stage task.
#[must_use]
pub fn stage_span(step: usize, stage: &str, identifier: &str) -> Span {
    tracing::info_span!("stage", step = step, stage = %stage, identifier = %identifier)
}
