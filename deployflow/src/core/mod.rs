//! Core domain enums for deployflow.
//!
//! This module contains the closed sets the engine dispatches on:
//! - Stage kind and stage status
//! - Workflow state machine states
//! - Project log level

mod status;

pub use status::{LogLevel, StageKind, StageStatus, WorkflowState};
