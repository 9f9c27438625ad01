//! Testing utilities for deployflow.
//!
//! This module provides:
//! - An in-memory cluster that records calls and scripts stage outcomes
//! - On-disk project fixtures

mod fixtures;
mod mocks;

pub use fixtures::ProjectFixture;
pub use mocks::{ClusterCall, MockCluster, MockStageBehavior};
