//! Join-all task group used as the barrier for one plan step.

use futures::future::join_all;
use std::future::Future;
use tokio::task::{JoinError, JoinHandle};

/// A group of concurrently running stage tasks.
///
/// Unlike a fail-fast group, a failure in one task never cancels its
/// siblings: [`StageTaskGroup::join_all`] waits for every task and hands back
/// every outcome. Dropping the group detaches its tasks rather than aborting
/// them.
pub struct StageTaskGroup<T> {
    handles: Vec<(String, JoinHandle<T>)>,
}

impl<T: Send + 'static> StageTaskGroup<T> {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self { handles: Vec::new() }
    }

    /// Spawns a named task onto the runtime.
    pub fn spawn<Fut>(&mut self, name: impl Into<String>, task: Fut)
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        self.handles.push((name.into(), tokio::spawn(task)));
    }

    /// Returns the number of tasks in the group.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every task to finish.
    ///
    /// Outcomes are returned in spawn order. A task that panicked yields its
    /// `JoinError`.
    pub async fn join_all(self) -> Vec<(String, Result<T, JoinError>)> {
        let (names, handles): (Vec<String>, Vec<JoinHandle<T>>) = self.handles.into_iter().unzip();
        names.into_iter().zip(join_all(handles).await).collect()
    }
}

impl<T: Send + 'static> Default for StageTaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for StageTaskGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handles.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("StageTaskGroup").field("tasks", &names).finish()
    }
}
