//! Best-effort retrieval of stage logs.
//!
//! Log output is for operator visibility only, so nothing here ever returns an
//! error: every failure turns into a printed diagnostic.

use crate::cluster::ClusterApi;
use std::io::Write;
use std::sync::Arc;
use tracing::warn;

/// Fetches and prints the latest pod logs for a deployed stage.
#[derive(Clone)]
pub struct LogReporter {
    cluster: Arc<dyn ClusterApi>,
}

impl LogReporter {
    /// Creates a reporter over a cluster capability.
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Returns the latest pod's log text for `identifier`, or the diagnostic
    /// `cannot get logs for <identifier>` if there is no pod or any lookup
    /// fails.
    pub async fn logs_or_diagnostic(&self, namespace: &str, identifier: &str) -> String {
        let pod_name = match self.cluster.latest_pod_name(namespace, identifier).await {
            Ok(Some(pod_name)) => pod_name,
            Ok(None) => {
                warn!(namespace = %namespace, identifier = %identifier, "No pod found");
                return diagnostic(identifier);
            }
            Err(e) => {
                warn!(
                    namespace = %namespace,
                    identifier = %identifier,
                    error = %e,
                    "Pod lookup failed"
                );
                return diagnostic(identifier);
            }
        };

        match self.cluster.pod_logs(namespace, &pod_name).await {
            Ok(text) => text,
            Err(e) => {
                warn!(namespace = %namespace, pod = %pod_name, error = %e, "Log retrieval failed");
                diagnostic(identifier)
            }
        }
    }

    /// Writes the logs (or diagnostic) for `identifier` to `out`.
    ///
    /// Write errors are logged and dropped.
    pub async fn write_logs<W: Write + Send>(
        &self,
        namespace: &str,
        identifier: &str,
        out: &mut W,
    ) {
        let text = self.logs_or_diagnostic(namespace, identifier).await;
        write_text(identifier, &text, out);
    }

    /// Prints the logs (or diagnostic) for `identifier` to stdout.
    pub async fn print_logs(&self, namespace: &str, identifier: &str) {
        let text = self.logs_or_diagnostic(namespace, identifier).await;
        write_text(identifier, &text, &mut std::io::stdout().lock());
    }
}

impl std::fmt::Debug for LogReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReporter").finish_non_exhaustive()
    }
}

/// Writes `text` verbatim, adding a final newline only if it lacks one.
fn write_text<W: Write>(identifier: &str, text: &str, out: &mut W) {
    let result = if text.ends_with('\n') {
        out.write_all(text.as_bytes())
    } else {
        writeln!(out, "{text}")
    };
    if let Err(e) = result {
        warn!(identifier = %identifier, error = %e, "Could not write stage logs");
    }
}

fn diagnostic(identifier: &str) -> String {
    format!("cannot get logs for {identifier}")
}
