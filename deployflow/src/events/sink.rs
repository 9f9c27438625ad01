//! Event sink trait and implementations.

use super::WorkflowEvent;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Receives workflow lifecycle events.
///
/// Emitting must never fail or block the executor; sinks swallow their own
/// errors.
pub trait EventSink: Send + Sync {
    /// Emits an event.
    fn emit(&self, event: &WorkflowEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &WorkflowEvent) {}
}

/// A sink that logs events through `tracing`.
///
/// Failure events are always logged at WARN.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the given level for non-failure events.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &WorkflowEvent) {
        let event_type = event.event_type();
        let data = event.data();

        if event.is_failure() {
            warn!(event_type = %event_type, event_data = %data, "Event: {}", event_type);
        } else if self.level == Level::DEBUG {
            debug!(event_type = %event_type, event_data = %data, "Event: {}", event_type);
        } else {
            info!(event_type = %event_type, event_data = %data, "Event: {}", event_type);
        }
    }
}

/// A sink that keeps every event, for tests and post-run inspection.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<WorkflowEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(WorkflowEvent::event_type).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<WorkflowEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &WorkflowEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_started(stage: &str) -> WorkflowEvent {
        WorkflowEvent::StageStarted {
            step: 1,
            stage: stage.to_string(),
            identifier: format!("p--{stage}"),
        }
    }

    #[test]
    fn test_noop_and_logging_sinks_accept_events() {
        NoOpEventSink.emit(&stage_started("a"));
        LoggingEventSink::default().emit(&stage_started("a"));
        LoggingEventSink::debug().emit(&WorkflowEvent::WorkflowFailed {
            reason: "boom".to_string(),
        });
    }

    #[test]
    fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&WorkflowEvent::StepStarted {
            step: 1,
            stages: vec!["a".to_string()],
        });
        sink.emit(&stage_started("a"));
        sink.emit(&WorkflowEvent::StageSucceeded {
            step: 1,
            stage: "a".to_string(),
            duration_ms: 1.0,
        });

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(sink.event_types(), vec!["step.started", "stage.started", "stage.succeeded"]);
    }
}
