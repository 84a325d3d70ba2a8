//! Progress events emitted while a run executes
//!
//! Events are ordered per run (`sequence`), timestamped, and tagged with the
//! step or agent that produced them. They are emitted on failure paths too:
//! a failed step emits `StepStart` and never `StepComplete`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One telemetry record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub run_id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum EventKind {
    StepStart {
        step_id: String,
    },

    StepComplete {
        step_id: String,
        duration_ms: u64,
    },

    /// Free-text reasoning produced by an agent
    AgentReasoning {
        agent_id: String,
        text: String,
    },

    /// A leaf capability invocation and its result
    ToolCall {
        agent_id: String,
        tool: String,
        input: serde_json::Value,
        output: serde_json::Value,
        success: bool,
    },

    VocabularyUpdate {
        step_id: String,
        action: VocabularyAction,
        entries: Vec<String>,
    },

    IterationUpdate {
        iteration: u32,
        max_iterations: u32,
        conclusion: String,
    },

    RunFinished {
        outcome: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyAction {
    Add,
    Update,
    Remove,
    Clear,
}

/// Destination for workflow events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkflowEvent);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: WorkflowEvent) {}
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.event).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: WorkflowEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Forwards events to a streaming consumer
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: WorkflowEvent) {
        // A consumer that hung up just stops receiving; the run goes on.
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(sequence: u64, kind: EventKind) -> WorkflowEvent {
        WorkflowEvent {
            run_id: Uuid::nil(),
            sequence,
            timestamp: Utc::now(),
            event: kind,
        }
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(event(
            3,
            EventKind::StepComplete {
                step_id: "verify-rules".into(),
                duration_ms: 42,
            },
        ))
        .unwrap();

        assert_eq!(json["sequence"], 3);
        assert_eq!(json["event"]["type"], "step-complete");
        assert_eq!(json["event"]["data"]["duration_ms"], 42);
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.emit(event(0, EventKind::StepStart { step_id: "a".into() }));
        sink.emit(event(1, EventKind::StepStart { step_id: "b".into() }));

        let seq: Vec<u64> = sink.events().iter().map(|e| e.sequence).collect();
        assert_eq!(seq, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(event(0, EventKind::RunFinished { outcome: "converged".into() }));
        assert!(rx.recv().await.is_some());

        drop(rx);
        sink.emit(event(1, EventKind::RunFinished { outcome: "again".into() }));
    }
}
