//! Explicit per-run state threaded through every step.

use crate::events::{EventKind, EventSink, NullSink, WorkflowEvent};
use crate::log::{ExecutionLog, StepTimings};
use crate::problem::{Rule, StructuredProblem, VocabularyEntry};
use crate::vocabulary::VocabularyStore;
use rosetta_error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-problem overrides of the configured workflow defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Test both translation directions of every dataset item
    pub bidirectional: Option<bool>,
    pub max_iterations: Option<u32>,
}

/// Everything one pipeline run owns. Concurrent runs never share one.
pub struct RunContext {
    run_id: Uuid,
    cancel: CancellationToken,
    sink: Arc<dyn EventSink>,
    log: ExecutionLog,
    timings: StepTimings,
    vocabulary: VocabularyStore,
    sequence: AtomicU64,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            sink: Arc::new(NullSink),
            log: ExecutionLog::disabled(),
            timings: StepTimings::new(),
            vocabulary: VocabularyStore::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_log(mut self, log: ExecutionLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn timings(&self) -> &StepTimings {
        &self.timings
    }

    pub fn vocabulary(&self) -> &VocabularyStore {
        &self.vocabulary
    }

    pub fn emit(&self, event: EventKind) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.sink.emit(WorkflowEvent {
            run_id: self.run_id,
            sequence,
            timestamp: chrono::Utc::now(),
            event,
        });
    }

    pub fn begin_step(&self, step_id: &str) {
        tracing::info!(run_id = %self.run_id, step = step_id, "step started");
        self.timings.start(step_id);
        self.emit(EventKind::StepStart {
            step_id: step_id.to_string(),
        });
    }

    pub fn complete_step(&self, step_id: &str) -> Duration {
        let elapsed = self.timings.finish(step_id);
        tracing::info!(
            run_id = %self.run_id,
            step = step_id,
            duration_ms = elapsed.as_millis() as u64,
            "step completed"
        );
        self.emit(EventKind::StepComplete {
            step_id: step_id.to_string(),
            duration_ms: elapsed.as_millis() as u64,
        });
        elapsed
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled().with_context("run_id", self.run_id.to_string()))
        } else {
            Ok(())
        }
    }

    /// Drive `fut` unless the run is cancelled first; the future is
    /// dropped mid-flight on cancellation.
    pub async fn cancellable<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(Error::cancelled().with_context("run_id", self.run_id.to_string()))
            }
            result = fut => result,
        }
    }

    /// Read-only view handed to leaf verifiers for one pass
    pub fn verification<'a>(
        &self,
        problem: &'a StructuredProblem,
        rules: &'a [Rule],
    ) -> VerificationContext<'a> {
        VerificationContext {
            problem,
            rules,
            vocabulary: self.vocabulary.get(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the inputs every leaf verifier in one pass reads
#[derive(Debug, Clone)]
pub struct VerificationContext<'a> {
    pub problem: &'a StructuredProblem,
    pub rules: &'a [Rule],
    pub vocabulary: Vec<VocabularyEntry>,
}
