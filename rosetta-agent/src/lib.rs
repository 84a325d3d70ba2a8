//! # Rosetta Agent
//!
//! Solves Linguistics Olympiad "Rosetta Stone" problems with a reasoning
//! model:
//! 1. The extractor turns raw problem text into a `StructuredProblem`
//! 2. The initial hypothesis proposes rules and seeds the vocabulary
//! 3. The verify-improve loop tests every rule and sentence blind, aggregates
//!    the verdicts, and revises the rules until they pass or the iteration
//!    cap is reached
//! 4. The answerer applies the final rules to each question
//!
//! Any step that cannot produce a usable result ends the run with a
//! `PipelineFailure` naming the stage. Progress is observable through
//! `WorkflowEvent`s and an optional markdown execution log.

pub mod agents;
pub mod config;
pub mod context;
pub mod events;
pub mod iterate;
pub mod log;
pub mod pipeline;
pub mod problem;
pub mod prompts;
pub mod steps;
pub mod two_phase;
pub mod verdict;
pub mod verify;
pub mod vocabulary;

pub use config::WorkflowConfig;
pub use context::{RunContext, RunOptions};
pub use events::{ChannelSink, EventKind, EventSink, MemorySink, NullSink, WorkflowEvent};
pub use iterate::{LoopOutcome, LoopState};
pub use log::ExecutionLog;
pub use pipeline::{Pipeline, PipelineFailure, PipelineOutput, Stage};
pub use problem::{Answer, Rule, StructuredProblem, VocabularyEntry};
pub use verdict::{Conclusion, VerifierFeedback};
pub use vocabulary::VocabularyStore;
