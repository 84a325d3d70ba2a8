//! The sequential pipeline steps. Each one either produces its typed
//! output or bails with a terminal failure of its own kind.

mod answer;
mod extract;
mod hypothesis;
mod improve;

pub use answer::{answer_questions, AnswerReply};
pub use extract::{extract_problem, ExtractionReply};
pub use hypothesis::initial_hypothesis;
pub use improve::improve_rules;

use crate::context::RunContext;
use crate::events::{EventKind, VocabularyAction};
use crate::problem::{Rule, VocabularyDelta, VocabularyEntry};
use rosetta_error::{Error, ErrorKind, Result};
use serde::Deserialize;
use std::future::Future;

/// Structured half of the hypothesis and improvement steps
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesReply {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub vocabulary: VocabularyDelta,
}

/// Bracket `fut` with step events. A failed step emits only the start.
pub(crate) async fn in_step<T, F>(ctx: &RunContext, step_id: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    ctx.begin_step(step_id);
    let result = fut.await;
    match &result {
        Ok(_) => {
            ctx.complete_step(step_id);
        }
        Err(e) => {
            tracing::warn!(run_id = %ctx.run_id(), step = step_id, error = %e, "step failed");
            ctx.log().section(&format!("{} failed", step_id), &e.to_string());
        }
    }
    result
}

/// Map a model error onto the step's failure kind. Cancellation and schema
/// violations keep their own kinds.
pub(crate) fn step_error(kind: ErrorKind, operation: &'static str, err: Error) -> Error {
    match err.kind() {
        ErrorKind::Cancelled | ErrorKind::SchemaInvalid => err.with_operation(operation),
        _ => Error::new(kind, err.message().to_string())
            .with_operation(operation)
            .with_context("cause", err.kind().as_str())
            .set_source(err),
    }
}

/// Drop rules without a title and keep the first of any duplicate title.
pub(crate) fn normalize_rules(rules: Vec<Rule>) -> Vec<Rule> {
    let mut seen = std::collections::HashSet::new();
    rules
        .into_iter()
        .filter(|r| !r.title.trim().is_empty())
        .filter(|r| seen.insert(r.title.trim().to_string()))
        .collect()
}

/// Apply a proposed vocabulary delta and report each action.
pub(crate) fn apply_vocabulary(ctx: &RunContext, step_id: &str, delta: &VocabularyDelta) {
    if delta.is_empty() {
        return;
    }
    let outcome = ctx.vocabulary().apply(delta);
    tracing::info!(
        step = step_id,
        added = outcome.added.added,
        updated = outcome.updated.updated,
        removed = outcome.removed.removed,
        total = outcome.added.total,
        "vocabulary updated"
    );

    let actions = [
        (VocabularyAction::Remove, delta.remove.clone()),
        (
            VocabularyAction::Update,
            delta.update.iter().map(|e| e.foreign_form.clone()).collect(),
        ),
        (
            VocabularyAction::Add,
            delta.add.iter().map(|e| e.foreign_form.clone()).collect(),
        ),
    ];
    for (action, entries) in actions {
        if !entries.is_empty() {
            ctx.emit(EventKind::VocabularyUpdate {
                step_id: step_id.to_string(),
                action,
                entries,
            });
        }
    }
}

/// Replace the whole store with `entries`, reporting the clear and the
/// re-add as separate actions.
pub(crate) fn restore_vocabulary(ctx: &RunContext, step_id: &str, entries: &[VocabularyEntry]) {
    let cleared: Vec<String> = ctx
        .vocabulary()
        .get()
        .into_iter()
        .map(|e| e.foreign_form)
        .collect();
    ctx.vocabulary().clear();
    let added = ctx.vocabulary().add(entries);
    tracing::info!(
        step = step_id,
        cleared = cleared.len(),
        restored = added.added,
        "vocabulary restored"
    );

    ctx.emit(EventKind::VocabularyUpdate {
        step_id: step_id.to_string(),
        action: VocabularyAction::Clear,
        entries: cleared,
    });
    if !entries.is_empty() {
        ctx.emit(EventKind::VocabularyUpdate {
            step_id: step_id.to_string(),
            action: VocabularyAction::Add,
            entries: entries.iter().map(|e| e.foreign_form.clone()).collect(),
        });
    }
}
