//! Verification: leaf rule and sentence testers, the fan-out
//! orchestrator, and the deterministic aggregation of their verdicts.

mod aggregate;
mod orchestrator;
mod rule;
mod sentence;

pub use aggregate::{aggregate, AggregationPolicy, PassResults, RuleCheck, SentenceCheck};
pub use orchestrator::{verify, VerifyOptions};
pub use rule::test_rule;
pub use sentence::test_sentence;

use crate::problem::StructuredProblem;
use serde::Serialize;

/// Which way a sentence is translated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
    Question,
}

impl Direction {
    pub fn describe(&self, kind: &str) -> String {
        match self {
            Direction::Forward => format!("dataset sentence, {}", kind),
            Direction::Reverse => format!("dataset sentence reversed, {}", kind),
            Direction::Question => format!("question, {}", kind),
        }
    }
}

/// One sentence-verifier job. `content` is the only text of the item the
/// verifier gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceTask {
    /// Verdict key, e.g. "3" or "3:reverse"
    pub id: String,
    /// Dataset item or question the task came from
    pub source_id: String,
    pub content: String,
    pub direction: Direction,
    pub kind: String,
}

/// Every sentence test one pass dispatches: each dataset item forward
/// (plus reversed when `bidirectional`), then each question.
pub fn plan_sentence_tasks(problem: &StructuredProblem, bidirectional: bool) -> Vec<SentenceTask> {
    let mut tasks = Vec::with_capacity(problem.dataset.len() * 2 + problem.questions.len());

    for item in &problem.dataset {
        let Some((from, source)) = item.source() else {
            tracing::warn!(item = %item.id, "dataset item has no text to translate");
            continue;
        };
        let target = item.target();
        let to = target.map(|(name, _)| name).unwrap_or("translation");

        tasks.push(SentenceTask {
            id: item.id.clone(),
            source_id: item.id.clone(),
            content: source.to_string(),
            direction: Direction::Forward,
            kind: format!("{} to {}", from, to),
        });

        if bidirectional {
            if let Some((to, text)) = target {
                tasks.push(SentenceTask {
                    id: format!("{}:reverse", item.id),
                    source_id: item.id.clone(),
                    content: text.to_string(),
                    direction: Direction::Reverse,
                    kind: format!("{} to {}", to, from),
                });
            }
        }
    }

    for question in &problem.questions {
        tasks.push(SentenceTask {
            id: question.id.clone(),
            source_id: question.id.clone(),
            content: question.input.clone(),
            direction: Direction::Question,
            kind: question.kind.clone(),
        });
    }

    tasks
}
