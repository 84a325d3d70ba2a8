//! Reason-then-extract: an unconstrained reasoning call followed by a
//! separate structured extraction of its result.
//!
//! The two phases fail independently. A reasoning failure becomes the
//! step's own failure kind; an extraction reply that does not fit the
//! schema stays `SchemaInvalid`. Both carry a `phase` context entry.

use crate::context::RunContext;
use crate::events::EventKind;
use crate::prompts;
use rosetta_error::{Error, ErrorKind, Result};
use rosetta_llm::{parse_structured, GenerateRequest, ReasoningModel};
use serde::de::DeserializeOwned;

/// Which agents run the two phases and how their failures are named
#[derive(Debug, Clone, Copy)]
pub struct TwoPhase {
    pub reasoning_agent: &'static str,
    pub extraction_agent: &'static str,
    /// Failure kind for the enclosing step, e.g. `HypothesisFailed`
    pub failure: ErrorKind,
}

/// Output of both phases
#[derive(Debug, Clone)]
pub struct Reasoned<T> {
    pub reasoning: String,
    pub value: T,
}

fn step_failure(phase: &TwoPhase, phase_name: &'static str, err: Error) -> Error {
    match err.kind() {
        ErrorKind::Cancelled | ErrorKind::SchemaInvalid => err.with_context("phase", phase_name),
        _ => Error::new(
            phase.failure,
            format!("{} phase failed: {}", phase_name, err.message()),
        )
        .with_operation("two_phase::reason_then_extract")
        .with_context("phase", phase_name)
        .with_context("cause", err.kind().as_str())
        .set_source(err),
    }
}

pub async fn reason_then_extract<M, T>(
    model: &M,
    ctx: &RunContext,
    phase: TwoPhase,
    reasoning_prompt: String,
) -> Result<Reasoned<T>>
where
    M: ReasoningModel,
    T: DeserializeOwned,
{
    let request =
        GenerateRequest::text(phase.reasoning_agent, reasoning_prompt).with_system(prompts::SOLVER_SYSTEM);
    tracing::debug!(agent = phase.reasoning_agent, "reasoning phase");
    let reasoning = ctx
        .cancellable(model.generate(request))
        .await
        .map_err(|e| step_failure(&phase, "reasoning", e))?
        .text;

    if reasoning.trim().is_empty() {
        return Err(Error::new(phase.failure, "reasoning phase produced no usable text")
            .with_operation("two_phase::reason_then_extract")
            .with_context("phase", "reasoning"));
    }

    ctx.emit(EventKind::AgentReasoning {
        agent_id: phase.reasoning_agent.to_string(),
        text: reasoning.clone(),
    });
    ctx.log()
        .section(&format!("{} reasoning", phase.reasoning_agent), &reasoning);

    let request = GenerateRequest::json(phase.extraction_agent, prompts::rules_extraction(&reasoning))
        .with_system(prompts::EXTRACTOR_SYSTEM);
    tracing::debug!(
        agent = phase.extraction_agent,
        reasoning_chars = reasoning.len(),
        "extraction phase"
    );
    let generation = ctx
        .cancellable(model.generate(request))
        .await
        .map_err(|e| step_failure(&phase, "extraction", e))?;

    let value = parse_structured(&generation).map_err(|e| step_failure(&phase, "extraction", e))?;

    Ok(Reasoned { reasoning, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use rosetta_llm::Generation;
    use serde::Deserialize;
    use std::sync::{Arc, Mutex};

    /// Replies to each agent from a queue
    struct Script {
        replies: Mutex<Vec<(&'static str, Result<Generation>)>>,
    }

    impl Script {
        fn new(replies: Vec<(&'static str, Result<Generation>)>) -> Self {
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    impl ReasoningModel for Script {
        async fn generate(&self, request: GenerateRequest) -> Result<Generation> {
            let mut replies = self.replies.lock().unwrap();
            let pos = replies
                .iter()
                .position(|(agent, _)| *agent == request.agent)
                .expect("unscripted agent");
            replies.remove(pos).1
        }
    }

    #[derive(Debug, Deserialize)]
    struct Titles {
        rules: Vec<String>,
    }

    const PHASE: TwoPhase = TwoPhase {
        reasoning_agent: "thinker",
        extraction_agent: "extractor",
        failure: ErrorKind::HypothesisFailed,
    };

    #[tokio::test]
    async fn test_both_phases_succeed() {
        let model = Script::new(vec![
            ("thinker", Ok(Generation::from_text("suffix -mu marks 1sg"))),
            (
                "extractor",
                Ok(Generation::from_object(serde_json::json!({"rules": ["1sg suffix"]}))),
            ),
        ]);
        let sink = Arc::new(MemorySink::new());
        let ctx = RunContext::new().with_sink(sink.clone());

        let out: Reasoned<Titles> = reason_then_extract(&model, &ctx, PHASE, "p".into())
            .await
            .unwrap();
        assert_eq!(out.value.rules, vec!["1sg suffix"]);
        assert!(out.reasoning.contains("-mu"));
        assert!(matches!(
            sink.kinds()[0],
            EventKind::AgentReasoning { ref agent_id, .. } if agent_id == "thinker"
        ));
    }

    #[tokio::test]
    async fn test_reasoning_failure_takes_step_kind() {
        let model = Script::new(vec![("thinker", Err(Error::network_failed("reset").persist()))]);
        let ctx = RunContext::new();

        let err = reason_then_extract::<_, Titles>(&model, &ctx, PHASE, "p".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HypothesisFailed);
        assert!(err.context().iter().any(|(k, v)| *k == "phase" && v == "reasoning"));
    }

    #[tokio::test]
    async fn test_blank_reasoning_fails() {
        let model = Script::new(vec![("thinker", Ok(Generation::from_text("  \n")))]);
        let ctx = RunContext::new();

        let err = reason_then_extract::<_, Titles>(&model, &ctx, PHASE, "p".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HypothesisFailed);
    }

    #[tokio::test]
    async fn test_extraction_schema_failure_is_distinct() {
        let model = Script::new(vec![
            ("thinker", Ok(Generation::from_text("rules..."))),
            (
                "extractor",
                Ok(Generation::from_object(serde_json::json!({"rulez": []}))),
            ),
        ]);
        let ctx = RunContext::new();

        let err = reason_then_extract::<_, Titles>(&model, &ctx, PHASE, "p".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaInvalid);
        assert!(err.context().iter().any(|(k, v)| *k == "phase" && v == "extraction"));
    }
}
