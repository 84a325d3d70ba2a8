use super::{in_step, step_error};
use crate::agents::{steps, STRUCTURED_PROBLEM_EXTRACTOR};
use crate::context::RunContext;
use crate::problem::StructuredProblem;
use crate::prompts;
use rosetta_error::{Error, ErrorKind, Result};
use rosetta_llm::{parse_structured, GenerateRequest, ReasoningModel};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionReply {
    pub success: bool,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub problem: Option<StructuredProblem>,
}

/// Turn raw problem text into a `StructuredProblem`, or fail the run.
pub async fn extract_problem<M: ReasoningModel>(
    model: &M,
    ctx: &RunContext,
    raw: &str,
) -> Result<StructuredProblem> {
    in_step(ctx, steps::EXTRACT, async {
        if raw.trim().is_empty() {
            return Err(Error::extraction_failed("problem text is empty")
                .with_operation("steps::extract_problem"));
        }

        let request = GenerateRequest::json(STRUCTURED_PROBLEM_EXTRACTOR, prompts::extraction(raw))
            .with_system(prompts::EXTRACTOR_SYSTEM);
        let generation = ctx
            .cancellable(model.generate(request))
            .await
            .map_err(|e| step_error(ErrorKind::ExtractionFailed, "steps::extract_problem", e))?;
        let reply: ExtractionReply = parse_structured(&generation)?;

        let problem = accept(reply)?;
        tracing::info!(
            items = problem.dataset.len(),
            questions = problem.questions.len(),
            "problem extracted"
        );
        ctx.log().json("Structured problem", &problem);
        Ok(problem)
    })
    .await
}

fn accept(reply: ExtractionReply) -> Result<StructuredProblem> {
    let fail = |reason: String| {
        Err(Error::extraction_failed(reason).with_operation("steps::extract_problem"))
    };

    if !reply.success {
        let explanation = if reply.explanation.trim().is_empty() {
            "extractor could not identify a dataset".to_string()
        } else {
            reply.explanation
        };
        return fail(explanation);
    }
    let Some(problem) = reply.problem else {
        return fail("extractor reported success without a problem".into());
    };
    if problem.dataset.is_empty() {
        return fail("no paired examples found".into());
    }
    if problem.questions.is_empty() {
        return fail("no questions found".into());
    }
    if let Some(item) = problem.dataset.iter().find(|item| item.target().is_none()) {
        return fail(format!("dataset item {} is not a translation pair", item.id));
    }
    if let Some(id) = problem.duplicate_id() {
        return fail(format!("id {} is used more than once", id));
    }
    Ok(problem)
}
