use super::SentenceTask;
use crate::agents::SENTENCE_TESTER;
use crate::context::VerificationContext;
use crate::prompts;
use crate::verdict::SentenceVerdict;
use rosetta_error::Result;
use rosetta_llm::{parse_structured, GenerateRequest, ReasoningModel};

/// Translate one sentence blind, from the rules and vocabulary alone.
pub async fn test_sentence<M: ReasoningModel>(
    model: &M,
    view: &VerificationContext<'_>,
    task: &SentenceTask,
) -> Result<SentenceVerdict> {
    let prompt = prompts::sentence_test(task, &view.problem.context, view.rules, &view.vocabulary);
    let request =
        GenerateRequest::json(SENTENCE_TESTER, prompt).with_system(prompts::VERIFIER_SYSTEM);
    let generation = model.generate(request).await?;

    let verdict: SentenceVerdict = parse_structured(&generation)?;
    verdict
        .validate()
        .map_err(|e| e.with_context("sentence", task.id.clone()))?;
    Ok(verdict)
}
