use super::{apply_vocabulary, in_step, normalize_rules, RulesReply};
use crate::agents::{steps, IMPROVEMENT_EXTRACTOR, RULES_IMPROVER};
use crate::context::RunContext;
use crate::problem::{Rule, StructuredProblem};
use crate::prompts;
use crate::two_phase::{reason_then_extract, TwoPhase};
use crate::verdict::VerifierFeedback;
use rosetta_error::{Error, ErrorKind, Result};
use rosetta_llm::ReasoningModel;

const PHASE: TwoPhase = TwoPhase {
    reasoning_agent: RULES_IMPROVER,
    extraction_agent: IMPROVEMENT_EXTRACTOR,
    failure: ErrorKind::ImprovementFailed,
};

/// Revised rule set addressing `feedback`. Replaces the old set wholesale.
pub async fn improve_rules<M: ReasoningModel>(
    model: &M,
    ctx: &RunContext,
    problem: &StructuredProblem,
    rules: &[Rule],
    feedback: &VerifierFeedback,
) -> Result<Vec<Rule>> {
    in_step(ctx, steps::IMPROVE, async {
        let vocabulary = ctx.vocabulary().get();
        let prompt = prompts::improvement(problem, rules, &vocabulary, feedback);
        let reply = reason_then_extract::<_, RulesReply>(model, ctx, PHASE, prompt)
            .await?
            .value;

        let revised = normalize_rules(reply.rules);
        if revised.is_empty() {
            return Err(Error::improvement_failed("improver returned no rules")
                .with_operation("steps::improve_rules")
                .with_context("phase", "extraction"));
        }

        apply_vocabulary(ctx, steps::IMPROVE, &reply.vocabulary);
        tracing::info!(before = rules.len(), after = revised.len(), "rules revised");
        ctx.log().json("Revised rules", &revised);
        Ok(revised)
    })
    .await
}
