use super::{apply_vocabulary, in_step, normalize_rules, RulesReply};
use crate::agents::{steps, HYPOTHESIS_EXTRACTOR, INITIAL_HYPOTHESIZER};
use crate::context::RunContext;
use crate::problem::{Rule, StructuredProblem};
use crate::prompts;
use crate::two_phase::{reason_then_extract, TwoPhase};
use rosetta_error::{Error, ErrorKind, Result};
use rosetta_llm::ReasoningModel;

const PHASE: TwoPhase = TwoPhase {
    reasoning_agent: INITIAL_HYPOTHESIZER,
    extraction_agent: HYPOTHESIS_EXTRACTOR,
    failure: ErrorKind::HypothesisFailed,
};

/// First rule set for the problem; seeds the run's vocabulary.
pub async fn initial_hypothesis<M: ReasoningModel>(
    model: &M,
    ctx: &RunContext,
    problem: &StructuredProblem,
) -> Result<Vec<Rule>> {
    in_step(ctx, steps::HYPOTHESIZE, async {
        let reply = reason_then_extract::<_, RulesReply>(model, ctx, PHASE, prompts::hypothesis(problem))
            .await?
            .value;

        let rules = normalize_rules(reply.rules);
        if rules.is_empty() {
            return Err(Error::hypothesis_failed("no rules could be identified")
                .with_operation("steps::initial_hypothesis")
                .with_context("phase", "extraction"));
        }

        apply_vocabulary(ctx, steps::HYPOTHESIZE, &reply.vocabulary);
        tracing::info!(rules = rules.len(), vocabulary = ctx.vocabulary().len(), "initial hypothesis");
        ctx.log().json("Initial rules", &rules);
        Ok(rules)
    })
    .await
}
