use crate::agents::RULE_TESTER;
use crate::context::VerificationContext;
use crate::problem::Rule;
use crate::prompts;
use crate::verdict::RuleVerdict;
use rosetta_error::Result;
use rosetta_llm::{parse_structured, GenerateRequest, ReasoningModel};

/// Test one rule against every dataset item it claims to cover.
pub async fn test_rule<M: ReasoningModel>(
    model: &M,
    view: &VerificationContext<'_>,
    rule: &Rule,
) -> Result<RuleVerdict> {
    let prompt = prompts::rule_test(rule, view.rules, view.problem, &view.vocabulary);
    let request = GenerateRequest::json(RULE_TESTER, prompt).with_system(prompts::VERIFIER_SYSTEM);
    let generation = model.generate(request).await?;
    parse_structured(&generation).map_err(|e| e.with_context("rule", rule.title.clone()))
}
