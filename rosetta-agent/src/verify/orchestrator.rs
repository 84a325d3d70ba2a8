//! Fan-out of one verification pass.
//!
//! Every rule and every sentence task is dispatched as an independent job.
//! A semaphore caps the jobs in flight; `join_all` waits for all of them to
//! settle and hands results back in dispatch order. A job that still fails
//! after its retries becomes a `FailedTest` note, never a pass failure. Only
//! cancellation aborts the pass.

use super::aggregate::{aggregate, AggregationPolicy, PassResults, RuleCheck, SentenceCheck};
use super::{plan_sentence_tasks, test_rule, test_sentence, SentenceTask};
use crate::agents::{steps, RULE_TESTER, SENTENCE_TESTER, VERIFIER_ORCHESTRATOR};
use crate::context::{RunContext, VerificationContext};
use crate::events::EventKind;
use crate::problem::{Rule, StructuredProblem};
use crate::steps::in_step;
use crate::verdict::{FailedTest, RuleVerdict, SentenceVerdict, TestTarget, VerifierFeedback};
use futures_util::future::join_all;
use rosetta_error::{Error, ErrorKind, Result};
use rosetta_llm::ReasoningModel;
use serde_json::json;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Leaf calls in flight at once
    pub concurrency: usize,
    /// Extra attempts for a leaf call that errors
    pub leaf_retries: u32,
    pub bidirectional: bool,
    pub policy: AggregationPolicy,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            leaf_retries: 1,
            bidirectional: false,
            policy: AggregationPolicy::default(),
        }
    }
}

enum Job<'a> {
    Rule(&'a Rule),
    Sentence(SentenceTask),
}

enum Settled {
    Rule(String, Result<RuleVerdict>),
    Sentence(String, Result<SentenceVerdict>),
}

/// Test every rule and every sentence, then aggregate one report.
pub async fn verify<M: ReasoningModel>(
    model: &M,
    ctx: &RunContext,
    problem: &StructuredProblem,
    rules: &[Rule],
    options: &VerifyOptions,
) -> Result<VerifierFeedback> {
    in_step(ctx, steps::VERIFY, async {
        ctx.check_cancelled()?;
        let view = ctx.verification(problem, rules);

        let mut jobs: Vec<Job<'_>> = rules.iter().map(Job::Rule).collect();
        jobs.extend(
            plan_sentence_tasks(problem, options.bidirectional)
                .into_iter()
                .map(Job::Sentence),
        );
        tracing::info!(
            rules = rules.len(),
            sentences = jobs.len() - rules.len(),
            concurrency = options.concurrency,
            "verification pass dispatched"
        );

        let permits = Semaphore::new(options.concurrency.max(1));
        let pending = jobs.iter().map(|job| {
            let permits = &permits;
            let view = &view;
            async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|_| Error::unexpected("verifier pool closed"))?;
                Ok::<_, Error>(run_job(model, ctx, view, job, options.leaf_retries).await)
            }
        });
        let settled = ctx
            .cancellable(async {
                join_all(pending)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>>>()
            })
            .await?;
        // a pass that settled as the run was cancelled is discarded
        ctx.check_cancelled()?;

        let results = collect(settled)?;
        let feedback = aggregate(&results, &options.policy);
        tracing::info!(
            conclusion = %feedback.conclusion,
            errant_rules = feedback.errant_rules.len(),
            errant_sentences = feedback.errant_sentences.len(),
            failed_tests = feedback.failed_tests.len(),
            "verification pass aggregated"
        );
        ctx.log().json("Verifier feedback", &feedback);
        Ok(feedback)
    })
    .await
}

/// Call one leaf until it yields a verdict, retries run out, or the run is
/// cancelled. Giving up yields `VerificationFailed` with the last cause.
async fn retry_leaf<T, F, Fut>(
    ctx: &RunContext,
    leaf_retries: u32,
    target: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(verdict) => return Ok(verdict),
            Err(e) if e.kind() == ErrorKind::Cancelled || ctx.is_cancelled() => {
                return Err(Error::cancelled());
            }
            Err(e) if attempt < leaf_retries => {
                attempt += 1;
                tracing::warn!(target_id = target, attempt, error = %e, "leaf verifier failed, retrying");
            }
            Err(e) => {
                return Err(Error::verification_failed(target, e.message())
                    .with_operation("verify::orchestrator")
                    .with_context("cause", e.kind().as_str())
                    .set_source(e));
            }
        }
    }
}

async fn run_job<M: ReasoningModel>(
    model: &M,
    ctx: &RunContext,
    view: &VerificationContext<'_>,
    job: &Job<'_>,
    leaf_retries: u32,
) -> Settled {
    match job {
        Job::Rule(rule) => {
            let rule: &Rule = rule;
            let result =
                retry_leaf(ctx, leaf_retries, &rule.title, move || test_rule(model, view, rule))
                    .await;
            ctx.emit(EventKind::ToolCall {
                agent_id: VERIFIER_ORCHESTRATOR.to_string(),
                tool: RULE_TESTER.to_string(),
                input: json!({ "title": rule.title, "description": rule.description }),
                output: tool_output(&result),
                success: result.is_ok(),
            });
            Settled::Rule(rule.title.clone(), result)
        }
        Job::Sentence(task) => {
            let result =
                retry_leaf(ctx, leaf_retries, &task.id, move || test_sentence(model, view, task))
                    .await;
            ctx.emit(EventKind::ToolCall {
                agent_id: VERIFIER_ORCHESTRATOR.to_string(),
                tool: SENTENCE_TESTER.to_string(),
                input: json!({
                    "id": task.id,
                    "content": task.content,
                    "direction": task.direction,
                }),
                output: tool_output(&result),
                success: result.is_ok(),
            });
            Settled::Sentence(task.id.clone(), result)
        }
    }
}

fn tool_output<T: serde::Serialize>(result: &Result<T>) -> serde_json::Value {
    match result {
        Ok(verdict) => serde_json::to_value(verdict).unwrap_or_default(),
        Err(e) => json!({ "error": e.message(), "kind": e.kind().as_str() }),
    }
}

fn failed_test(target: TestTarget, id: String, err: &Error) -> FailedTest {
    let kind = err
        .context()
        .iter()
        .find(|(k, _)| *k == "cause")
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| err.kind().as_str().to_string());
    tracing::warn!(target_id = %id, cause = %kind, error = %err, "leaf verifier gave up");
    FailedTest {
        target,
        id,
        kind,
        message: err.message().to_string(),
    }
}

fn collect(settled: Vec<Settled>) -> Result<PassResults> {
    let mut results = PassResults::default();
    for outcome in settled {
        match outcome {
            Settled::Rule(_, Err(e)) | Settled::Sentence(_, Err(e))
                if e.kind() == ErrorKind::Cancelled =>
            {
                return Err(e.with_operation("verify::orchestrator"));
            }
            Settled::Rule(title, Ok(verdict)) => results.rules.push(RuleCheck { title, verdict }),
            Settled::Rule(title, Err(e)) => {
                results.failed_tests.push(failed_test(TestTarget::Rule, title, &e))
            }
            Settled::Sentence(id, Ok(verdict)) => {
                results.sentences.push(SentenceCheck { id, verdict })
            }
            Settled::Sentence(id, Err(e)) => {
                results.failed_tests.push(failed_test(TestTarget::Sentence, id, &e))
            }
        }
    }
    Ok(results)
}
