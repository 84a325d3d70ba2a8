//! The single entry point: raw problem text in, answers or a failure out.

use crate::config::WorkflowConfig;
use crate::context::{RunContext, RunOptions};
use crate::events::EventKind;
use crate::iterate::{run_loop, LoopOutcome, LoopPhase, LoopState, LoopSteps};
use crate::log::StepTiming;
use crate::problem::{Answer, Rule, VocabularyEntry};
use crate::steps::{answer_questions, extract_problem, improve_rules, initial_hypothesis};
use crate::verdict::VerifierFeedback;
use crate::verify::{verify, VerifyOptions};
use rosetta_error::{Error, ErrorKind, Result};
use rosetta_llm::ReasoningModel;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extraction,
    Hypothesis,
    Verification,
    Improvement,
    Answering,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Hypothesis => "hypothesis",
            Stage::Verification => "verification",
            Stage::Improvement => "improvement",
            Stage::Answering => "answering",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run that bailed. The step's own explanation is kept verbatim.
#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: Error,
}

impl PipelineFailure {
    pub fn is_cancelled(&self) -> bool {
        self.error.kind() == ErrorKind::Cancelled
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cancelled() {
            write!(f, "run cancelled during {}", self.stage)
        } else {
            write!(f, "{} failed: {}", self.stage, self.error.message())
        }
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub answers: Vec<Answer>,
    pub rules: Vec<Rule>,
    pub vocabulary: Vec<VocabularyEntry>,
    pub final_feedback: Option<VerifierFeedback>,
    /// Improvements applied by the loop
    pub iterations: u32,
    pub outcome: LoopOutcome,
    pub timings: Vec<StepTiming>,
}

/// Extractor, initial hypothesis, verify-improve loop, answerer
pub struct Pipeline<M> {
    model: M,
    config: WorkflowConfig,
}

impl<M: ReasoningModel> Pipeline<M> {
    pub fn new(model: M, config: WorkflowConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn verify_options(&self, options: &RunOptions) -> VerifyOptions {
        VerifyOptions {
            concurrency: self.config.workflow.concurrency,
            leaf_retries: self.config.workflow.leaf_retries,
            bidirectional: options
                .bidirectional
                .unwrap_or(self.config.workflow.bidirectional),
            policy: self.config.aggregation_policy(),
        }
    }

    pub async fn run(
        &self,
        ctx: &RunContext,
        text: &str,
        options: RunOptions,
    ) -> std::result::Result<PipelineOutput, PipelineFailure> {
        tracing::info!(run_id = %ctx.run_id(), chars = text.len(), "pipeline started");
        ctx.log().section("Problem text", text);

        let span = tracing::info_span!("run", run_id = %ctx.run_id());
        let result = self.run_stages(ctx, text, &options).instrument(span).await;

        let outcome = match &result {
            Ok(output) => output.outcome.as_str().to_string(),
            Err(failure) if failure.is_cancelled() => "cancelled".to_string(),
            Err(failure) => format!("failed: {}", failure.stage),
        };
        match &result {
            Ok(output) => tracing::info!(
                run_id = %ctx.run_id(),
                outcome = %outcome,
                answers = output.answers.len(),
                "pipeline finished"
            ),
            Err(failure) => tracing::error!(
                run_id = %ctx.run_id(),
                stage = failure.stage.as_str(),
                error = %failure.error,
                "pipeline failed"
            ),
        }
        ctx.emit(EventKind::RunFinished { outcome });
        ctx.log().timing_summary(ctx.timings());
        result
    }

    async fn run_stages(
        &self,
        ctx: &RunContext,
        text: &str,
        options: &RunOptions,
    ) -> std::result::Result<PipelineOutput, PipelineFailure> {
        let bail = |stage: Stage| move |error: Error| PipelineFailure { stage, error };

        let problem = extract_problem(&self.model, ctx, text)
            .await
            .map_err(bail(Stage::Extraction))?;
        let problem = Arc::new(problem);

        let rules = initial_hypothesis(&self.model, ctx, &problem)
            .await
            .map_err(bail(Stage::Hypothesis))?;

        let loop_steps = ModelSteps {
            model: &self.model,
            ctx,
            options: self.verify_options(options),
            stage: Mutex::new(Stage::Verification),
        };
        let max_iterations = options
            .max_iterations
            .unwrap_or(self.config.workflow.max_iterations);
        let initial = LoopState::new(problem.clone(), rules);
        let report = run_loop(&loop_steps, ctx, initial, max_iterations)
            .await
            .map_err(|error| PipelineFailure {
                stage: loop_steps.current_stage(),
                error,
            })?;

        let answers = answer_questions(&self.model, ctx, &problem, &report.state.rules)
            .await
            .map_err(bail(Stage::Answering))?;

        Ok(PipelineOutput {
            answers,
            vocabulary: ctx.vocabulary().get(),
            final_feedback: report.state.test_results,
            iterations: report.state.iteration_count,
            rules: report.state.rules,
            outcome: report.outcome,
            timings: ctx.timings().snapshot(),
        })
    }
}

/// Loop bodies backed by the model; remembers which phase the loop last
/// entered so a loop failure can name its stage.
struct ModelSteps<'a, M> {
    model: &'a M,
    ctx: &'a RunContext,
    options: VerifyOptions,
    stage: Mutex<Stage>,
}

impl<M> ModelSteps<'_, M> {
    fn current_stage(&self) -> Stage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: ReasoningModel> LoopSteps for ModelSteps<'_, M> {
    fn entering(&self, phase: LoopPhase) {
        let stage = match phase {
            LoopPhase::Improving => Stage::Improvement,
            LoopPhase::Verifying | LoopPhase::Done(_) => Stage::Verification,
        };
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner) = stage;
    }

    async fn verify(&self, state: &LoopState) -> Result<VerifierFeedback> {
        verify(self.model, self.ctx, &state.problem, &state.rules, &self.options).await
    }

    async fn improve(&self, state: &LoopState, feedback: &VerifierFeedback) -> Result<Vec<Rule>> {
        improve_rules(self.model, self.ctx, &state.problem, &state.rules, feedback)
            .await
            .map_err(|e| e.with_context("iteration", state.iteration_count.to_string()))
    }
}
