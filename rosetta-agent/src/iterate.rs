//! The verify-improve loop as an explicit state machine.
//!
//! `next_phase` is the whole exit policy and is pure. `run_loop` only
//! threads a `LoopState` through the phases it picks, rebuilding the state
//! by value on every transition.

use crate::agents::steps::IMPROVE;
use crate::context::RunContext;
use crate::events::EventKind;
use crate::problem::{Rule, StructuredProblem, VocabularyEntry};
use crate::steps::restore_vocabulary;
use crate::verdict::{Conclusion, VerifierFeedback};
use rosetta_error::{Error, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopOutcome {
    /// A pass came back ALL_PASS
    Converged,
    /// The iteration cap was reached with issues left; best effort
    Degraded,
}

impl LoopOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopOutcome::Converged => "converged",
            LoopOutcome::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Verifying,
    Improving,
    Done(LoopOutcome),
}

#[derive(Debug, Clone)]
pub struct LoopState {
    pub problem: Arc<StructuredProblem>,
    pub rules: Vec<Rule>,
    /// Feedback from the most recent pass over `rules`
    pub test_results: Option<VerifierFeedback>,
    /// Vocabulary that pass ran against
    pub vocabulary: Vec<VocabularyEntry>,
    /// Improvements applied so far
    pub iteration_count: u32,
}

impl LoopState {
    pub fn new(problem: Arc<StructuredProblem>, rules: Vec<Rule>) -> Self {
        Self {
            problem,
            rules,
            test_results: None,
            vocabulary: Vec::new(),
            iteration_count: 0,
        }
    }
}

/// Where the loop goes after a pass produced `feedback`
pub fn next_phase(
    state: &LoopState,
    feedback: &VerifierFeedback,
    max_iterations: u32,
) -> LoopPhase {
    if feedback.all_pass() {
        LoopPhase::Done(LoopOutcome::Converged)
    } else if state.iteration_count < max_iterations {
        LoopPhase::Improving
    } else {
        LoopPhase::Done(LoopOutcome::Degraded)
    }
}

/// The two loop bodies
#[allow(async_fn_in_trait)]
pub trait LoopSteps {
    /// Called as the loop enters `phase`, before its cancellation check.
    fn entering(&self, _phase: LoopPhase) {}

    async fn verify(&self, state: &LoopState) -> Result<VerifierFeedback>;

    async fn improve(&self, state: &LoopState, feedback: &VerifierFeedback) -> Result<Vec<Rule>>;
}

#[derive(Debug, Clone)]
pub struct LoopReport {
    /// Final state. On a degraded exit it carries the best rule set seen.
    pub state: LoopState,
    pub outcome: LoopOutcome,
    /// Verification passes run
    pub passes: u32,
}

impl LoopReport {
    pub fn final_feedback(&self) -> Option<&VerifierFeedback> {
        self.state.test_results.as_ref()
    }
}

/// Lower is better
fn score(feedback: &VerifierFeedback) -> (u8, usize) {
    let severity = match feedback.conclusion {
        Conclusion::AllPass => 0,
        Conclusion::NeedsImprovement => 1,
        Conclusion::MajorIssues => 2,
    };
    let failures = feedback.errant_rules.len()
        + feedback.errant_sentences.len()
        + feedback.failed_tests.len();
    (severity, failures)
}

pub async fn run_loop<S: LoopSteps>(
    steps: &S,
    ctx: &RunContext,
    initial: LoopState,
    max_iterations: u32,
) -> Result<LoopReport> {
    let mut state = initial;
    let mut phase = LoopPhase::Verifying;
    let mut passes = 0;
    let mut best: Option<LoopState> = None;

    loop {
        match phase {
            LoopPhase::Verifying => {
                steps.entering(phase);
                ctx.check_cancelled()?;
                let feedback = steps.verify(&state).await?;
                passes += 1;
                phase = next_phase(&state, &feedback, max_iterations);

                tracing::info!(
                    iteration = state.iteration_count,
                    conclusion = %feedback.conclusion,
                    "verification pass finished"
                );
                ctx.emit(EventKind::IterationUpdate {
                    iteration: state.iteration_count,
                    max_iterations,
                    conclusion: feedback.conclusion.as_str().to_string(),
                });

                state = LoopState {
                    test_results: Some(feedback),
                    vocabulary: ctx.vocabulary().get(),
                    ..state
                };
                let better = match (&best, &state.test_results) {
                    (Some(b), Some(f)) => b
                        .test_results
                        .as_ref()
                        .map_or(true, |bf| score(f) <= score(bf)),
                    _ => true,
                };
                if better {
                    best = Some(state.clone());
                }
            }
            LoopPhase::Improving => {
                steps.entering(phase);
                ctx.check_cancelled()?;
                let feedback = state.test_results.clone().ok_or_else(|| {
                    Error::unexpected("improving without verifier feedback")
                        .with_operation("iterate::run_loop")
                })?;
                let rules = steps.improve(&state, &feedback).await?;
                state = LoopState {
                    problem: state.problem,
                    rules,
                    test_results: Some(feedback),
                    vocabulary: Vec::new(),
                    iteration_count: state.iteration_count + 1,
                };
                phase = LoopPhase::Verifying;
            }
            LoopPhase::Done(outcome) => {
                let state = match (outcome, best) {
                    (LoopOutcome::Degraded, Some(best)) => {
                        // the best rules are answered with the vocabulary they were verified with
                        if ctx.vocabulary().get() != best.vocabulary {
                            restore_vocabulary(ctx, IMPROVE, &best.vocabulary);
                        }
                        LoopState {
                            iteration_count: state.iteration_count,
                            ..best
                        }
                    }
                    _ => state,
                };
                tracing::info!(
                    outcome = outcome.as_str(),
                    iterations = state.iteration_count,
                    passes,
                    "verify-improve loop finished"
                );
                return Ok(LoopReport {
                    state,
                    outcome,
                    passes,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::{aggregate, AggregationPolicy, PassResults, RuleCheck};
    use crate::verdict::{RuleStatus, RuleVerdict};
    use crate::vocabulary::VocabularyStore;
    use rosetta_error::ErrorKind;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn feedback(failing: usize) -> VerifierFeedback {
        let rules = (0..4)
            .map(|i| RuleCheck {
                title: format!("rule {}", i),
                verdict: if i < failing {
                    RuleVerdict::failing(RuleStatus::Wrong, "no", "fix it")
                } else {
                    RuleVerdict::ok("yes")
                },
            })
            .collect();
        aggregate(
            &PassResults {
                rules,
                ..Default::default()
            },
            &AggregationPolicy::default(),
        )
    }

    fn state() -> LoopState {
        let problem = StructuredProblem {
            context: String::new(),
            dataset: vec![],
            questions: vec![],
        };
        LoopState::new(Arc::new(problem), vec![Rule::new("r", "d")])
    }

    /// Pops one scripted failing-rule count per pass; improvements can fail
    /// on a given iteration.
    struct Scripted {
        passes: Mutex<Vec<usize>>,
        fail_improvement_at: Option<u32>,
        improvements: Mutex<u32>,
        /// Each improvement adds an entry here, as the real improver would
        vocabulary: Option<VocabularyStore>,
        /// Fired as soon as the first pass returns
        cancel_after_verify: Option<CancellationToken>,
        phases: Mutex<Vec<LoopPhase>>,
    }

    impl Scripted {
        fn new(passes: Vec<usize>) -> Self {
            Self {
                passes: Mutex::new(passes),
                fail_improvement_at: None,
                improvements: Mutex::new(0),
                vocabulary: None,
                cancel_after_verify: None,
                phases: Mutex::new(Vec::new()),
            }
        }
    }

    impl LoopSteps for Scripted {
        fn entering(&self, phase: LoopPhase) {
            self.phases.lock().unwrap().push(phase);
        }

        async fn verify(&self, _state: &LoopState) -> Result<VerifierFeedback> {
            if let Some(token) = &self.cancel_after_verify {
                token.cancel();
            }
            let mut passes = self.passes.lock().unwrap();
            let failing = if passes.len() > 1 { passes.remove(0) } else { passes[0] };
            Ok(feedback(failing))
        }

        async fn improve(
            &self,
            state: &LoopState,
            _feedback: &VerifierFeedback,
        ) -> Result<Vec<Rule>> {
            *self.improvements.lock().unwrap() += 1;
            if self.fail_improvement_at == Some(state.iteration_count) {
                return Err(Error::improvement_failed("extractor found no rules"));
            }
            if let Some(store) = &self.vocabulary {
                let form = format!("w{}", state.iteration_count + 1);
                store.add(&[VocabularyEntry::new(form, "guess", "noun")]);
            }
            Ok(vec![Rule::new(
                format!("r{}", state.iteration_count + 1),
                "revised",
            )])
        }
    }

    #[test]
    fn test_next_phase() {
        let mut s = state();
        assert_eq!(
            next_phase(&s, &feedback(0), 4),
            LoopPhase::Done(LoopOutcome::Converged)
        );
        assert_eq!(next_phase(&s, &feedback(1), 4), LoopPhase::Improving);

        s.iteration_count = 4;
        assert_eq!(
            next_phase(&s, &feedback(1), 4),
            LoopPhase::Done(LoopOutcome::Degraded)
        );
        assert_eq!(
            next_phase(&s, &feedback(0), 4),
            LoopPhase::Done(LoopOutcome::Converged)
        );
    }

    #[tokio::test]
    async fn test_converges_without_improving() {
        let steps = Scripted::new(vec![0]);
        let report = run_loop(&steps, &RunContext::new(), state(), 4).await.unwrap();

        assert_eq!(report.outcome, LoopOutcome::Converged);
        assert_eq!(report.passes, 1);
        assert_eq!(report.state.iteration_count, 0);
        assert_eq!(*steps.improvements.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_converges_after_improving() {
        let steps = Scripted::new(vec![2, 1, 0]);
        let report = run_loop(&steps, &RunContext::new(), state(), 4).await.unwrap();

        assert_eq!(report.outcome, LoopOutcome::Converged);
        assert_eq!(report.passes, 3);
        assert_eq!(report.state.iteration_count, 2);
        assert_eq!(report.state.rules[0].title, "r2");
    }

    #[tokio::test]
    async fn test_degrades_at_cap_with_best_rules() {
        let steps = Scripted::new(vec![1, 3, 3, 3, 3]);
        let report = run_loop(&steps, &RunContext::new(), state(), 4).await.unwrap();

        assert_eq!(report.outcome, LoopOutcome::Degraded);
        assert_eq!(report.passes, 5);
        assert_eq!(report.state.iteration_count, 4);
        // the first pass had the fewest failures
        assert_eq!(report.state.rules[0].title, "r");
        assert_eq!(report.final_feedback().unwrap().errant_rules.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_iterations_runs_one_pass() {
        let steps = Scripted::new(vec![2]);
        let report = run_loop(&steps, &RunContext::new(), state(), 0).await.unwrap();
        assert_eq!(report.outcome, LoopOutcome::Degraded);
        assert_eq!(report.passes, 1);
    }

    #[tokio::test]
    async fn test_improvement_failure_ends_loop() {
        let mut steps = Scripted::new(vec![1]);
        steps.fail_improvement_at = Some(1);
        let err = run_loop(&steps, &RunContext::new(), state(), 4).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ImprovementFailed);
        assert_eq!(*steps.improvements.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_termination_bound() {
        for max in 0..6 {
            for script in [vec![1], vec![2, 1], vec![1, 1, 0], vec![0]] {
                let steps = Scripted::new(script);
                let report = run_loop(&steps, &RunContext::new(), state(), max).await.unwrap();

                assert!(report.passes <= max + 1);
                assert!(report.state.iteration_count <= max);
                assert_eq!(report.state.iteration_count, *steps.improvements.lock().unwrap());
                assert_eq!(report.passes, report.state.iteration_count + 1);
            }
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_first_pass() {
        let ctx = RunContext::new();
        ctx.cancel_token().cancel();
        let err = run_loop(&Scripted::new(vec![1]), &ctx, state(), 4).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_degraded_exit_restores_best_vocabulary() {
        let ctx = RunContext::new();
        ctx.vocabulary()
            .add(&[VocabularyEntry::new("kala", "eat", "verb")]);
        let mut steps = Scripted::new(vec![1, 3, 3]);
        steps.vocabulary = Some(ctx.vocabulary().clone());

        let report = run_loop(&steps, &ctx, state(), 2).await.unwrap();

        assert_eq!(report.outcome, LoopOutcome::Degraded);
        assert_eq!(report.state.rules[0].title, "r");
        let forms: Vec<String> = ctx
            .vocabulary()
            .get()
            .into_iter()
            .map(|e| e.foreign_form)
            .collect();
        assert_eq!(forms, vec!["kala"]);
        assert_eq!(report.state.vocabulary, ctx.vocabulary().get());
    }

    #[tokio::test]
    async fn test_converged_exit_keeps_latest_vocabulary() {
        let ctx = RunContext::new();
        let mut steps = Scripted::new(vec![2, 0]);
        steps.vocabulary = Some(ctx.vocabulary().clone());

        let report = run_loop(&steps, &ctx, state(), 4).await.unwrap();

        assert_eq!(report.outcome, LoopOutcome::Converged);
        assert!(ctx.vocabulary().contains("w1"));
    }

    #[tokio::test]
    async fn test_cancellation_before_improving_reports_phase() {
        let token = CancellationToken::new();
        let ctx = RunContext::new().with_cancellation(token.clone());
        let mut steps = Scripted::new(vec![1]);
        steps.cancel_after_verify = Some(token);

        let err = run_loop(&steps, &ctx, state(), 4).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(
            *steps.phases.lock().unwrap(),
            vec![LoopPhase::Verifying, LoopPhase::Improving]
        );
        assert_eq!(*steps.improvements.lock().unwrap(), 0);
    }
}
