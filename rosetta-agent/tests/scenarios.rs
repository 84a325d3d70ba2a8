//! End-to-end runs of the pipeline against a scripted reasoning model.

use rosetta_agent::agents::{
    steps, HYPOTHESIS_EXTRACTOR, IMPROVEMENT_EXTRACTOR, INITIAL_HYPOTHESIZER, QUESTION_ANSWERER,
    RULES_IMPROVER, RULE_TESTER, SENTENCE_TESTER, STRUCTURED_PROBLEM_EXTRACTOR,
};
use rosetta_agent::events::VocabularyAction;
use rosetta_agent::verdict::TestTarget;
use rosetta_agent::verify::{verify, VerifyOptions};
use rosetta_agent::{
    Conclusion, EventKind, LoopOutcome, MemorySink, Pipeline, Rule, RunContext, RunOptions, Stage,
    StructuredProblem, WorkflowConfig,
};
use rosetta_error::{Error, Result};
use rosetta_llm::{GenerateRequest, Generation, ReasoningModel};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const PROBLEM_TEXT: &str = "Here are some sentences in Kalamu with their English translations.";

fn dataset() -> Value {
    json!({
        "context": "Kalamu is spoken on a small island.",
        "dataset": [
            {"id": "1", "foreignForm": "kala mu", "english": "I eat"},
            {"id": "2", "foreignForm": "kala tu", "english": "you eat"},
            {"id": "3", "foreignForm": "nua mu", "english": "I drink"},
            {"id": "4", "foreignForm": "nua tu", "english": "you drink"},
            {"id": "5", "foreignForm": "kala nua mu", "english": "I eat and drink"}
        ],
        "questions": [
            {"id": "Q1", "type": "translate-to-english", "input": "kala nua tu"}
        ]
    })
}

fn hypothesis() -> Value {
    json!({
        "rules": [
            {"title": "Verb root", "description": "The verb root comes first", "confidence": "HIGH"},
            {"title": "Subject suffix", "description": "mu = I, tu = you"}
        ],
        "vocabulary": {
            "add": [
                {"foreignForm": "kala", "meaning": "eat", "type": "verb"},
                {"foreignForm": "mu", "meaning": "I", "type": "pronoun"},
                {"foreignForm": "tu", "meaning": "you", "type": "pronoun"}
            ]
        }
    })
}

fn ambiguous() -> Value {
    json!({
        "canTranslate": true,
        "translation": "I eat ... ?",
        "ambiguities": ["nua is not in the vocabulary"],
        "suggestions": [
            {"suggestion": "Add nua = drink to the vocabulary", "likelihood": "HIGH"},
            {"suggestion": "Describe verb serialization", "likelihood": "MEDIUM"},
            {"suggestion": "Check whether nua is a conjunction", "likelihood": "LOW"}
        ],
        "overallStatus": "SENTENCE_AMBIGUOUS"
    })
}

fn sentence_ok() -> Value {
    json!({
        "canTranslate": true,
        "translation": "as expected",
        "ambiguities": [],
        "suggestions": [],
        "overallStatus": "SENTENCE_OK"
    })
}

/// Replies by agent id and prompt content, and records every call.
struct Tutor {
    extraction: Value,
    /// Rule titles judged RULE_WRONG on every pass
    wrong_rules: Vec<&'static str>,
    /// Sentence content judged ambiguous on every pass
    ambiguous_sentence: Option<&'static str>,
    /// Sentence content whose verifier always errors
    broken_sentence: Option<&'static str>,
    /// Sentence content judged ambiguous with too few suggestions
    short_suggestions_for: Option<&'static str>,
    /// Cancelled when the first rule tester is called
    cancel_on_verify: Option<CancellationToken>,
    hypothesis_reply: Option<Value>,
    improvement_reply: Option<Value>,
    answer_reply: Option<Value>,
    calls: Mutex<Vec<String>>,
    answer_prompts: Mutex<Vec<String>>,
}

impl Tutor {
    fn new() -> Self {
        Self {
            extraction: json!({"success": true, "explanation": "", "problem": dataset()}),
            wrong_rules: Vec::new(),
            ambiguous_sentence: None,
            broken_sentence: None,
            short_suggestions_for: None,
            cancel_on_verify: None,
            hypothesis_reply: None,
            improvement_reply: None,
            answer_reply: None,
            calls: Mutex::new(Vec::new()),
            answer_prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, agent: &str) -> usize {
        self.calls().iter().filter(|a| *a == agent).count()
    }
}

fn translating(prompt: &str, content: &str) -> bool {
    prompt.contains(&format!("): {}\n", content))
}

impl ReasoningModel for Tutor {
    async fn generate(&self, request: GenerateRequest) -> Result<Generation> {
        self.calls.lock().unwrap().push(request.agent.clone());
        let prompt = request.prompt.as_str();

        let object = match request.agent.as_str() {
            STRUCTURED_PROBLEM_EXTRACTOR => self.extraction.clone(),
            INITIAL_HYPOTHESIZER => {
                return Ok(Generation::from_text(
                    "The verb root precedes a subject suffix.",
                ))
            }
            RULES_IMPROVER => {
                return Ok(Generation::from_text(
                    "Keeping both rules and sharpening the verb root description.",
                ))
            }
            HYPOTHESIS_EXTRACTOR => self.hypothesis_reply.clone().unwrap_or_else(hypothesis),
            IMPROVEMENT_EXTRACTOR => self.improvement_reply.clone().unwrap_or_else(hypothesis),
            RULE_TESTER => {
                if let Some(token) = &self.cancel_on_verify {
                    token.cancel();
                }
                let wrong = self
                    .wrong_rules
                    .iter()
                    .any(|title| prompt.contains(&format!("RULE UNDER TEST: {}\n", title)));
                if wrong {
                    json!({
                        "status": "RULE_WRONG",
                        "reasoning": "item 5 contradicts it",
                        "recommendation": "Allow two verb roots in a row"
                    })
                } else {
                    json!({"status": "RULE_OK", "reasoning": "all examples fit"})
                }
            }
            SENTENCE_TESTER => match (self.broken_sentence, self.ambiguous_sentence) {
                (Some(content), _) if translating(prompt, content) => {
                    return Err(Error::network_failed("connection reset").persist());
                }
                (_, Some(content)) if translating(prompt, content) => ambiguous(),
                _ => match self.short_suggestions_for {
                    Some(content) if translating(prompt, content) => {
                        let mut verdict = ambiguous();
                        verdict["suggestions"].as_array_mut().unwrap().truncate(2);
                        verdict
                    }
                    _ => sentence_ok(),
                },
            },
            QUESTION_ANSWERER => {
                self.answer_prompts.lock().unwrap().push(request.prompt.clone());
                if let Some(reply) = &self.answer_reply {
                    return Ok(Generation::from_object(reply.clone()));
                }
                json!({
                    "success": true,
                    "explanation": "",
                    "answers": [{
                        "questionId": "Q1",
                        "answer": "you eat and drink",
                        "workingSteps": "kala = eat, nua = drink, tu = you",
                        "confidence": "HIGH",
                        "confidenceReasoning": "every morpheme is attested"
                    }]
                })
            }
            other => return Err(Error::unexpected(format!("unscripted agent {}", other))),
        };
        Ok(Generation::from_object(object))
    }
}

fn pipeline(tutor: Tutor) -> Pipeline<Tutor> {
    Pipeline::new(tutor, WorkflowConfig::default())
}

#[tokio::test]
async fn test_converges_without_improvement() {
    let pipeline = pipeline(Tutor::new());
    let ctx = RunContext::new();

    let output = pipeline.run(&ctx, PROBLEM_TEXT, RunOptions::default()).await.unwrap();

    assert_eq!(output.outcome, LoopOutcome::Converged);
    assert_eq!(output.iterations, 0);
    assert_eq!(output.answers.len(), 1);
    assert_eq!(output.answers[0].question_id, "Q1");
    assert_eq!(output.rules.len(), 2);
    assert_eq!(output.vocabulary.len(), 3);
    assert_eq!(pipeline.model().count(RULES_IMPROVER), 0);
    assert_eq!(
        output.final_feedback.as_ref().unwrap().conclusion,
        Conclusion::AllPass
    );
}

#[tokio::test]
async fn test_persistently_wrong_rule_degrades_at_cap() {
    let mut tutor = Tutor::new();
    tutor.wrong_rules = vec!["Verb root"];
    let pipeline = pipeline(tutor);
    let ctx = RunContext::new();

    let options = RunOptions {
        max_iterations: Some(4),
        ..Default::default()
    };
    let output = pipeline.run(&ctx, PROBLEM_TEXT, options).await.unwrap();

    assert_eq!(output.outcome, LoopOutcome::Degraded);
    assert_eq!(output.iterations, 4);
    assert_eq!(pipeline.model().count(RULES_IMPROVER), 4);
    assert_eq!(pipeline.model().count(IMPROVEMENT_EXTRACTOR), 4);

    let feedback = output.final_feedback.unwrap();
    assert!(feedback.errant_rules.contains(&"Verb root".to_string()));
    assert_ne!(feedback.conclusion, Conclusion::AllPass);
    // best effort still answers
    assert_eq!(output.answers.len(), 1);
}

#[tokio::test]
async fn test_extraction_failure_stops_the_run() {
    let mut tutor = Tutor::new();
    tutor.extraction = json!({
        "success": false,
        "explanation": "The text contains no translation pairs"
    });
    let pipeline = pipeline(tutor);
    let sink = Arc::new(MemorySink::new());
    let ctx = RunContext::new().with_sink(sink.clone());

    let failure = pipeline
        .run(&ctx, PROBLEM_TEXT, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Extraction);
    assert!(failure.error.message().contains("The text contains no translation pairs"));
    assert!(failure.to_string().contains("The text contains no translation pairs"));
    assert_eq!(pipeline.model().calls(), vec![STRUCTURED_PROBLEM_EXTRACTOR.to_string()]);

    let kinds = sink.kinds();
    assert!(!kinds
        .iter()
        .any(|k| matches!(k, EventKind::StepComplete { .. })));
    assert_eq!(
        kinds.last(),
        Some(&EventKind::RunFinished {
            outcome: "failed: extraction".into()
        })
    );
}

#[tokio::test]
async fn test_ambiguous_sentence_drives_improvement() {
    let mut tutor = Tutor::new();
    tutor.ambiguous_sentence = Some("kala nua mu");
    let pipeline = pipeline(tutor);
    let ctx = RunContext::new();

    let options = RunOptions {
        max_iterations: Some(1),
        ..Default::default()
    };
    let output = pipeline.run(&ctx, PROBLEM_TEXT, options).await.unwrap();

    let feedback = output.final_feedback.unwrap();
    assert_eq!(feedback.errant_sentences, vec!["5"]);
    assert!(feedback
        .top_recommendations
        .iter()
        .any(|r| r == "Add nua = drink to the vocabulary"));
    assert_eq!(output.outcome, LoopOutcome::Degraded);
    assert_eq!(pipeline.model().count(RULES_IMPROVER), 1);
}

#[tokio::test]
async fn test_degraded_run_answers_with_best_vocabulary() {
    let mut tutor = Tutor::new();
    tutor.wrong_rules = vec!["Subject suffix", "Verb order", "Tense"];
    tutor.improvement_reply = Some(json!({
        "rules": [
            {"title": "Verb order", "description": "Verbs follow the subject"},
            {"title": "Tense", "description": "kala marks the past"}
        ],
        "vocabulary": {"remove": ["kala"]}
    }));
    let pipeline = pipeline(tutor);
    let sink = Arc::new(MemorySink::new());
    let ctx = RunContext::new().with_sink(sink.clone());

    let options = RunOptions {
        max_iterations: Some(1),
        ..Default::default()
    };
    let output = pipeline.run(&ctx, PROBLEM_TEXT, options).await.unwrap();

    assert_eq!(output.outcome, LoopOutcome::Degraded);
    let titles: Vec<&str> = output.rules.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Verb root", "Subject suffix"]);
    assert!(output.vocabulary.iter().any(|e| e.foreign_form == "kala"));

    let prompts = pipeline.model().answer_prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("- kala = eat (verb)"));
    assert!(!prompts[0].contains("Verb order"));

    assert!(sink.kinds().iter().any(|k| matches!(
        k,
        EventKind::VocabularyUpdate { action: VocabularyAction::Clear, .. }
    )));
}

#[tokio::test]
async fn test_verdict_with_too_few_suggestions_is_a_failed_test() {
    let mut tutor = Tutor::new();
    tutor.short_suggestions_for = Some("nua mu");
    let pipeline = pipeline(tutor);
    let ctx = RunContext::new();

    let options = RunOptions {
        max_iterations: Some(1),
        ..Default::default()
    };
    let output = pipeline.run(&ctx, PROBLEM_TEXT, options).await.unwrap();

    let feedback = output.final_feedback.unwrap();
    assert!(!feedback.coverage_complete);
    assert_eq!(feedback.failed_tests.len(), 1);
    let failed = &feedback.failed_tests[0];
    assert_eq!(failed.target, TestTarget::Sentence);
    assert_eq!(failed.id, "3");
    assert_eq!(failed.kind, "SchemaInvalid");
    assert!(failed.message.contains("exactly 3 suggestions, got 2"));
    assert!(feedback.errant_sentences.is_empty());
    assert_eq!(output.outcome, LoopOutcome::Degraded);
}

#[tokio::test]
async fn test_improver_without_rules_fails_improvement() {
    let mut tutor = Tutor::new();
    tutor.wrong_rules = vec!["Verb root"];
    tutor.improvement_reply = Some(json!({"rules": []}));
    let pipeline = pipeline(tutor);
    let sink = Arc::new(MemorySink::new());
    let ctx = RunContext::new().with_sink(sink.clone());

    let failure = pipeline
        .run(&ctx, PROBLEM_TEXT, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Improvement);
    assert_eq!(failure.error.message(), "improver returned no rules");
    assert_eq!(failure.to_string(), "improvement failed: improver returned no rules");
    assert_eq!(pipeline.model().count(IMPROVEMENT_EXTRACTOR), 1);
    assert_eq!(pipeline.model().count(QUESTION_ANSWERER), 0);
    assert_eq!(
        sink.kinds().last(),
        Some(&EventKind::RunFinished {
            outcome: "failed: improvement".into()
        })
    );
}

#[tokio::test]
async fn test_hypothesis_without_rules_stops_the_run() {
    let mut tutor = Tutor::new();
    tutor.hypothesis_reply = Some(json!({"rules": []}));
    let pipeline = pipeline(tutor);
    let ctx = RunContext::new();

    let failure = pipeline
        .run(&ctx, PROBLEM_TEXT, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Hypothesis);
    assert_eq!(failure.error.message(), "no rules could be identified");
    assert_eq!(pipeline.model().count(RULE_TESTER), 0);
    assert_eq!(pipeline.model().count(SENTENCE_TESTER), 0);
    assert_eq!(pipeline.model().count(QUESTION_ANSWERER), 0);
}

#[tokio::test]
async fn test_answerer_refusal_is_reported_verbatim() {
    let explanation = "Q1 joins two verbs and no rule covers that";
    let mut tutor = Tutor::new();
    tutor.answer_reply = Some(json!({
        "success": false,
        "explanation": explanation,
        "answers": []
    }));
    let pipeline = pipeline(tutor);
    let ctx = RunContext::new();

    let failure = pipeline
        .run(&ctx, PROBLEM_TEXT, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Answering);
    assert_eq!(failure.error.message(), explanation);
    assert_eq!(failure.to_string(), format!("answering failed: {}", explanation));
    assert_eq!(pipeline.model().count(QUESTION_ANSWERER), 1);
}

#[tokio::test]
async fn test_reverification_is_idempotent() {
    let mut tutor = Tutor::new();
    tutor.wrong_rules = vec!["Subject suffix"];
    tutor.ambiguous_sentence = Some("nua tu");
    let problem: StructuredProblem = serde_json::from_value(dataset()).unwrap();
    let rules = vec![
        Rule::new("Verb root", "The verb root comes first"),
        Rule::new("Subject suffix", "mu = I, tu = you"),
    ];
    let options = VerifyOptions {
        concurrency: 3,
        ..Default::default()
    };
    let ctx = RunContext::new();

    let first = verify(&tutor, &ctx, &problem, &rules, &options).await.unwrap();
    let second = verify(&tutor, &ctx, &problem, &rules, &options).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.rules_tested_count, 2);
    assert_eq!(first.sentences_tested_count, 6);
}

#[tokio::test]
async fn test_broken_verifier_reduces_coverage_only() {
    let mut tutor = Tutor::new();
    tutor.broken_sentence = Some("kala tu");
    let pipeline = pipeline(tutor);
    let ctx = RunContext::new();

    let options = RunOptions {
        max_iterations: Some(1),
        ..Default::default()
    };
    let output = pipeline.run(&ctx, PROBLEM_TEXT, options).await.unwrap();

    let feedback = output.final_feedback.unwrap();
    assert!(!feedback.coverage_complete);
    assert_eq!(feedback.failed_tests.len(), 1);
    assert_eq!(feedback.failed_tests[0].id, "2");
    assert!(feedback.errant_sentences.is_empty());
    // an incomplete pass never counts as converged
    assert_eq!(output.outcome, LoopOutcome::Degraded);
    assert_eq!(output.answers.len(), 1);
}

#[tokio::test]
async fn test_event_stream_follows_the_steps() {
    let pipeline = pipeline(Tutor::new());
    let sink = Arc::new(MemorySink::new());
    let ctx = RunContext::new().with_sink(sink.clone());

    pipeline.run(&ctx, PROBLEM_TEXT, RunOptions::default()).await.unwrap();

    let events = sink.events();
    assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert!(events.iter().all(|e| e.run_id == ctx.run_id()));

    let started: Vec<String> = sink
        .kinds()
        .into_iter()
        .filter_map(|k| match k {
            EventKind::StepStart { step_id } => Some(step_id),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![steps::EXTRACT, steps::HYPOTHESIZE, steps::VERIFY, steps::ANSWER]
    );

    let kinds = sink.kinds();
    assert!(kinds.iter().any(|k| matches!(
        k,
        EventKind::AgentReasoning { agent_id, .. } if agent_id == INITIAL_HYPOTHESIZER
    )));
    assert!(kinds.iter().any(|k| matches!(
        k,
        EventKind::IterationUpdate { iteration: 0, conclusion, .. } if conclusion == "ALL_PASS"
    )));
    assert_eq!(
        kinds.last(),
        Some(&EventKind::RunFinished {
            outcome: "converged".into()
        })
    );
    assert_eq!(ctx.timings().snapshot().len(), 4);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let pipeline = pipeline(Tutor::new());
    let ctx = RunContext::new();
    ctx.cancel_token().cancel();

    let failure = pipeline
        .run(&ctx, PROBLEM_TEXT, RunOptions::default())
        .await
        .unwrap_err();

    assert!(failure.is_cancelled());
    assert_eq!(failure.stage, Stage::Extraction);
    assert!(pipeline.model().calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_during_verification() {
    let token = CancellationToken::new();
    let mut tutor = Tutor::new();
    tutor.cancel_on_verify = Some(token.clone());
    let pipeline = pipeline(tutor);
    let sink = Arc::new(MemorySink::new());
    let ctx = RunContext::new()
        .with_cancellation(token)
        .with_sink(sink.clone());

    let failure = pipeline
        .run(&ctx, PROBLEM_TEXT, RunOptions::default())
        .await
        .unwrap_err();

    assert!(failure.is_cancelled());
    assert_eq!(failure.stage, Stage::Verification);
    assert_eq!(pipeline.model().count(QUESTION_ANSWERER), 0);
    assert_eq!(
        sink.kinds().last(),
        Some(&EventKind::RunFinished {
            outcome: "cancelled".into()
        })
    );
}
