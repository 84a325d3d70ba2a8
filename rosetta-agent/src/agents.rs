//! Stable identifiers for the agents and steps of a run.
//!
//! Events, execution-log sections, and model requests are tagged with these
//! so a consumer can follow one agent across the whole trace.

pub const STRUCTURED_PROBLEM_EXTRACTOR: &str = "structured-problem-extractor";
pub const INITIAL_HYPOTHESIZER: &str = "initial-hypothesizer";
pub const HYPOTHESIS_EXTRACTOR: &str = "initial-hypothesis-extractor";
pub const RULE_TESTER: &str = "rule-tester";
pub const SENTENCE_TESTER: &str = "sentence-tester";
pub const VERIFIER_ORCHESTRATOR: &str = "verifier-orchestrator";
pub const RULES_IMPROVER: &str = "rules-improver";
pub const IMPROVEMENT_EXTRACTOR: &str = "rules-improvement-extractor";
pub const QUESTION_ANSWERER: &str = "question-answerer";

/// Step identifiers used for step-start / step-complete events
pub mod steps {
    pub const EXTRACT: &str = "extract-structure";
    pub const HYPOTHESIZE: &str = "initial-hypothesis";
    pub const VERIFY: &str = "verify-rules";
    pub const IMPROVE: &str = "improve-rules";
    pub const ANSWER: &str = "answer-questions";
}
