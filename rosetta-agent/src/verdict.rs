//! Verdicts returned by the leaf verifiers and the aggregated feedback report.

use rosetta_error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Outcome of testing one rule against the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleStatus {
    #[serde(rename = "RULE_OK", alias = "OK")]
    Ok,
    #[serde(rename = "RULE_WRONG", alias = "WRONG")]
    Wrong,
    #[serde(rename = "RULE_INCONSISTENT", alias = "INCONSISTENT")]
    Inconsistent,
    #[serde(rename = "RULE_UNCLEAR", alias = "UNCLEAR")]
    Unclear,
    #[serde(rename = "RULE_NEEDS_UPDATE", alias = "NEEDS_UPDATE")]
    NeedsUpdate,
    #[serde(rename = "RULE_NEW_NEEDED", alias = "NEW_NEEDED")]
    NewNeeded,
}

impl RuleStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, RuleStatus::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Ok => "RULE_OK",
            RuleStatus::Wrong => "RULE_WRONG",
            RuleStatus::Inconsistent => "RULE_INCONSISTENT",
            RuleStatus::Unclear => "RULE_UNCLEAR",
            RuleStatus::NeedsUpdate => "RULE_NEEDS_UPDATE",
            RuleStatus::NewNeeded => "RULE_NEW_NEEDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub status: RuleStatus,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub recommendation: String,
}

impl RuleVerdict {
    pub fn ok(reasoning: impl Into<String>) -> Self {
        Self {
            status: RuleStatus::Ok,
            reasoning: reasoning.into(),
            recommendation: String::new(),
        }
    }

    pub fn failing(
        status: RuleStatus,
        reasoning: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            status,
            reasoning: reasoning.into(),
            recommendation: recommendation.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentenceStatus {
    #[serde(rename = "SENTENCE_OK", alias = "OK")]
    Ok,
    #[serde(rename = "SENTENCE_AMBIGUOUS", alias = "AMBIGUOUS")]
    Ambiguous,
    #[serde(rename = "SENTENCE_UNTRANSLATABLE", alias = "UNTRANSLATABLE")]
    Untranslatable,
}

impl SentenceStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SentenceStatus::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentenceStatus::Ok => "SENTENCE_OK",
            SentenceStatus::Ambiguous => "SENTENCE_AMBIGUOUS",
            SentenceStatus::Untranslatable => "SENTENCE_UNTRANSLATABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Likelihood {
    High,
    Medium,
    Low,
}

impl Likelihood {
    /// Ranking weight used when ordering recommendations
    pub fn weight(&self) -> u32 {
        match self {
            Likelihood::High => 3,
            Likelihood::Medium => 2,
            Likelihood::Low => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggestion: String,
    pub likelihood: Likelihood,
    #[serde(default)]
    pub reasoning: String,
}

impl Suggestion {
    pub fn new(suggestion: impl Into<String>, likelihood: Likelihood) -> Self {
        Self {
            suggestion: suggestion.into(),
            likelihood,
            reasoning: String::new(),
        }
    }
}

/// Number of ranked repair options a non-OK sentence verdict must carry
pub const SUGGESTIONS_PER_VERDICT: usize = 3;

/// Upper bound on `VerifierFeedback::top_recommendations`
pub const MAX_TOP_RECOMMENDATIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceVerdict {
    pub can_translate: bool,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub ambiguities: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    pub overall_status: SentenceStatus,
}

impl SentenceVerdict {
    pub fn ok(translation: impl Into<String>) -> Self {
        Self {
            can_translate: true,
            translation: translation.into(),
            ambiguities: Vec::new(),
            suggestions: Vec::new(),
            overall_status: SentenceStatus::Ok,
        }
    }

    /// Reject verdicts the improver cannot act on.
    pub fn validate(&self) -> Result<()> {
        if !self.overall_status.is_ok() && self.suggestions.len() != SUGGESTIONS_PER_VERDICT {
            return Err(Error::schema_invalid(format!(
                "{} verdict must carry exactly {} suggestions, got {}",
                self.overall_status.as_str(),
                SUGGESTIONS_PER_VERDICT,
                self.suggestions.len()
            ))
            .with_operation("SentenceVerdict::validate"));
        }
        Ok(())
    }

    /// Highest-likelihood suggestion, first one on ties
    pub fn top_suggestion(&self) -> Option<&Suggestion> {
        self.suggestions
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                a.likelihood
                    .weight()
                    .cmp(&b.likelihood.weight())
                    .then(ib.cmp(ia))
            })
            .map(|(_, s)| s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Conclusion {
    AllPass,
    NeedsImprovement,
    MajorIssues,
}

impl Conclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::AllPass => "ALL_PASS",
            Conclusion::NeedsImprovement => "NEEDS_IMPROVEMENT",
            Conclusion::MajorIssues => "MAJOR_ISSUES",
        }
    }
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cluster of failures that share a root cause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    pub description: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sentences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingRule {
    pub pattern: String,
    pub suggested_rule: String,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestTarget {
    Rule,
    Sentence,
}

/// A leaf verifier call that never produced a verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTest {
    pub target: TestTarget,
    /// Rule title or sentence id
    pub id: String,
    /// Error kind, e.g. "Timeout"
    pub kind: String,
    pub message: String,
}

/// The aggregated report for one verification pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierFeedback {
    pub full_explanation: String,
    pub rules_tested_count: usize,
    pub errant_rules: Vec<String>,
    pub sentences_tested_count: usize,
    pub errant_sentences: Vec<String>,
    pub issues: Vec<Issue>,
    pub missing_rules: Vec<MissingRule>,
    pub top_recommendations: Vec<String>,
    pub conclusion: Conclusion,
    #[serde(default)]
    pub failed_tests: Vec<FailedTest>,
    #[serde(default = "default_true")]
    pub coverage_complete: bool,
}

fn default_true() -> bool {
    true
}

impl VerifierFeedback {
    pub fn all_pass(&self) -> bool {
        self.conclusion == Conclusion::AllPass
    }
}
