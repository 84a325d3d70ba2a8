//! Deterministic synthesis of one pass's verdicts into a feedback report.
//!
//! The same verdicts always produce the same report: inputs are consumed in
//! dispatch order and every ranking breaks ties by first appearance.

use crate::verdict::{
    Conclusion, FailedTest, Issue, MissingRule, RuleStatus, RuleVerdict, SentenceStatus,
    SentenceVerdict, TestTarget, VerifierFeedback, MAX_TOP_RECOMMENDATIONS,
};
use std::collections::HashMap;
use std::fmt::Write;

/// Where NEEDS_IMPROVEMENT ends and MAJOR_ISSUES begins
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPolicy {
    /// Failing share of rules or of sentences that counts as major
    pub major_issue_fraction: f64,
    /// Any RULE_INCONSISTENT verdict counts as major
    pub inconsistency_is_major: bool,
    /// Never more than `MAX_TOP_RECOMMENDATIONS`
    pub max_recommendations: usize,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            major_issue_fraction: 0.5,
            inconsistency_is_major: true,
            max_recommendations: MAX_TOP_RECOMMENDATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleCheck {
    pub title: String,
    pub verdict: RuleVerdict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentenceCheck {
    pub id: String,
    pub verdict: SentenceVerdict,
}

/// Everything one verification pass settled, in dispatch order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassResults {
    pub rules: Vec<RuleCheck>,
    pub sentences: Vec<SentenceCheck>,
    pub failed_tests: Vec<FailedTest>,
}

/// Weight given to a rule verifier's recommendation when ranking
const RULE_RECOMMENDATION_WEIGHT: u32 = 3;

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', ';', ','])
        .to_lowercase()
}

fn fraction(failing: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        failing as f64 / total as f64
    }
}

pub fn aggregate(results: &PassResults, policy: &AggregationPolicy) -> VerifierFeedback {
    let errant_rule_checks: Vec<&RuleCheck> = results
        .rules
        .iter()
        .filter(|c| !c.verdict.status.is_ok())
        .collect();
    let errant_sentence_checks: Vec<&SentenceCheck> = results
        .sentences
        .iter()
        .filter(|c| !c.verdict.overall_status.is_ok())
        .collect();

    let errant_rules: Vec<String> = errant_rule_checks.iter().map(|c| c.title.clone()).collect();
    let errant_sentences: Vec<String> =
        errant_sentence_checks.iter().map(|c| c.id.clone()).collect();

    let issues = collect_issues(&errant_rule_checks, &errant_sentence_checks);
    let missing_rules =
        collect_missing_rules(&errant_rule_checks, &errant_sentence_checks, &errant_sentences);
    let top_recommendations = rank_recommendations(
        &errant_rule_checks,
        &errant_sentence_checks,
        policy.max_recommendations,
    );
    let conclusion = conclude(results, &errant_rule_checks, &errant_sentence_checks, policy);

    let mut feedback = VerifierFeedback {
        full_explanation: String::new(),
        rules_tested_count: results.rules.len(),
        errant_rules,
        sentences_tested_count: results.sentences.len(),
        errant_sentences,
        issues,
        missing_rules,
        top_recommendations,
        conclusion,
        failed_tests: results.failed_tests.clone(),
        coverage_complete: results.failed_tests.is_empty(),
    };
    feedback.full_explanation = explain(&feedback);
    feedback
}

fn conclude(
    results: &PassResults,
    errant_rules: &[&RuleCheck],
    errant_sentences: &[&SentenceCheck],
    policy: &AggregationPolicy,
) -> Conclusion {
    let failed = &results.failed_tests;
    if errant_rules.is_empty() && errant_sentences.is_empty() && failed.is_empty() {
        return Conclusion::AllPass;
    }
    if results.rules.is_empty() && results.sentences.is_empty() {
        // Nothing came back at all
        return Conclusion::MajorIssues;
    }
    if policy.inconsistency_is_major
        && errant_rules
            .iter()
            .any(|c| c.verdict.status == RuleStatus::Inconsistent)
    {
        return Conclusion::MajorIssues;
    }

    let rule_fraction = fraction(errant_rules.len(), results.rules.len());
    let sentence_fraction = fraction(errant_sentences.len(), results.sentences.len());
    let threshold = policy.major_issue_fraction;
    if rule_fraction >= threshold || sentence_fraction >= threshold {
        Conclusion::MajorIssues
    } else {
        Conclusion::NeedsImprovement
    }
}

fn collect_issues(errant_rules: &[&RuleCheck], errant_sentences: &[&SentenceCheck]) -> Vec<Issue> {
    let mut issues: Vec<Issue> = errant_rules
        .iter()
        .map(|c| Issue {
            title: format!("{}: {}", c.verdict.status.as_str(), c.title),
            description: c.verdict.reasoning.clone(),
            recommendation: if c.verdict.recommendation.trim().is_empty() {
                "Revise or discard this rule".to_string()
            } else {
                c.verdict.recommendation.clone()
            },
            rules: vec![c.title.clone()],
            sentences: Vec::new(),
        })
        .collect();

    // Sentences whose best repair is the same fix share a root cause.
    let mut clusters: Vec<(String, Vec<&SentenceCheck>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for check in errant_sentences {
        let key = match check.verdict.top_suggestion() {
            Some(s) => normalize(&s.suggestion),
            None => check.verdict.overall_status.as_str().to_string(),
        };
        match index.get(&key) {
            Some(&i) => clusters[i].1.push(*check),
            None => {
                index.insert(key.clone(), clusters.len());
                clusters.push((key, vec![*check]));
            }
        }
    }

    for (_, members) in clusters {
        let first = members[0];
        let ids: Vec<String> = members.iter().map(|c| c.id.clone()).collect();
        let recommendation = first
            .verdict
            .top_suggestion()
            .map(|s| s.suggestion.clone())
            .unwrap_or_else(|| "Add rules or vocabulary covering these sentences".to_string());

        let mut description = String::new();
        for check in &members {
            let _ = write!(
                description,
                "{} is {}",
                check.id,
                check.verdict.overall_status.as_str()
            );
            if !check.verdict.ambiguities.is_empty() {
                let _ = write!(description, " ({})", check.verdict.ambiguities.join("; "));
            }
            description.push_str(". ");
        }

        issues.push(Issue {
            title: if ids.len() == 1 {
                format!("Sentence {} fails", ids[0])
            } else {
                format!("{} sentences share one fix", ids.len())
            },
            description: description.trim_end().to_string(),
            recommendation,
            rules: Vec::new(),
            sentences: ids,
        });
    }
    issues
}

fn collect_missing_rules(
    errant_rules: &[&RuleCheck],
    errant_sentences: &[&SentenceCheck],
    errant_sentence_ids: &[String],
) -> Vec<MissingRule> {
    let mut missing: Vec<MissingRule> = errant_rules
        .iter()
        .filter(|c| c.verdict.status == RuleStatus::NewNeeded)
        .map(|c| MissingRule {
            pattern: if c.verdict.reasoning.trim().is_empty() {
                format!("Pattern next to '{}' that no rule covers", c.title)
            } else {
                c.verdict.reasoning.clone()
            },
            suggested_rule: c.verdict.recommendation.clone(),
            evidence: errant_sentence_ids.to_vec(),
        })
        .collect();

    let untranslatable: Vec<&&SentenceCheck> = errant_sentences
        .iter()
        .filter(|c| c.verdict.overall_status == SentenceStatus::Untranslatable)
        .collect();
    if errant_rules.is_empty() && !untranslatable.is_empty() {
        missing.push(MissingRule {
            pattern: "Sentences that no current rule explains".to_string(),
            suggested_rule: untranslatable[0]
                .verdict
                .top_suggestion()
                .map(|s| s.suggestion.clone())
                .unwrap_or_default(),
            evidence: untranslatable.iter().map(|c| c.id.clone()).collect(),
        });
    }
    missing
}

fn rank_recommendations(
    errant_rules: &[&RuleCheck],
    errant_sentences: &[&SentenceCheck],
    limit: usize,
) -> Vec<String> {
    // key -> (display text, score, first appearance)
    let mut scored: Vec<(String, u32, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut cite = |text: &str, weight: u32| {
        let key = normalize(text);
        if key.is_empty() {
            return;
        }
        match index.get(&key) {
            Some(&i) => scored[i].1 += weight,
            None => {
                index.insert(key, scored.len());
                let order = scored.len();
                scored.push((text.trim().to_string(), weight, order));
            }
        }
    };

    for check in errant_rules {
        cite(&check.verdict.recommendation, RULE_RECOMMENDATION_WEIGHT);
    }
    for check in errant_sentences {
        for suggestion in &check.verdict.suggestions {
            cite(&suggestion.suggestion, suggestion.likelihood.weight());
        }
    }

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    scored
        .into_iter()
        .take(limit.min(MAX_TOP_RECOMMENDATIONS))
        .map(|(text, _, _)| text)
        .collect()
}

fn explain(feedback: &VerifierFeedback) -> String {
    let mut out = format!(
        "Tested {} rules ({} errant) and {} sentences ({} errant). Conclusion: {}.\n",
        feedback.rules_tested_count,
        feedback.errant_rules.len(),
        feedback.sentences_tested_count,
        feedback.errant_sentences.len(),
        feedback.conclusion
    );

    if !feedback.issues.is_empty() {
        out.push_str("\nIssues:\n");
        for (i, issue) in feedback.issues.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {}\n   {}\n   Fix: {}",
                i + 1,
                issue.title,
                issue.description,
                issue.recommendation
            );
        }
    }

    if !feedback.missing_rules.is_empty() {
        out.push_str("\nMissing rules:\n");
        for missing in &feedback.missing_rules {
            let _ = writeln!(
                out,
                "- {} (evidence: {})\n  Suggested: {}",
                missing.pattern,
                missing.evidence.join(", "),
                missing.suggested_rule
            );
        }
    }

    if !feedback.coverage_complete {
        let ids: Vec<String> = feedback
            .failed_tests
            .iter()
            .map(|t| match t.target {
                TestTarget::Rule => format!("rule '{}'", t.id),
                TestTarget::Sentence => format!("sentence {}", t.id),
            })
            .collect();
        let _ = writeln!(
            out,
            "\nCoverage incomplete: {} verifier call(s) failed ({}).",
            ids.len(),
            ids.join(", ")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::{Likelihood, Suggestion};

    fn rule_ok(title: &str) -> RuleCheck {
        RuleCheck {
            title: title.into(),
            verdict: RuleVerdict::ok("matches all items"),
        }
    }

    fn rule_bad(title: &str, status: RuleStatus, rec: &str) -> RuleCheck {
        RuleCheck {
            title: title.into(),
            verdict: RuleVerdict::failing(status, "item 2 contradicts it", rec),
        }
    }

    fn sentence_ok(id: &str) -> SentenceCheck {
        SentenceCheck {
            id: id.into(),
            verdict: SentenceVerdict::ok("ok"),
        }
    }

    fn sentence_bad(
        id: &str,
        status: SentenceStatus,
        fixes: [(&str, Likelihood); 3],
    ) -> SentenceCheck {
        SentenceCheck {
            id: id.into(),
            verdict: SentenceVerdict {
                can_translate: status != SentenceStatus::Untranslatable,
                translation: String::new(),
                ambiguities: vec!["tense unclear".into()],
                suggestions: fixes.iter().map(|(s, l)| Suggestion::new(*s, *l)).collect(),
                overall_status: status,
            },
        }
    }

    fn failed(id: &str) -> FailedTest {
        FailedTest {
            target: TestTarget::Sentence,
            id: id.into(),
            kind: "Timeout".into(),
            message: "deadline exceeded".into(),
        }
    }

    const FIXES: [(&str, Likelihood); 3] = [
        ("Add a past tense suffix -ta", Likelihood::High),
        ("Treat -ta as an aspect marker", Likelihood::Medium),
        ("Split rule 2", Likelihood::Low),
    ];

    #[test]
    fn test_all_ok_passes() {
        let results = PassResults {
            rules: vec![rule_ok("A"), rule_ok("B")],
            sentences: vec![sentence_ok("1"), sentence_ok("2"), sentence_ok("Q1")],
            failed_tests: vec![],
        };
        let feedback = aggregate(&results, &AggregationPolicy::default());

        assert_eq!(feedback.conclusion, Conclusion::AllPass);
        assert!(feedback.errant_rules.is_empty());
        assert!(feedback.issues.is_empty());
        assert!(feedback.top_recommendations.is_empty());
        assert!(feedback.coverage_complete);
        assert_eq!(feedback.rules_tested_count, 2);
        assert_eq!(feedback.sentences_tested_count, 3);
    }

    #[test]
    fn test_failed_test_blocks_pass() {
        let results = PassResults {
            rules: vec![rule_ok("A")],
            sentences: vec![sentence_ok("1"), sentence_ok("2")],
            failed_tests: vec![failed("3")],
        };
        let feedback = aggregate(&results, &AggregationPolicy::default());

        assert_eq!(feedback.conclusion, Conclusion::NeedsImprovement);
        assert!(!feedback.coverage_complete);
        assert!(feedback.full_explanation.contains("Coverage incomplete"));
        assert!(feedback.full_explanation.contains("sentence 3"));
    }

    #[test]
    fn test_threshold_boundary() {
        let results = PassResults {
            rules: vec![rule_bad("A", RuleStatus::Wrong, "fix A"), rule_ok("B")],
            sentences: vec![sentence_ok("1")],
            failed_tests: vec![],
        };

        let feedback = aggregate(&results, &AggregationPolicy::default());
        assert_eq!(feedback.conclusion, Conclusion::MajorIssues);

        let lenient = AggregationPolicy {
            major_issue_fraction: 0.75,
            ..Default::default()
        };
        let feedback = aggregate(&results, &lenient);
        assert_eq!(feedback.conclusion, Conclusion::NeedsImprovement);
        assert_eq!(feedback.errant_rules, vec!["A"]);
    }

    #[test]
    fn test_inconsistency_is_major() {
        let results = PassResults {
            rules: vec![
                rule_bad("A", RuleStatus::Inconsistent, "merge with B"),
                rule_ok("B"),
                rule_ok("C"),
            ],
            sentences: vec![sentence_ok("1")],
            failed_tests: vec![],
        };
        assert_eq!(
            aggregate(&results, &AggregationPolicy::default()).conclusion,
            Conclusion::MajorIssues
        );

        let policy = AggregationPolicy {
            inconsistency_is_major: false,
            ..Default::default()
        };
        assert_eq!(aggregate(&results, &policy).conclusion, Conclusion::NeedsImprovement);
    }

    #[test]
    fn test_nothing_returned_is_major() {
        let results = PassResults {
            rules: vec![],
            sentences: vec![],
            failed_tests: vec![failed("1")],
        };
        assert_eq!(
            aggregate(&results, &AggregationPolicy::default()).conclusion,
            Conclusion::MajorIssues
        );
    }

    #[test]
    fn test_sentences_cluster_by_top_suggestion() {
        let results = PassResults {
            rules: vec![rule_ok("A")],
            sentences: vec![
                sentence_bad("1", SentenceStatus::Ambiguous, FIXES),
                sentence_ok("2"),
                sentence_bad(
                    "3",
                    SentenceStatus::Ambiguous,
                    [
                        ("add a past tense suffix -ta.", Likelihood::High),
                        ("Other", Likelihood::Low),
                        ("Another", Likelihood::Low),
                    ],
                ),
                sentence_ok("4"),
                sentence_ok("5"),
            ],
            failed_tests: vec![],
        };
        let feedback = aggregate(&results, &AggregationPolicy::default());

        assert_eq!(feedback.issues.len(), 1);
        assert_eq!(feedback.issues[0].sentences, vec!["1", "3"]);
        assert_eq!(feedback.issues[0].recommendation, "Add a past tense suffix -ta");
        assert_eq!(feedback.top_recommendations[0], "Add a past tense suffix -ta");
        assert_eq!(feedback.conclusion, Conclusion::NeedsImprovement);
    }

    #[test]
    fn test_recommendations_rank_and_cap() {
        let results = PassResults {
            rules: vec![
                rule_bad("A", RuleStatus::Wrong, "Split rule 2"),
                rule_ok("B"),
                rule_ok("C"),
            ],
            sentences: vec![
                sentence_bad("1", SentenceStatus::Ambiguous, FIXES),
                sentence_bad(
                    "2",
                    SentenceStatus::Ambiguous,
                    [
                        ("one", Likelihood::Low),
                        ("two", Likelihood::Low),
                        ("three", Likelihood::Low),
                    ],
                ),
                sentence_ok("3"),
                sentence_ok("4"),
                sentence_ok("5"),
            ],
            failed_tests: vec![],
        };
        let feedback = aggregate(&results, &AggregationPolicy::default());

        // "Split rule 2": 3 (rule) + 1 (low) = 4, then the HIGH suggestion (3).
        assert_eq!(feedback.top_recommendations.len(), 5);
        assert_eq!(feedback.top_recommendations[0], "Split rule 2");
        assert_eq!(feedback.top_recommendations[1], "Add a past tense suffix -ta");
        assert_eq!(feedback.top_recommendations[2], "Treat -ta as an aspect marker");
        assert_eq!(feedback.top_recommendations[3], "one");
    }

    #[test]
    fn test_missing_rules() {
        let results = PassResults {
            rules: vec![
                rule_bad("A", RuleStatus::NewNeeded, "Add a rule for plural -ka"),
                rule_ok("B"),
                rule_ok("C"),
            ],
            sentences: vec![
                sentence_bad("1", SentenceStatus::Untranslatable, FIXES),
                sentence_ok("2"),
                sentence_ok("3"),
            ],
            failed_tests: vec![],
        };
        let feedback = aggregate(&results, &AggregationPolicy::default());
        assert_eq!(feedback.missing_rules.len(), 1);
        assert_eq!(feedback.missing_rules[0].suggested_rule, "Add a rule for plural -ka");
        assert_eq!(feedback.missing_rules[0].evidence, vec!["1"]);

        let results = PassResults {
            rules: vec![rule_ok("B")],
            ..results
        };
        let feedback = aggregate(&results, &AggregationPolicy::default());
        assert_eq!(feedback.missing_rules.len(), 1);
        assert_eq!(feedback.missing_rules[0].pattern, "Sentences that no current rule explains");
        assert_eq!(feedback.missing_rules[0].evidence, vec!["1"]);
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let results = PassResults {
            rules: vec![rule_bad("A", RuleStatus::Wrong, "x"), rule_ok("B")],
            sentences: vec![
                sentence_bad("1", SentenceStatus::Ambiguous, FIXES),
                sentence_ok("2"),
            ],
            failed_tests: vec![failed("3")],
        };
        let policy = AggregationPolicy::default();
        assert_eq!(aggregate(&results, &policy), aggregate(&results, &policy));
    }

    #[test]
    fn test_recommendations_capped_even_for_larger_policy() {
        let rules = (0..8)
            .map(|i| rule_bad(&format!("rule {}", i), RuleStatus::Wrong, &format!("fix {}", i)))
            .collect();
        let results = PassResults {
            rules,
            ..Default::default()
        };
        let policy = AggregationPolicy {
            max_recommendations: 8,
            ..Default::default()
        };

        let feedback = aggregate(&results, &policy);
        assert_eq!(feedback.errant_rules.len(), 8);
        assert_eq!(feedback.top_recommendations.len(), MAX_TOP_RECOMMENDATIONS);
        assert_eq!(feedback.top_recommendations[0], "fix 0");
    }
}
