//! Prompt assembly for every agent.
//!
//! Only the data each agent may see goes into its prompt. The sentence
//! tester in particular never receives the expected translation.

use crate::problem::{Rule, StructuredProblem, VocabularyEntry};
use crate::verdict::VerifierFeedback;
use crate::verify::SentenceTask;
use std::fmt::Write;

pub const SOLVER_SYSTEM: &str = "You are an expert linguist solving Linguistics Olympiad \
Rosetta Stone problems. Reason only from the data you are given.";

pub const EXTRACTOR_SYSTEM: &str = "You convert raw puzzle text into structured data. \
Reply with JSON only.";

pub const VERIFIER_SYSTEM: &str = "You test grammar hypotheses rigorously. Derive every \
prediction yourself and reply with JSON only.";

pub fn extraction(raw: &str) -> String {
    format!(
        "Extract the Rosetta Stone problem below.\n\n\
         Reply with JSON of the form:\n\
         {{\"success\": bool, \"explanation\": string, \"problem\": {{\"context\": string, \
         \"dataset\": [{{\"id\": string, <field>: string, ...}}], \
         \"questions\": [{{\"id\": string, \"type\": string, \"input\": string}}]}}}}\n\
         Keep the original field names of each column (e.g. \"english\", \"foreignForm\"), \
         source language column first. Set success to false and explain why when there \
         are no paired examples or no questions.\n\n\
         PROBLEM TEXT:\n{}",
        raw
    )
}

fn write_problem(out: &mut String, problem: &StructuredProblem) {
    if !problem.context.trim().is_empty() {
        let _ = writeln!(out, "CONTEXT:\n{}\n", problem.context.trim());
    }
    let _ = writeln!(out, "DATASET:");
    for item in &problem.dataset {
        let fields: Vec<String> = item
            .text_fields()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect();
        let _ = writeln!(out, "- [{}] {}", item.id, fields.join(" | "));
    }
    let _ = writeln!(out, "\nQUESTIONS:");
    for q in &problem.questions {
        let _ = writeln!(out, "- [{}] ({}) {}", q.id, q.kind, q.input);
    }
    out.push('\n');
}

fn write_rules(out: &mut String, rules: &[Rule]) {
    let _ = writeln!(out, "RULES:");
    for (i, rule) in rules.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} [{}]\n   {}",
            i + 1,
            rule.title,
            rule.confidence.as_str(),
            rule.description
        );
    }
    out.push('\n');
}

fn write_vocabulary(out: &mut String, vocabulary: &[VocabularyEntry]) {
    let _ = writeln!(out, "VOCABULARY:");
    if vocabulary.is_empty() {
        let _ = writeln!(out, "(empty)");
    }
    for entry in vocabulary {
        let _ = write!(out, "- {} = {} ({})", entry.foreign_form, entry.meaning, entry.kind);
        if !entry.notes.is_empty() {
            let _ = write!(out, "; {}", entry.notes);
        }
        out.push('\n');
    }
    out.push('\n');
}

pub fn hypothesis(problem: &StructuredProblem) -> String {
    let mut out = String::new();
    write_problem(&mut out, problem);
    out.push_str(
        "Work out the grammar of this language. Describe every rule you find \
         (word order, affixes, agreement, sound changes) and list each morpheme \
         with its meaning. Think step by step and check each rule against every example.",
    );
    out
}

pub fn rules_extraction(reasoning: &str) -> String {
    format!(
        "Extract the rules and vocabulary from the analysis below.\n\n\
         Reply with JSON of the form:\n\
         {{\"rules\": [{{\"title\": string, \"description\": string, \
         \"confidence\": \"HIGH\"|\"MEDIUM\"|\"LOW\"}}], \
         \"vocabulary\": {{\"add\": [{{\"foreignForm\": string, \"meaning\": string, \
         \"type\": string, \"notes\": string}}], \"update\": [...], \"remove\": [string]}}}}\n\
         Do not invent anything the analysis does not state.\n\n\
         ANALYSIS:\n{}",
        reasoning
    )
}

pub fn rule_test(
    rule: &Rule,
    rules: &[Rule],
    problem: &StructuredProblem,
    vocabulary: &[VocabularyEntry],
) -> String {
    let mut out = String::new();
    write_problem(&mut out, problem);
    write_rules(&mut out, rules);
    write_vocabulary(&mut out, vocabulary);
    let _ = write!(
        out,
        "RULE UNDER TEST: {}\n{}\n\n\
         Apply this rule to every example it claims to cover and compare its \
         predictions with the data. Reply with JSON: {{\"status\": \"RULE_OK\"|\"RULE_WRONG\"|\
         \"RULE_INCONSISTENT\"|\"RULE_UNCLEAR\"|\"RULE_NEEDS_UPDATE\"|\"RULE_NEW_NEEDED\", \
         \"reasoning\": string, \"recommendation\": string}}",
        rule.title, rule.description
    );
    out
}

pub fn sentence_test(
    task: &SentenceTask,
    context: &str,
    rules: &[Rule],
    vocabulary: &[VocabularyEntry],
) -> String {
    let mut out = String::new();
    if !context.trim().is_empty() {
        let _ = writeln!(out, "CONTEXT:\n{}\n", context.trim());
    }
    write_rules(&mut out, rules);
    write_vocabulary(&mut out, vocabulary);
    let _ = write!(
        out,
        "TRANSLATE ({}): {}\n\n\
         Use ONLY the rules and vocabulary above; no outside knowledge. \
         Reply with JSON: {{\"canTranslate\": bool, \"translation\": string, \
         \"ambiguities\": [string], \"suggestions\": [{{\"suggestion\": string, \
         \"likelihood\": \"HIGH\"|\"MEDIUM\"|\"LOW\", \"reasoning\": string}}], \
         \"overallStatus\": \"SENTENCE_OK\"|\"SENTENCE_AMBIGUOUS\"|\"SENTENCE_UNTRANSLATABLE\"}}. \
         Unless the status is SENTENCE_OK give exactly 3 suggestions, most likely first.",
        task.direction.describe(&task.kind),
        task.content
    );
    out
}

pub fn improvement(
    problem: &StructuredProblem,
    rules: &[Rule],
    vocabulary: &[VocabularyEntry],
    feedback: &VerifierFeedback,
) -> String {
    let mut out = String::new();
    write_problem(&mut out, problem);
    write_rules(&mut out, rules);
    write_vocabulary(&mut out, vocabulary);
    let _ = writeln!(out, "VERIFICATION FEEDBACK ({}):", feedback.conclusion);
    out.push_str(&feedback.full_explanation);
    out.push_str("\n\n");
    if !feedback.top_recommendations.is_empty() {
        let _ = writeln!(out, "TOP RECOMMENDATIONS:");
        for rec in &feedback.top_recommendations {
            let _ = writeln!(out, "- {}", rec);
        }
        out.push('\n');
    }
    out.push_str(
        "Revise the rule set so that every issue and missing rule above is addressed. \
         Discard rules that cannot be repaired. Give the complete revised rule set, \
         not a diff, and say which vocabulary entries to add, update, or remove.",
    );
    out
}

pub fn answering(
    problem: &StructuredProblem,
    rules: &[Rule],
    vocabulary: &[VocabularyEntry],
) -> String {
    let mut out = String::new();
    write_problem(&mut out, problem);
    write_rules(&mut out, rules);
    write_vocabulary(&mut out, vocabulary);
    out.push_str(
        "Answer every question using only these rules and vocabulary. Reply with JSON: \
         {\"success\": bool, \"explanation\": string, \"answers\": [{\"questionId\": string, \
         \"answer\": string, \"workingSteps\": string, \"confidence\": \"HIGH\"|\"MEDIUM\"|\"LOW\", \
         \"confidenceReasoning\": string}]}. If a question cannot be resolved from the rules, \
         set success to false and explain which one.",
    );
    out
}
