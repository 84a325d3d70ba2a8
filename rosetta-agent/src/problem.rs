//! Problem data model: the extracted problem, rules, vocabulary, answers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A Rosetta Stone problem after extraction. Immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredProblem {
    #[serde(default)]
    pub context: String,
    pub dataset: Vec<DatasetItem>,
    pub questions: Vec<Question>,
}

impl StructuredProblem {
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// First id that appears more than once across dataset and questions
    pub fn duplicate_id(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.dataset
            .iter()
            .map(|item| item.id.as_str())
            .chain(self.questions.iter().map(|q| q.id.as_str()))
            .find(|id| !seen.insert(*id))
    }
}

/// One paired example. Field names beyond `id` depend on the problem
/// (e.g. `english`, `foreignForm`) and keep their extraction order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DatasetItem {
    /// Text-valued fields in order
    pub fn text_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
    }

    /// The field a forward translation starts from
    pub fn source(&self) -> Option<(&str, &str)> {
        self.text_fields().next()
    }

    /// The field a forward translation should produce
    pub fn target(&self) -> Option<(&str, &str)> {
        self.text_fields().nth(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    /// Task type tag, e.g. "translate-to-english"
    #[serde(rename = "type", default)]
    pub kind: String,
    pub input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }
}

/// A grammar rule hypothesis. Rule sets are replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub title: String,
    pub description: String,
    /// Advisory only; loop control never reads it
    #[serde(default)]
    pub confidence: Confidence,
}

impl Rule {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            confidence: Confidence::Medium,
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }
}

/// A morpheme or word in the discovered lexicon, keyed by `foreign_form`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyEntry {
    pub foreign_form: String,
    pub meaning: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub notes: String,
}

impl VocabularyEntry {
    pub fn new(
        foreign_form: impl Into<String>,
        meaning: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            foreign_form: foreign_form.into(),
            meaning: meaning.into(),
            kind: kind.into(),
            notes: String::new(),
        }
    }
}

/// Vocabulary changes proposed alongside a rule set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyDelta {
    #[serde(default)]
    pub add: Vec<VocabularyEntry>,
    #[serde(default)]
    pub update: Vec<VocabularyEntry>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl VocabularyDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

/// Final answer to one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub answer: String,
    #[serde(default)]
    pub working_steps: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub confidence_reasoning: String,
}
