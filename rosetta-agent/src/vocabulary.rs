//! Run-scoped vocabulary store keyed by foreign form.
//!
//! Readers take a snapshot at the start of a verification pass; writers run
//! only inside the sequential hypothesis and improvement steps.

use crate::problem::{VocabularyDelta, VocabularyEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOutcome {
    pub added: usize,
    pub skipped: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub updated: usize,
    pub skipped: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveOutcome {
    pub removed: usize,
    pub not_found: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearOutcome {
    pub removed: usize,
}

/// Shared handle to one run's vocabulary. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct VocabularyStore {
    entries: Arc<RwLock<BTreeMap<String, VocabularyEntry>>>,
}

impl VocabularyStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking writer cannot leave a half-applied entry behind, so a
    // poisoned lock still holds a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, VocabularyEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, VocabularyEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// All entries ordered by foreign form
    pub fn get(&self) -> Vec<VocabularyEntry> {
        self.read().values().cloned().collect()
    }

    pub fn lookup(&self, foreign_form: &str) -> Option<VocabularyEntry> {
        self.read().get(foreign_form).cloned()
    }

    pub fn contains(&self, foreign_form: &str) -> bool {
        self.read().contains_key(foreign_form)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Insert new entries; existing keys and empty forms are skipped.
    pub fn add(&self, entries: &[VocabularyEntry]) -> AddOutcome {
        let mut map = self.write();
        let mut outcome = AddOutcome::default();
        for entry in entries {
            let key = entry.foreign_form.trim();
            if key.is_empty() || map.contains_key(key) {
                outcome.skipped += 1;
                continue;
            }
            let mut entry = entry.clone();
            entry.foreign_form = key.to_string();
            map.insert(entry.foreign_form.clone(), entry);
            outcome.added += 1;
        }
        outcome.total = map.len();
        outcome
    }

    /// Replace existing entries; unknown keys are skipped.
    pub fn update(&self, entries: &[VocabularyEntry]) -> UpdateOutcome {
        let mut map = self.write();
        let mut outcome = UpdateOutcome::default();
        for entry in entries {
            let key = entry.foreign_form.trim();
            match map.get_mut(key) {
                Some(existing) => {
                    *existing = VocabularyEntry {
                        foreign_form: key.to_string(),
                        ..entry.clone()
                    };
                    outcome.updated += 1;
                }
                None => outcome.skipped += 1,
            }
        }
        outcome.total = map.len();
        outcome
    }

    pub fn remove(&self, foreign_forms: &[String]) -> RemoveOutcome {
        let mut map = self.write();
        let mut outcome = RemoveOutcome::default();
        for form in foreign_forms {
            if map.remove(form.trim()).is_some() {
                outcome.removed += 1;
            } else {
                outcome.not_found += 1;
            }
        }
        outcome.total = map.len();
        outcome
    }

    pub fn clear(&self) -> ClearOutcome {
        let mut map = self.write();
        let removed = map.len();
        map.clear();
        ClearOutcome { removed }
    }

    /// Apply a delta in remove, update, add order so a removed form can be
    /// re-added with a new meaning in the same delta.
    pub fn apply(&self, delta: &VocabularyDelta) -> DeltaOutcome {
        DeltaOutcome {
            removed: self.remove(&delta.remove),
            updated: self.update(&delta.update),
            added: self.add(&delta.add),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaOutcome {
    pub removed: RemoveOutcome,
    pub updated: UpdateOutcome,
    pub added: AddOutcome,
}
