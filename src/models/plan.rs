use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Language, ReadingLevel, SectionName};

/// Per-generation options chosen by the clinician.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanOptions {
    pub language: Language,
    pub reading_level: ReadingLevel,
    pub include_caregiver: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            language: Language::En,
            reading_level: ReadingLevel::Simplified,
            include_caregiver: true,
        }
    }
}

/// One version of a patient's discharge plan. Exactly one plan per patient
/// has `is_current` set; superseded versions are kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub version: i64,
    pub options: PlanOptions,
    pub is_current: bool,
    pub created_at: NaiveDateTime,
}

/// Section content keyed by canonical name, iterated in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMap(BTreeMap<SectionName, String>);

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: SectionName, content: String) -> Option<String> {
        self.0.insert(name, content)
    }

    pub fn get(&self, name: SectionName) -> Option<&str> {
        self.0.get(&name).map(String::as_str)
    }

    pub fn contains(&self, name: SectionName) -> bool {
        self.0.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectionName, &str)> {
        self.0.iter().map(|(name, content)| (*name, content.as_str()))
    }

    /// Number of sections holding real content (not empty, not a placeholder).
    pub fn completed_count(&self) -> usize {
        self.0
            .values()
            .filter(|c| !c.trim().is_empty() && !c.trim_start().starts_with('['))
            .count()
    }
}

impl FromIterator<(SectionName, String)> for SectionMap {
    fn from_iter<I: IntoIterator<Item = (SectionName, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
