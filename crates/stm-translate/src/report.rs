//! Counts and diagnostics of one translation run.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stm_core::errors::{ErrorKind, TranslationError};
use stm_core::output::OutputEvent;

/// One source object (or part of one) that produced nothing, or produced
/// less than it carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SkipRecord {
    pub object_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl SkipRecord {
    #[must_use]
    pub fn new(object_id: impl Into<String>, error: &TranslationError) -> Self {
        Self {
            object_id: object_id.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub attributes: usize,
    pub objects: usize,
    pub galaxies: usize,
    /// Source objects that produced no output.
    pub skips: Vec<SkipRecord>,
    /// Diagnostics for objects that were still translated.
    pub warnings: Vec<SkipRecord>,
    /// Dropped field keys with the number of times each was seen.
    pub unmapped: BTreeMap<String, usize>,
    pub partial_attachments: usize,
}

impl RunReport {
    pub fn record_skip(&mut self, object_id: &str, error: &TranslationError) {
        self.skips.push(SkipRecord::new(object_id, error));
    }

    pub fn record_warning(&mut self, object_id: &str, error: &TranslationError) {
        if matches!(error, TranslationError::PartialAttachment { .. }) {
            self.partial_attachments += 1;
        }
        self.warnings.push(SkipRecord::new(object_id, error));
    }

    pub fn record_unmapped(&mut self, key: &str) {
        *self.unmapped.entry(key.to_string()).or_default() += 1;
    }

    /// Fill the output counts from the finished event. Attributes inside
    /// objects are not counted.
    pub fn count(&mut self, event: &OutputEvent) {
        self.attributes = event.attributes.len();
        self.objects = event.objects.len();
        self.galaxies = event.galaxies.iter().map(|g| g.clusters.len()).sum();
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skips.len()
    }

    /// Skip totals per error kind.
    #[must_use]
    pub fn skips_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut totals = BTreeMap::new();
        for skip in &self.skips {
            *totals.entry(skip.kind).or_default() += 1;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn unmapped_keys_are_counted() {
        let mut report = RunReport::default();
        report.record_unmapped("file:accessed");
        report.record_unmapped("file:accessed");
        report.record_unmapped("url:x_acme");
        assert_eq!(report.unmapped.get("file:accessed"), Some(&2));
        assert_eq!(report.unmapped.len(), 2);
    }

    #[test]
    fn partial_attachments_are_tallied_as_warnings() {
        let mut report = RunReport::default();
        report.record_warning(
            "observed-data--1",
            &TranslationError::PartialAttachment {
                relation: "screenshot".into(),
                missing: "data",
            },
        );
        assert_eq!(report.partial_attachments, 1);
        assert_eq!(report.warnings[0].kind, ErrorKind::PartialAttachment);
        assert_eq!(report.skipped(), 0);
    }

    #[test]
    fn skips_group_by_kind() {
        let mut report = RunReport::default();
        report.record_skip("a", &TranslationError::UnsupportedObject("grouping".into()));
        report.record_skip("b", &TranslationError::UnsupportedObject("note".into()));
        report.record_skip("c", &TranslationError::MalformedHint("x".into()));
        let totals = report.skips_by_kind();
        assert_eq!(totals.get(&ErrorKind::UnsupportedObject), Some(&2));
        assert_eq!(totals.get(&ErrorKind::MalformedHint), Some(&1));
    }

    #[test]
    fn serializes_kinds_snake_case() {
        let mut report = RunReport::default();
        report.record_skip("x", &TranslationError::EmptyObject("file".into()));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["skips"][0]["kind"], "empty_object");
    }
}
