//! Runtime types.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use deid_core::{DetectionRecord, Error, PageText, PiiType, Result};
use deid_store::MappingStore;

/// Stage of one document run. Runs only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    SpansResolved,
    Substituted,
    Projected,
    Finalized,
}

impl RunState {
    /// Projection is optional, and deanonymize goes straight from `Init`
    /// to `Substituted` since it resolves no spans.
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, SpansResolved)
                | (Init, Substituted)
                | (SpansResolved, Substituted)
                | (Substituted, Projected)
                | (Substituted, Finalized)
                | (Projected, Finalized)
        )
    }

    pub fn advance(self, next: RunState) -> Result<RunState> {
        if !self.can_advance_to(next) {
            return Err(Error::Internal(format!(
                "invalid run transition {:?} -> {:?}",
                self, next
            )));
        }
        debug!("Run state {:?} -> {:?}", self, next);
        Ok(next)
    }
}

/// Per-type counts in a [`DetectionReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub occurrences: usize,
    pub unique_values: usize,
}

/// Every substitution of one anonymize run, in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub source_document: String,
    pub records: Vec<DetectionRecord>,
    pub summary: BTreeMap<PiiType, TypeSummary>,
}

impl DetectionReport {
    pub fn new(source_document: impl Into<String>, records: Vec<DetectionRecord>) -> Self {
        let mut summary: BTreeMap<PiiType, TypeSummary> = BTreeMap::new();
        let mut unique: BTreeMap<PiiType, BTreeSet<&str>> = BTreeMap::new();
        for record in &records {
            summary.entry(record.pii_type).or_default().occurrences += 1;
            unique
                .entry(record.pii_type)
                .or_default()
                .insert(record.original_value.as_str());
        }
        for (pii_type, values) in unique {
            summary.entry(pii_type).or_default().unique_values = values.len();
        }

        Self {
            source_document: source_document.into(),
            records,
            summary,
        }
    }

    pub fn total_occurrences(&self) -> usize {
        self.records.len()
    }

    /// Pages that had at least one substitution.
    pub fn pages_with_pii(&self) -> BTreeSet<usize> {
        self.records.iter().map(|r| r.page_index).collect()
    }
}

/// Result of an anonymize run.
#[derive(Debug, Clone)]
pub struct AnonymizeOutput {
    /// De-identified pages, ordered by page index.
    pub pages: Vec<PageText>,
    pub report: DetectionReport,
    /// The store after the run. Persist its snapshot to invert the run later.
    pub store: MappingStore,
}

/// Surrogate-shaped text found during deanonymize that the store does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmappedSurrogateWarning {
    pub page_index: usize,
    /// Character offset in the de-identified page text.
    pub char_offset: usize,
    pub text: String,
}

/// Result of a deanonymize run.
#[derive(Debug, Clone)]
pub struct DeanonymizeOutput {
    pub pages: Vec<PageText>,
    pub warnings: Vec<UnmappedSurrogateWarning>,
    pub replacements: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pii_type: PiiType, original: &str, page_index: usize) -> DetectionRecord {
        DetectionRecord {
            pii_type,
            original_value: original.into(),
            surrogate_value: format!("S({original})"),
            page_index,
            start_offset: 0,
            end_offset: original.chars().count(),
            redaction_boxes: Vec::new(),
        }
    }

    #[test]
    fn test_linear_transitions() {
        let s = RunState::Init.advance(RunState::SpansResolved).unwrap();
        let s = s.advance(RunState::Substituted).unwrap();
        let s = s.advance(RunState::Projected).unwrap();
        assert_eq!(s.advance(RunState::Finalized).unwrap(), RunState::Finalized);
    }

    #[test]
    fn test_no_branching_back() {
        assert!(RunState::Substituted.advance(RunState::SpansResolved).is_err());
        assert!(RunState::Finalized.advance(RunState::Init).is_err());
        assert!(RunState::Init.advance(RunState::Finalized).is_err());
        assert!(RunState::Projected.advance(RunState::Projected).is_err());
    }

    #[test]
    fn test_report_summary() {
        let report = DetectionReport::new(
            "doc",
            vec![
                record(PiiType::Name, "Jane Doe", 0),
                record(PiiType::Name, "Jane Doe", 1),
                record(PiiType::Name, "John Roe", 1),
                record(PiiType::Email, "j@x.com", 3),
            ],
        );
        assert_eq!(report.total_occurrences(), 4);
        assert_eq!(
            report.summary[&PiiType::Name],
            TypeSummary {
                occurrences: 3,
                unique_values: 2
            }
        );
        assert_eq!(report.pages_with_pii().into_iter().collect::<Vec<_>>(), vec![0, 1, 3]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["EMAIL"]["occurrences"], 1);
    }
}
