//! Greedy interval sweep over candidate spans.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use deid_core::{CandidateSpan, DeidConfig, PiiType, ResolvedSpan};

/// Span resolver configured with a confidence threshold and type filter.
#[derive(Debug, Clone)]
pub struct SpanResolver {
    threshold: f64,
    enabled_types: Vec<PiiType>,
}

impl SpanResolver {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            enabled_types: PiiType::all().to_vec(),
        }
    }

    pub fn from_config(config: &DeidConfig) -> Self {
        Self {
            threshold: config.confidence_threshold,
            enabled_types: config.enabled_types.clone(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Resolve candidates from any number of pages.
    ///
    /// Output is in canonical order: page index, then start offset.
    pub fn resolve(&self, candidates: &[CandidateSpan]) -> Vec<ResolvedSpan> {
        let mut by_page: BTreeMap<usize, Vec<CandidateSpan>> = BTreeMap::new();
        for c in candidates {
            by_page.entry(c.page_index).or_default().push(c.clone());
        }
        by_page
            .into_values()
            .flat_map(|page| self.resolve_page(&page))
            .collect()
    }

    /// Resolve the candidates of a single page.
    pub fn resolve_page(&self, candidates: &[CandidateSpan]) -> Vec<ResolvedSpan> {
        let mut kept: Vec<&CandidateSpan> = candidates
            .iter()
            .filter(|c| {
                let keep = c.confidence >= self.threshold
                    && !c.is_empty()
                    && self.enabled_types.contains(&c.pii_type);
                if !keep {
                    debug!(
                        "Dropped {} [{}, {}) conf={:.2}",
                        c.pii_type, c.start_offset, c.end_offset, c.confidence
                    );
                }
                keep
            })
            .collect();

        kept.sort_by(|a, b| compare_candidates(a, b));

        let mut resolved = Vec::with_capacity(kept.len());
        let mut last_end = 0;
        for c in kept {
            if c.start_offset < last_end {
                debug!(
                    "Overlap: discarded {} [{}, {})",
                    c.pii_type, c.start_offset, c.end_offset
                );
                continue;
            }
            last_end = c.end_offset;
            resolved.push(ResolvedSpan::from(c));
        }
        resolved
    }
}

/// Start ascending, end descending, confidence descending, then type priority.
fn compare_candidates(a: &CandidateSpan, b: &CandidateSpan) -> Ordering {
    a.start_offset
        .cmp(&b.start_offset)
        .then(b.end_offset.cmp(&a.end_offset))
        .then(b.confidence.total_cmp(&a.confidence))
        .then(a.pii_type.priority().cmp(&b.pii_type.priority()))
}
