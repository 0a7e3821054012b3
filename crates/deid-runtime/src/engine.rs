//! Transform engine: runs resolver, store, generator and projector over a document.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::matcher::SurrogateMatcher;
use crate::types::*;
use deid_core::{
    DeidConfig, DetectionRecord, Error, PageInput, PageText, PiiType, RedactionBox, ResolvedSpan,
    Result,
};
use deid_layout::CoordinateProjector;
use deid_resolve::SpanResolver;
use deid_store::{MappingStore, SnapshotSink};
use deid_surrogate::SurrogateGenerator;

/// Runs anonymize and deanonymize over whole documents.
///
/// The engine holds no per-document state; every run receives or creates
/// its own [`MappingStore`], so one engine can serve documents in parallel.
pub struct DeidEngine {
    config: DeidConfig,
    resolver: SpanResolver,
    generator: SurrogateGenerator,
    projector: CoordinateProjector,
}

impl DeidEngine {
    pub fn new(config: DeidConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "DeidEngine initialized: threshold={}, max_attempts={}, projection={}",
            config.confidence_threshold, config.max_surrogate_attempts, config.project_boxes
        );
        Ok(Self {
            resolver: SpanResolver::from_config(&config),
            generator: SurrogateGenerator::new(&config),
            projector: CoordinateProjector::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &DeidConfig {
        &self.config
    }

    /// Anonymize a document starting from an empty store.
    pub fn anonymize(&self, source_document: &str, pages: &[PageInput]) -> Result<AnonymizeOutput> {
        self.run_anonymize(pages, MappingStore::new(source_document), None)
    }

    /// Anonymize reusing the mappings of `store`. The input store is left
    /// untouched; the updated copy is returned in the output.
    pub fn anonymize_with_store(
        &self,
        pages: &[PageInput],
        store: &MappingStore,
    ) -> Result<AnonymizeOutput> {
        self.run_anonymize(pages, store.clone(), None)
    }

    /// Anonymize and persist the resulting snapshot to `sink` once the run
    /// is finalized. Nothing is persisted if any stage fails.
    pub fn anonymize_and_persist(
        &self,
        pages: &[PageInput],
        store: MappingStore,
        sink: &dyn SnapshotSink,
    ) -> Result<AnonymizeOutput> {
        self.run_anonymize(pages, store, Some(sink))
    }

    fn run_anonymize(
        &self,
        pages: &[PageInput],
        mut store: MappingStore,
        sink: Option<&dyn SnapshotSink>,
    ) -> Result<AnonymizeOutput> {
        let mut state = RunState::Init;
        validate_pages(pages)?;

        let mut ordered: Vec<&PageInput> = pages.iter().collect();
        ordered.sort_by_key(|p| p.page_index);

        // Fan out: resolution only reads its own page.
        let resolved: Vec<Vec<ResolvedSpan>> = ordered
            .par_iter()
            .map(|page| self.resolver.resolve_page(&page.candidates))
            .collect();
        state = state.advance(RunState::SpansResolved)?;

        // Text outside detected spans. A surrogate found there would be
        // restored by mistake on deanonymize.
        let residual: Vec<String> = ordered
            .par_iter()
            .zip(resolved.par_iter())
            .map(|(page, spans)| residual_text(&page.text, spans))
            .collect();

        // Fan in: store mutation strictly in canonical order.
        let mut out_pages: Vec<PageText> = Vec::with_capacity(ordered.len());
        let mut records: Vec<Vec<DetectionRecord>> = Vec::with_capacity(ordered.len());
        for (i, (page, spans)) in ordered.iter().zip(&resolved).enumerate() {
            let (text, page_records) =
                self.substitute_reversibly(page, spans, &mut store, &residual, i, &out_pages)?;
            out_pages.push(PageText::new(page.page_index, text));
            records.push(page_records);
        }
        state = state.advance(RunState::Substituted)?;

        if self.config.project_boxes {
            let boxes: Vec<Vec<Vec<RedactionBox>>> = ordered
                .par_iter()
                .zip(resolved.par_iter())
                .map(|(page, spans)| self.projector.project_page(spans, &page.chars))
                .collect();
            for (page_records, page_boxes) in records.iter_mut().zip(boxes) {
                for (record, span_boxes) in page_records.iter_mut().zip(page_boxes) {
                    record.redaction_boxes = span_boxes;
                }
            }
            state = state.advance(RunState::Projected)?;
        }

        let report = DetectionReport::new(
            store.source_document(),
            records.into_iter().flatten().collect(),
        );
        state.advance(RunState::Finalized)?;
        if let Some(sink) = sink {
            sink.persist(&store.snapshot())?;
        }

        info!(
            "Anonymized {}: {} pages ({} with PII), {} substitutions, {} mappings",
            store.source_document(),
            out_pages.len(),
            report.pages_with_pii().len(),
            report.total_occurrences(),
            store.len()
        );
        Ok(AnonymizeOutput {
            pages: out_pages,
            report,
            store,
        })
    }

    /// Substitute one page so that deanonymize restores it exactly.
    ///
    /// New surrogates must not occur in undetected text or in pages already
    /// produced, which keeps earlier pages restorable. A new surrogate can
    /// still combine with neighbouring text into a longer known surrogate,
    /// so the page is checked against the updated store and substituted
    /// again from later attempts until it round-trips.
    fn substitute_reversibly(
        &self,
        page: &PageInput,
        spans: &[ResolvedSpan],
        store: &mut MappingStore,
        residual: &[String],
        position: usize,
        produced: &[PageText],
    ) -> Result<(String, Vec<DetectionRecord>)> {
        let avoid = |candidate: &str| {
            residual.iter().any(|t| t.contains(candidate))
                || produced.iter().any(|p| p.text.contains(candidate))
        };

        // Known surrogates already in the undetected text are restored on
        // deanonymize whatever we choose here.
        let verify = !store.surrogates().any(|s| residual[position].contains(s));
        if !verify {
            warn!(
                "Page {} contains known surrogates outside detected spans and will not restore exactly",
                page.page_index
            );
        }

        for first_attempt in 0..self.generator.max_attempts() {
            let mut trial = store.clone();
            let (text, page_records) =
                self.substitute_page(page, spans, &mut trial, &avoid, first_attempt)?;
            let restores = !verify
                || trial.len() == store.len()
                || SurrogateMatcher::new(&trial)?.restore(&text).0 == page.text;
            if restores {
                *store = trial;
                return Ok((text, page_records));
            }
            debug!(
                "Page {} does not restore cleanly, retrying from attempt {}",
                page.page_index,
                first_attempt + 1
            );
        }

        Err(Error::SurrogateExhausted {
            pii_type: spans.first().map_or(PiiType::Other, |s| s.pii_type),
            attempts: self.generator.max_attempts(),
        })
    }

    /// Rebuild one page in a single left-to-right pass over the original
    /// offsets. `spans` are sorted and non-overlapping.
    fn substitute_page(
        &self,
        page: &PageInput,
        spans: &[ResolvedSpan],
        store: &mut MappingStore,
        avoid: &dyn Fn(&str) -> bool,
        first_attempt: usize,
    ) -> Result<(String, Vec<DetectionRecord>)> {
        let offsets = byte_offsets(&page.text);
        let mut out = String::with_capacity(page.text.len());
        let mut records = Vec::with_capacity(spans.len());
        let mut cursor = 0;

        for span in spans {
            let start = offsets[span.start_offset];
            let end = offsets[span.end_offset];
            let original = &page.text[start..end];

            let existing = store
                .lookup_surrogate(span.pii_type, original)
                .map(str::to_string);
            let surrogate = match existing {
                Some(surrogate) => {
                    store.increment_occurrence(span.pii_type, original)?;
                    surrogate
                }
                None => {
                    let surrogate = self.generator.generate_from(
                        span.pii_type,
                        original,
                        store,
                        avoid,
                        first_attempt,
                    )?;
                    store.insert(span.pii_type, original, &surrogate)?;
                    surrogate
                }
            };
            debug!(
                "Page {} [{}, {}) {} -> {:?}",
                page.page_index, span.start_offset, span.end_offset, span.pii_type, surrogate
            );

            out.push_str(&page.text[cursor..start]);
            out.push_str(&surrogate);
            cursor = end;

            records.push(DetectionRecord {
                pii_type: span.pii_type,
                original_value: original.to_string(),
                surrogate_value: surrogate,
                page_index: page.page_index,
                start_offset: span.start_offset,
                end_offset: span.end_offset,
                redaction_boxes: Vec::new(),
            });
        }
        out.push_str(&page.text[cursor..]);
        Ok((out, records))
    }

    /// Restore original text. The store is only read.
    pub fn deanonymize(&self, pages: &[PageText], store: &MappingStore) -> Result<DeanonymizeOutput> {
        let state = RunState::Init;
        let matcher = SurrogateMatcher::new(store)?;

        let restored: Vec<(PageText, usize, Vec<UnmappedSurrogateWarning>)> = pages
            .par_iter()
            .map(|page| {
                let (text, count) = matcher.restore(&page.text);
                let warnings = matcher.unmapped(page.page_index, &page.text);
                (PageText::new(page.page_index, text), count, warnings)
            })
            .collect();
        let state = state.advance(RunState::Substituted)?;

        let mut out_pages = Vec::with_capacity(restored.len());
        let mut warnings = Vec::new();
        let mut replacements = 0;
        for (page, count, page_warnings) in restored {
            out_pages.push(page);
            replacements += count;
            warnings.extend(page_warnings);
        }
        for w in &warnings {
            warn!(
                "Unmapped surrogate-like token on page {} at offset {}",
                w.page_index, w.char_offset
            );
        }
        state.advance(RunState::Finalized)?;

        info!(
            "Deanonymized {}: {} pages, {} replacements, {} warnings",
            store.source_document(),
            out_pages.len(),
            replacements,
            warnings.len()
        );
        Ok(DeanonymizeOutput {
            pages: out_pages,
            warnings,
            replacements,
        })
    }
}

/// Reject malformed input before any store mutation.
fn validate_pages(pages: &[PageInput]) -> Result<()> {
    let mut seen = HashSet::new();
    for page in pages {
        if !seen.insert(page.page_index) {
            return Err(Error::InvalidInput(format!(
                "duplicate page index {}",
                page.page_index
            )));
        }
        let page_chars = page.char_len();
        for candidate in &page.candidates {
            if candidate.page_index != page.page_index {
                return Err(Error::InvalidInput(format!(
                    "span for page {} listed under page {}",
                    candidate.page_index, page.page_index
                )));
            }
            candidate.validate(page_chars)?;
        }
    }
    Ok(())
}

/// Byte offset of every character, plus the text length as a final entry.
fn byte_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// Page text with every span cut out, joined by NUL so that no candidate
/// can match across a cut.
fn residual_text(text: &str, spans: &[ResolvedSpan]) -> String {
    let offsets = byte_offsets(text);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&text[cursor..offsets[span.start_offset]]);
        out.push('\0');
        cursor = offsets[span.end_offset];
    }
    out.push_str(&text[cursor..]);
    out
}
