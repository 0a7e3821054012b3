//! Output writers: processed text, detection reports and the redaction plan.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use deid_core::{PageText, PiiType, Result};
use deid_layout::{highlight_color, Rgb};
use deid_runtime::{DetectionReport, UnmappedSurrogateWarning};

/// Format of the processed-text output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Txt,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Txt => "txt",
        }
    }
}

/// Processed document in the input's JSON shape, without spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub source_document: String,
    pub pages: Vec<PageText>,
}

/// Render pages with 1-based `--- Page N ---` headers.
pub fn render_paged_text(pages: &[PageText]) -> String {
    let mut out = String::new();
    for page in pages {
        let _ = writeln!(out, "--- Page {} ---", page.page_index + 1);
        out.push_str(&page.text);
        out.push('\n');
    }
    out
}

pub fn write_processed(
    path: &Path,
    source_document: &str,
    pages: &[PageText],
    format: OutputFormat,
) -> Result<()> {
    let body = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&ProcessedDocument {
            source_document: source_document.to_string(),
            pages: pages.to_vec(),
        })?,
        OutputFormat::Txt => render_paged_text(pages),
    };
    std::fs::write(path, body)?;
    info!("Wrote processed text to {}", path.display());
    Ok(())
}

/// Plain-text detection report: one line per occurrence, then a summary.
pub fn render_text_report(report: &DetectionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "De-identification report: {}", report.source_document);
    let _ = writeln!(out, "Total detections: {}", report.total_occurrences());
    out.push('\n');

    for record in &report.records {
        let _ = writeln!(
            out,
            "[Page {}] {} [{}, {}): {:?} -> {:?}",
            record.page_index + 1,
            record.pii_type,
            record.start_offset,
            record.end_offset,
            record.original_value,
            record.surrogate_value
        );
    }

    out.push_str("\nSummary:\n");
    for (pii_type, summary) in &report.summary {
        let _ = writeln!(
            out,
            "  {}: {} occurrences, {} unique",
            pii_type, summary.occurrences, summary.unique_values
        );
    }
    out
}

pub fn write_report(json_path: &Path, txt_path: &Path, report: &DetectionReport) -> Result<()> {
    std::fs::write(json_path, serde_json::to_string_pretty(report)?)?;
    std::fs::write(txt_path, render_text_report(report))?;
    info!(
        "Wrote detection report ({} records) to {}",
        report.records.len(),
        json_path.display()
    );
    Ok(())
}

/// Deanonymize warnings, written next to the restored text.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport<'a> {
    pub source_document: &'a str,
    pub replacements: usize,
    pub warnings: &'a [UnmappedSurrogateWarning],
}

pub fn write_restore_report(path: &Path, report: &RestoreReport<'_>) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

/// One rectangle for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedBox {
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub color: Rgb,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRedactions {
    pub page_index: usize,
    pub boxes: Vec<PlannedBox>,
}

/// Rectangles to draw, grouped by page in ascending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionPlan {
    pub source_document: String,
    pub pages: Vec<PageRedactions>,
}

impl RedactionPlan {
    pub fn from_report(report: &DetectionReport) -> Self {
        let mut pages: Vec<PageRedactions> = Vec::new();
        for record in &report.records {
            for b in &record.redaction_boxes {
                let planned = PlannedBox {
                    pii_type: record.pii_type,
                    color: highlight_color(record.pii_type),
                    x0: b.x0,
                    y0: b.y0,
                    x1: b.x1,
                    y1: b.y1,
                };
                match pages.iter_mut().find(|p| p.page_index == b.page_index) {
                    Some(page) => page.boxes.push(planned),
                    None => pages.push(PageRedactions {
                        page_index: b.page_index,
                        boxes: vec![planned],
                    }),
                }
            }
        }
        pages.sort_by_key(|p| p.page_index);
        Self {
            source_document: report.source_document.clone(),
            pages,
        }
    }

    pub fn box_count(&self) -> usize {
        self.pages.iter().map(|p| p.boxes.len()).sum()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(
            "Wrote redaction plan ({} boxes) to {}",
            self.box_count(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::split_paged_text;
    use deid_core::{DetectionRecord, RedactionBox};

    fn record(page_index: usize, pii_type: PiiType, boxes: usize) -> DetectionRecord {
        DetectionRecord {
            pii_type,
            original_value: "Jane Doe".into(),
            surrogate_value: "Maria Lopez".into(),
            page_index,
            start_offset: 5,
            end_offset: 13,
            redaction_boxes: (0..boxes)
                .map(|i| RedactionBox {
                    page_index,
                    x0: 10.0,
                    y0: 14.0 * i as f64,
                    x1: 60.0,
                    y1: 14.0 * i as f64 + 12.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_paged_text_round_trips() {
        let pages = vec![
            PageText::new(0, "first page\n"),
            PageText::new(1, ""),
            PageText::new(2, "last"),
        ];
        let rendered = render_paged_text(&pages);
        assert!(rendered.starts_with("--- Page 1 ---\n"));
        assert_eq!(split_paged_text(&rendered), pages);
    }

    #[test]
    fn test_text_report_lists_every_record() {
        let report = DetectionReport::new(
            "doc.pdf",
            vec![record(0, PiiType::Name, 0), record(1, PiiType::Name, 0)],
        );
        let text = render_text_report(&report);
        assert!(text.contains("Total detections: 2"));
        assert!(text.contains("[Page 2] NAME [5, 13): \"Jane Doe\" -> \"Maria Lopez\""));
        assert!(text.contains("NAME: 2 occurrences, 1 unique"));
    }

    #[test]
    fn test_redaction_plan_groups_by_page() {
        let report = DetectionReport::new(
            "doc.pdf",
            vec![
                record(2, PiiType::Email, 1),
                record(0, PiiType::Name, 2),
                record(2, PiiType::Ssn, 0),
            ],
        );
        let plan = RedactionPlan::from_report(&report);
        assert_eq!(plan.box_count(), 3);
        let pages: Vec<usize> = plan.pages.iter().map(|p| p.page_index).collect();
        assert_eq!(pages, vec![0, 2]);
        assert_eq!(plan.pages[1].boxes[0].color, highlight_color(PiiType::Email));
    }

    #[test]
    fn test_write_processed_json_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_processed.json");
        let pages = vec![PageText::new(0, "Hello Maria Lopez")];
        write_processed(&path, "doc.pdf", &pages, OutputFormat::Json).unwrap();

        let doc = crate::document::load_document(&path).unwrap();
        assert_eq!(doc.source_document, "doc.pdf");
        assert_eq!(doc.page_texts(), pages);
    }
}
