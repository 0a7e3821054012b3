//! Deid Ingest — document loading and export.

pub mod document;
pub mod export;

pub use document::{collect_inputs, load_document, parse_json_document, split_paged_text, InputKind, LoadedDocument};
pub use export::{
    render_paged_text, render_text_report, write_processed, write_report, write_restore_report,
    OutputFormat, ProcessedDocument, RedactionPlan, RestoreReport,
};
