//! Loading parsed documents handed over by the parsing and recognition layer.
//!
//! Recognizer output is loosely shaped; everything is normalized here into
//! [`PageInput`] with closed [`PiiType`] labels before it reaches the engine.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use deid_core::{BBox, CandidateSpan, CharBox, Error, PageInput, PageText, PiiType, Result};

static PAGE_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--- Page (\d+) ---\n").unwrap());

/// Input formats accepted by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Parsed-document JSON: pages with text, char boxes and entities.
    ParsedJson,
    /// Plain text, optionally split by `--- Page N ---` headers.
    PlainText,
    Unsupported,
}

impl InputKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "json" => Self::ParsedJson,
            "txt" | "text" | "md" => Self::PlainText,
            _ => Self::Unsupported,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::from_extension(path.extension().and_then(|e| e.to_str()).unwrap_or(""))
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// A normalized, validated document.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub source_document: String,
    pub kind: InputKind,
    pub pages: Vec<PageInput>,
}

impl LoadedDocument {
    pub fn page_texts(&self) -> Vec<PageText> {
        self.pages
            .iter()
            .map(|p| PageText::new(p.page_index, p.text.clone()))
            .collect()
    }

    pub fn candidate_count(&self) -> usize {
        self.pages.iter().map(|p| p.candidates.len()).sum()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInput {
    Document(RawDocument),
    Pages(Vec<RawPage>),
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default, alias = "source", alias = "filename")]
    source_document: Option<String>,
    pages: Vec<RawPage>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default, alias = "page", alias = "page_number")]
    page_index: Option<usize>,
    text: String,
    #[serde(default, alias = "char_boxes", alias = "characters")]
    chars: Vec<RawChar>,
    #[serde(default, alias = "entities", alias = "spans")]
    candidates: Vec<RawEntity>,
}

#[derive(Debug, Deserialize)]
struct RawChar {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    bbox: Option<RawBBox>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBBox {
    Array([f64; 4]),
    Object(BBox),
}

impl From<RawBBox> for BBox {
    fn from(raw: RawBBox) -> Self {
        match raw {
            RawBBox::Array([x0, y0, x1, y1]) => BBox::new(x0, y0, x1, y1),
            RawBBox::Object(b) => b,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(alias = "start")]
    start_offset: usize,
    #[serde(alias = "end")]
    end_offset: usize,
    #[serde(rename = "type", alias = "entity_type", alias = "label")]
    label: String,
    #[serde(default = "default_confidence", alias = "score")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// Load and normalize the document at `path`.
pub fn load_document(path: &Path) -> Result<LoadedDocument> {
    let kind = InputKind::from_path(path);
    let fallback_source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();

    let doc = match kind {
        InputKind::ParsedJson => {
            let raw = std::fs::read_to_string(path)?;
            parse_json_document(&raw, &fallback_source)?
        }
        InputKind::PlainText => {
            let raw = std::fs::read_to_string(path)?;
            LoadedDocument {
                source_document: fallback_source,
                kind,
                pages: split_paged_text(&raw)
                    .into_iter()
                    .map(|p| PageInput::new(p.page_index, p.text))
                    .collect(),
            }
        }
        InputKind::Unsupported => {
            return Err(Error::InvalidInput(format!(
                "unsupported input format: {}",
                path.display()
            )))
        }
    };

    debug!(
        "Loaded {}: {} pages, {} candidate spans",
        path.display(),
        doc.pages.len(),
        doc.candidate_count()
    );
    Ok(doc)
}

/// Parse a parsed-document JSON string.
pub fn parse_json_document(raw: &str, fallback_source: &str) -> Result<LoadedDocument> {
    let input: RawInput = serde_json::from_str(raw)
        .map_err(|e| Error::InvalidInput(format!("malformed document JSON: {e}")))?;
    let (source, raw_pages) = match input {
        RawInput::Document(doc) => (doc.source_document, doc.pages),
        RawInput::Pages(pages) => (None, pages),
    };

    let mut seen = HashSet::new();
    let mut pages = Vec::with_capacity(raw_pages.len());
    for (position, raw_page) in raw_pages.into_iter().enumerate() {
        let page = normalize_page(position, raw_page)?;
        if !seen.insert(page.page_index) {
            return Err(Error::InvalidInput(format!(
                "duplicate page index {}",
                page.page_index
            )));
        }
        pages.push(page);
    }

    Ok(LoadedDocument {
        source_document: source.unwrap_or_else(|| fallback_source.to_string()),
        kind: InputKind::ParsedJson,
        pages,
    })
}

fn normalize_page(position: usize, raw: RawPage) -> Result<PageInput> {
    let page_index = raw.page_index.unwrap_or(position);
    let page_chars = raw.text.chars().count();

    // The projector binary-searches boxes by index.
    let mut chars: Vec<CharBox> = raw
        .chars
        .into_iter()
        .enumerate()
        .map(|(i, c)| CharBox {
            index: c.index.unwrap_or(i),
            bbox: c.bbox.map(BBox::from),
        })
        .collect();
    chars.sort_by_key(|c| c.index);
    if let Some(pair) = chars.windows(2).find(|w| w[0].index == w[1].index) {
        return Err(Error::InvalidInput(format!(
            "page {page_index}: duplicate char box index {}",
            pair[0].index
        )));
    }

    let mut candidates = Vec::with_capacity(raw.candidates.len());
    for entity in raw.candidates {
        let pii_type = PiiType::from_label(&entity.label);
        if pii_type == PiiType::Other && !entity.label.eq_ignore_ascii_case("OTHER") {
            debug!("Label {:?} folded to OTHER", entity.label);
        }
        let span = CandidateSpan::new(
            page_index,
            entity.start_offset,
            entity.end_offset,
            pii_type,
            entity.confidence,
        );
        span.validate(page_chars)?;
        candidates.push(span);
    }

    Ok(PageInput {
        page_index,
        text: raw.text,
        chars,
        candidates,
    })
}

/// Split text written with `--- Page N ---` headers back into pages.
///
/// Header numbers are 1-based; text without headers is a single page 0.
pub fn split_paged_text(raw: &str) -> Vec<PageText> {
    let headers: Vec<(usize, usize, usize)> = PAGE_HEADER_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number: usize = caps[1].parse().ok()?;
            Some((whole.start(), whole.end(), number.saturating_sub(1)))
        })
        .collect();

    if headers.is_empty() || headers[0].0 != 0 {
        return vec![PageText::new(0, raw)];
    }

    headers
        .iter()
        .enumerate()
        .map(|(i, &(_, body_start, page_index))| {
            let body_end = headers.get(i + 1).map(|h| h.0).unwrap_or(raw.len());
            let body = &raw[body_start..body_end];
            let body = body.strip_suffix('\n').unwrap_or(body);
            PageText::new(page_index, body)
        })
        .collect()
}

/// Supported files directly inside `dir`, sorted by name. Unsupported
/// files are skipped with a warning.
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if InputKind::from_path(&path).is_supported() {
            inputs.push(path);
        } else {
            warn!("Skipping unsupported file: {}", path.display());
        }
    }
    inputs.sort();
    Ok(inputs)
}
