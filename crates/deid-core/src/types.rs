//! Data model shared by the resolver, store, projector and engine.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Closed set of PII categories handled by the core.
///
/// Labels from external recognizers are folded into this set with
/// [`PiiType::from_label`]; anything unrecognized becomes `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiType {
    Name,
    Phone,
    Email,
    Ssn,
    Address,
    Date,
    Other,
}

impl PiiType {
    pub fn all() -> &'static [PiiType] {
        &[
            Self::Name,
            Self::Phone,
            Self::Email,
            Self::Ssn,
            Self::Address,
            Self::Date,
            Self::Other,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "NAME",
            Self::Phone => "PHONE",
            Self::Email => "EMAIL",
            Self::Ssn => "SSN",
            Self::Address => "ADDRESS",
            Self::Date => "DATE",
            Self::Other => "OTHER",
        }
    }

    /// Normalize a recognizer label. Case-insensitive; unknown labels fold to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "NAME" | "PERSON" | "PER" | "PERSON_NAME" => Self::Name,
            "PHONE" | "PHONE_NUMBER" | "TELEPHONE" => Self::Phone,
            "EMAIL" | "EMAIL_ADDRESS" => Self::Email,
            "SSN" | "US_SSN" => Self::Ssn,
            "ADDRESS" | "LOCATION" | "STREET_ADDRESS" | "POSTAL_ADDRESS" => Self::Address,
            "DATE" | "DATE_TIME" | "DOB" | "DATE_OF_BIRTH" => Self::Date,
            _ => Self::Other,
        }
    }

    /// Resolver tie-break rank; lower wins.
    ///
    /// Higher-sensitivity types have lower false-positive tolerance.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Ssn => 0,
            Self::Email => 1,
            Self::Phone => 2,
            Self::Address => 3,
            Self::Name => 4,
            Self::Date => 5,
            Self::Other => 6,
        }
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl<'de> Deserialize<'de> for PiiType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// A candidate PII span proposed by the external recognizer.
///
/// Offsets are half-open character (not byte) indices into the page text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSpan {
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub confidence: f64,
    pub page_index: usize,
}

impl CandidateSpan {
    pub fn new(
        page_index: usize,
        start_offset: usize,
        end_offset: usize,
        pii_type: PiiType,
        confidence: f64,
    ) -> Self {
        Self {
            start_offset,
            end_offset,
            pii_type,
            confidence,
            page_index,
        }
    }

    pub fn len(&self) -> usize {
        self.end_offset.saturating_sub(self.start_offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the span against the character length of its page.
    pub fn validate(&self, page_chars: usize) -> Result<()> {
        if self.start_offset >= self.end_offset {
            return Err(Error::InvalidInput(format!(
                "page {}: empty or inverted span [{}, {})",
                self.page_index, self.start_offset, self.end_offset
            )));
        }
        if self.end_offset > page_chars {
            return Err(Error::InvalidInput(format!(
                "page {}: span [{}, {}) exceeds page length {}",
                self.page_index, self.start_offset, self.end_offset, page_chars
            )));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidInput(format!(
                "page {}: confidence {} outside [0, 1]",
                self.page_index, self.confidence
            )));
        }
        Ok(())
    }
}

/// A span selected by the resolver. Pairwise non-overlapping within a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSpan {
    pub page_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub confidence: f64,
}

impl ResolvedSpan {
    pub fn overlaps(&self, other: &ResolvedSpan) -> bool {
        self.page_index == other.page_index
            && self.start_offset < other.end_offset
            && other.start_offset < self.end_offset
    }
}

impl From<&CandidateSpan> for ResolvedSpan {
    fn from(c: &CandidateSpan) -> Self {
        Self {
            page_index: c.page_index,
            start_offset: c.start_offset,
            end_offset: c.end_offset,
            pii_type: c.pii_type,
            confidence: c.confidence,
        }
    }
}

/// One row of the mapping store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub original_value: String,
    pub surrogate_value: String,
    pub occurrence_count: u64,
}

/// Per-occurrence detection emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub original_value: String,
    pub surrogate_value: String,
    pub page_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redaction_boxes: Vec<RedactionBox>,
}

/// Axis-aligned rectangle in page coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn is_valid(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1].iter().all(|v| v.is_finite())
            && self.x1 >= self.x0
            && self.y1 >= self.y0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn mid_y(&self) -> f64 {
        (self.y0 + self.y1) / 2.0
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Position of one character of the page text, as reported by the parser.
///
/// `bbox` is `None` for characters the parser injected without geometry
/// (synthesized spaces, line breaks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharBox {
    pub index: usize,
    #[serde(default)]
    pub bbox: Option<BBox>,
}

/// Visual redaction rectangle for one resolved span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedactionBox {
    pub page_index: usize,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl RedactionBox {
    pub fn from_bbox(page_index: usize, b: &BBox) -> Self {
        Self {
            page_index,
            x0: b.x0,
            y0: b.y0,
            x1: b.x1,
            y1: b.y1,
        }
    }
}

/// One page handed to the engine: text, geometry and recognizer output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInput {
    pub page_index: usize,
    pub text: String,
    #[serde(default)]
    pub chars: Vec<CharBox>,
    #[serde(default)]
    pub candidates: Vec<CandidateSpan>,
}

impl PageInput {
    pub fn new(page_index: usize, text: impl Into<String>) -> Self {
        Self {
            page_index,
            text: text.into(),
            ..Default::default()
        }
    }

    /// Add a candidate span on this page.
    pub fn with_candidate(
        mut self,
        start_offset: usize,
        end_offset: usize,
        pii_type: PiiType,
        confidence: f64,
    ) -> Self {
        self.candidates.push(CandidateSpan::new(
            self.page_index,
            start_offset,
            end_offset,
            pii_type,
            confidence,
        ));
        self
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Page text only, as consumed by deanonymize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page_index: usize,
    pub text: String,
}

impl PageText {
    pub fn new(page_index: usize, text: impl Into<String>) -> Self {
        Self {
            page_index,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_normalization() {
        assert_eq!(PiiType::from_label("PERSON"), PiiType::Name);
        assert_eq!(PiiType::from_label("email_address"), PiiType::Email);
        assert_eq!(PiiType::from_label("US_SSN"), PiiType::Ssn);
        assert_eq!(PiiType::from_label("LOCATION"), PiiType::Address);
        assert_eq!(PiiType::from_label("DATE_TIME"), PiiType::Date);
        assert_eq!(PiiType::from_label("CREDIT_CARD"), PiiType::Other);
        assert_eq!(PiiType::from_label(""), PiiType::Other);
    }

    #[test]
    fn test_unknown_type_deserializes_to_other() {
        let span: CandidateSpan = serde_json::from_str(
            r#"{"start_offset":0,"end_offset":4,"type":"IBAN_CODE","confidence":0.8,"page_index":0}"#,
        )
        .unwrap();
        assert_eq!(span.pii_type, PiiType::Other);
    }

    #[test]
    fn test_priority_order() {
        let mut types = PiiType::all().to_vec();
        types.sort_by_key(|t| t.priority());
        assert_eq!(
            types,
            vec![
                PiiType::Ssn,
                PiiType::Email,
                PiiType::Phone,
                PiiType::Address,
                PiiType::Name,
                PiiType::Date,
                PiiType::Other,
            ]
        );
    }

    #[test]
    fn test_span_validation() {
        assert!(CandidateSpan::new(0, 0, 4, PiiType::Name, 0.9).validate(4).is_ok());
        assert!(CandidateSpan::new(0, 4, 4, PiiType::Name, 0.9).validate(10).is_err());
        assert!(CandidateSpan::new(0, 2, 11, PiiType::Name, 0.9).validate(10).is_err());
        assert!(CandidateSpan::new(0, 0, 2, PiiType::Name, 1.5).validate(10).is_err());
        assert!(CandidateSpan::new(0, 0, 2, PiiType::Name, f64::NAN).validate(10).is_err());
    }

    #[test]
    fn test_bbox_union() {
        let a = BBox::new(10.0, 100.0, 20.0, 110.0);
        let b = BBox::new(20.0, 99.0, 35.0, 111.0);
        assert_eq!(a.union(&b), BBox::new(10.0, 99.0, 35.0, 111.0));
        assert!(!BBox::new(5.0, 0.0, 1.0, 1.0).is_valid());
    }
}
