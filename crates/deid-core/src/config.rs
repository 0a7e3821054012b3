//! Run configuration and output path management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::PiiType;

/// Largest accepted `date_shift_days` magnitude (about ten thousand years).
pub const MAX_DATE_SHIFT_DAYS: u64 = 3_650_000;

/// How overlapping surrogate strings are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurrogateMatchPolicy {
    /// Deanonymize prefers the longest surrogate at each position.
    #[default]
    LongestFirst,
    /// Additionally refuse to mint a surrogate that contains, or is contained
    /// in, an existing surrogate.
    RejectNested,
}

/// Tunables for one de-identification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeidConfig {
    /// Spans below this confidence are discarded by the resolver.
    pub confidence_threshold: f64,
    /// Retry budget of the surrogate generator per entity.
    pub max_surrogate_attempts: usize,
    /// Vertical tolerance (page units) for merging character boxes into a line.
    pub line_tolerance: f64,
    /// Fixed day shift for every parseable date (offset-preserving mode).
    pub date_shift_days: Option<i64>,
    /// Mixed into the surrogate seed.
    pub surrogate_salt: String,
    pub match_policy: SurrogateMatchPolicy,
    /// Types to de-identify; spans of other types are dropped.
    pub enabled_types: Vec<PiiType>,
    /// Whether anonymize projects spans onto page coordinates.
    pub project_boxes: bool,
}

impl Default for DeidConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            max_surrogate_attempts: 1000,
            line_tolerance: 2.0,
            date_shift_days: None,
            surrogate_salt: String::new(),
            match_policy: SurrogateMatchPolicy::LongestFirst,
            enabled_types: PiiType::all().to_vec(),
            project_boxes: true,
        }
    }
}

impl DeidConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `DEID_*` environment overrides on top of `self`.
    pub fn from_env(mut self) -> Result<Self> {
        if let Some(v) = env_var("DEID_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_env("DEID_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = env_var("DEID_MAX_SURROGATE_ATTEMPTS") {
            self.max_surrogate_attempts = parse_env("DEID_MAX_SURROGATE_ATTEMPTS", &v)?;
        }
        if let Some(v) = env_var("DEID_DATE_SHIFT_DAYS") {
            self.date_shift_days = Some(parse_env("DEID_DATE_SHIFT_DAYS", &v)?);
        }
        if let Some(v) = env_var("DEID_SURROGATE_SALT") {
            self.surrogate_salt = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.max_surrogate_attempts == 0 {
            return Err(Error::Config("max_surrogate_attempts must be > 0".into()));
        }
        if let Some(days) = self.date_shift_days {
            if days.unsigned_abs() > MAX_DATE_SHIFT_DAYS {
                return Err(Error::Config(format!(
                    "date_shift_days {days} outside ±{MAX_DATE_SHIFT_DAYS}"
                )));
            }
        }
        if !self.line_tolerance.is_finite() || self.line_tolerance < 0.0 {
            return Err(Error::Config(format!(
                "line_tolerance {} must be >= 0",
                self.line_tolerance
            )));
        }
        Ok(())
    }

    pub fn is_enabled(&self, pii_type: PiiType) -> bool {
        self.enabled_types.contains(&pii_type)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: cannot parse {value:?}")))
}

/// Output file locations for one input document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPaths {
    /// Output directory.
    pub root: PathBuf,
    /// De-identified (or re-identified) text (`<stem>_processed.<ext>`).
    pub processed: PathBuf,
    /// Mapping snapshot (`<stem>_mappings.json`).
    pub mappings: PathBuf,
    /// Structured detection report (`<stem>_report.json`).
    pub report_json: PathBuf,
    /// Plain-text detection report (`<stem>_report.txt`).
    pub report_txt: PathBuf,
    /// Per-page redaction boxes for the renderer (`<stem>_redactions.json`).
    pub redactions: PathBuf,
}

impl OutputPaths {
    /// Derive paths for `input` inside `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>, input: &Path, extension: &str) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        Ok(Self {
            processed: root.join(format!("{stem}_processed.{extension}")),
            mappings: root.join(format!("{stem}_mappings.json")),
            report_json: root.join(format!("{stem}_report.json")),
            report_txt: root.join(format!("{stem}_report.txt")),
            redactions: root.join(format!("{stem}_redactions.json")),
            root,
        })
    }
}
