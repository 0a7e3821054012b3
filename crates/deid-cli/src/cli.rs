//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use deid_core::{DeidConfig, Result};
use deid_ingest::OutputFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// Replace detected PII with surrogates and write a mapping snapshot
    #[default]
    Anonymize,
    /// Restore original values using a previously written snapshot
    Deanonymize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Txt,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Txt => OutputFormat::Txt,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "deid",
    version,
    about = "Reversible PII de-identification for parsed documents",
    long_about = "Replaces recognizer-detected PII in parsed documents with consistent \
                  surrogates, writes the mapping snapshot needed to reverse the run, and \
                  projects redaction boxes onto page coordinates."
)]
pub struct Args {
    /// Parsed-document JSON, text file, or a directory of them
    #[arg(short, long, value_name = "PATH")]
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    pub output: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Mode::Anonymize)]
    pub mode: Mode,

    /// Mapping snapshot file, or a directory holding `<stem>_mappings.json` files
    #[arg(long, value_name = "PATH")]
    pub mappings: Option<PathBuf>,

    /// Read --mappings in the label-grouped legacy format
    #[arg(long, requires = "mappings")]
    pub legacy_mappings: bool,

    /// SQLite snapshot vault directory
    #[arg(long, value_name = "DIR")]
    pub vault: Option<PathBuf>,

    /// Processed-text format (defaults to the input's format)
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Minimum recognizer confidence
    #[arg(long, value_name = "SCORE")]
    pub threshold: Option<f64>,

    /// Skip projecting spans onto page coordinates
    #[arg(long)]
    pub no_project: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Config file (or defaults), then `DEID_*` environment, then flags.
    pub fn load_config(&self) -> Result<DeidConfig> {
        let base = match &self.config {
            Some(path) => DeidConfig::load(path)?,
            None => DeidConfig::default(),
        };
        let mut config = base.from_env()?;
        if let Some(threshold) = self.threshold {
            config.confidence_threshold = threshold;
        }
        if self.no_project {
            config.project_boxes = false;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["deid", "--input", "doc.json"]).unwrap();
        assert_eq!(args.mode, Mode::Anonymize);
        assert_eq!(args.output, PathBuf::from("output"));
        assert!(args.format.is_none());
    }

    #[test]
    fn test_legacy_requires_mappings() {
        assert!(Args::try_parse_from(["deid", "-i", "doc.json", "--legacy-mappings"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "deid", "-i", "doc.json", "-m", "deanonymize", "--threshold", "0.8", "--no-project",
        ])
        .unwrap();
        assert_eq!(args.mode, Mode::Deanonymize);
        let config = args.load_config().unwrap();
        assert_eq!(config.confidence_threshold, 0.8);
        assert!(!config.project_boxes);
    }

    #[test]
    fn test_bad_threshold_rejected() {
        let args = Args::try_parse_from(["deid", "-i", "d.json", "--threshold", "3"]).unwrap();
        assert!(args.load_config().is_err());
    }
}
