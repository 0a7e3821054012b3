//! Error types for de-identification runs.

use thiserror::Error;

use crate::types::PiiType;

#[derive(Error, Debug)]
pub enum Error {
    /// Inconsistent insert into a mapping store. Always a defect in store usage.
    #[error("Mapping collision: {0}")]
    Collision(String),

    /// A loaded mapping snapshot is structurally invalid.
    #[error("Corrupt mapping snapshot: {0}")]
    CorruptMapping(String),

    #[error("No free surrogate for {pii_type} after {attempts} attempts")]
    SurrogateExhausted { pii_type: PiiType, attempts: usize },

    /// Malformed page or span input, rejected before any store mutation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable code for machine-readable output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Collision(_) => "COLLISION",
            Self::CorruptMapping(_) => "CORRUPT_MAPPING",
            Self::SurrogateExhausted { .. } => "SURROGATE_EXHAUSTED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Storage(_) => "STORAGE",
            Self::Database(_) => "DATABASE",
            Self::Io(_) => "IO",
            Self::Json(_) => "JSON",
            Self::Config(_) => "CONFIG",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether retrying the same run can never succeed.
    ///
    /// I/O and storage failures happen only at run boundaries (snapshot
    /// load/persist) and may be retried by the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Storage(_) | Self::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_for_run_errors() {
        let codes = [
            Error::Collision("x".into()).code(),
            Error::CorruptMapping("x".into()).code(),
            Error::SurrogateExhausted {
                pii_type: PiiType::Name,
                attempts: 3,
            }
            .code(),
            Error::InvalidInput("x".into()).code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_exhausted_message_names_type() {
        let err = Error::SurrogateExhausted {
            pii_type: PiiType::Phone,
            attempts: 1000,
        };
        assert_eq!(
            err.to_string(),
            "No free surrogate for PHONE after 1000 attempts"
        );
        assert!(err.is_fatal());
    }
}
