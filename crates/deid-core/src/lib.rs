//! Deid Core — data model, errors and configuration shared by every stage.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DeidConfig, OutputPaths, SurrogateMatchPolicy, MAX_DATE_SHIFT_DAYS};
pub use error::{Error, Result};
pub use types::*;
