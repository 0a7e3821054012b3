//! Highlight colours handed to the renderer with each redaction box.

use serde::{Deserialize, Serialize};

use deid_core::PiiType;

/// RGB colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb(pub f32, pub f32, pub f32);

pub fn highlight_color(pii_type: PiiType) -> Rgb {
    match pii_type {
        PiiType::Name => Rgb(1.0, 0.0, 0.0),
        PiiType::Email => Rgb(0.0, 0.5, 1.0),
        PiiType::Phone => Rgb(0.0, 0.8, 0.0),
        PiiType::Ssn => Rgb(1.0, 0.0, 1.0),
        PiiType::Address => Rgb(0.5, 0.0, 0.5),
        PiiType::Date => Rgb(0.0, 0.5, 0.5),
        PiiType::Other => Rgb(1.0, 0.65, 0.0),
    }
}
