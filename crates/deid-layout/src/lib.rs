//! Deid Layout — maps resolved spans onto page geometry for visual redaction.

pub mod palette;
pub mod projector;

pub use palette::{highlight_color, Rgb};
pub use projector::CoordinateProjector;
