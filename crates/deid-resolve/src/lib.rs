//! Span resolution — picks the winning spans when recognizer output overlaps.

pub mod sweep;

pub use sweep::SpanResolver;
