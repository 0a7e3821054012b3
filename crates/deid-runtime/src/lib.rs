//! Deid Runtime — the transform engine.
//!
//! Per-page span resolution and projection fan out across threads; mapping
//! store mutation is applied afterwards in canonical span order.

pub mod engine;
pub mod matcher;
pub mod types;

pub use engine::DeidEngine;
pub use matcher::SurrogateMatcher;
pub use types::*;
