//! Deid Surrogate — fabricates replacement values for detected PII.
//!
//! Every candidate is derived from a SHA-256 seed over the salt, the type
//! and the original value, so the same input yields the same surrogate on
//! every run. Collisions with the mapping store are resolved by re-seeding.

pub mod entropy;
pub mod formats;
pub mod generator;

pub use entropy::SeedStream;
pub use formats::OPAQUE_TOKEN_PATTERN;
pub use generator::SurrogateGenerator;
