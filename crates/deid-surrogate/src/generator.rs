//! Collision-checked surrogate generation.

use tracing::debug;

use crate::entropy::SeedStream;
use crate::formats;
use deid_core::{DeidConfig, Error, PiiType, Result, SurrogateMatchPolicy};
use deid_store::MappingStore;

/// Produces surrogates that are unique within a [`MappingStore`].
///
/// Attempt `n` of a given `(type, original)` is always the same string, so
/// the first free attempt is reproducible for identical store contents.
#[derive(Debug, Clone)]
pub struct SurrogateGenerator {
    salt: String,
    max_attempts: usize,
    date_shift_days: Option<i64>,
    reject_nested: bool,
}

impl SurrogateGenerator {
    pub fn new(config: &DeidConfig) -> Self {
        Self {
            salt: config.surrogate_salt.clone(),
            max_attempts: config.max_surrogate_attempts,
            date_shift_days: config.date_shift_days,
            reject_nested: config.match_policy == SurrogateMatchPolicy::RejectNested,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// The `attempt`-th candidate for `original`, ignoring the store.
    pub fn candidate(&self, pii_type: PiiType, original: &str, attempt: usize) -> String {
        let attempt_bytes = (attempt as u64).to_le_bytes();
        let mut seed = SeedStream::new(&[
            self.salt.as_bytes(),
            pii_type.label().as_bytes(),
            original.as_bytes(),
            &attempt_bytes,
        ]);
        formats::build(pii_type, original, &mut seed, self.date_shift_days, attempt)
    }

    /// Return a surrogate for `original` that no other entry of `store` owns.
    ///
    /// An existing mapping for `(pii_type, original)` is returned as-is.
    /// Fails with [`Error::SurrogateExhausted`] once the retry budget is spent.
    pub fn generate(
        &self,
        pii_type: PiiType,
        original: &str,
        store: &MappingStore,
    ) -> Result<String> {
        self.generate_avoiding(pii_type, original, store, &|_| false)
    }

    /// Like [`generate`](Self::generate), additionally treating any candidate
    /// for which `avoid` returns true as a collision.
    pub fn generate_avoiding(
        &self,
        pii_type: PiiType,
        original: &str,
        store: &MappingStore,
        avoid: &dyn Fn(&str) -> bool,
    ) -> Result<String> {
        self.generate_from(pii_type, original, store, avoid, 0)
    }

    /// Like [`generate_avoiding`](Self::generate_avoiding), skipping the
    /// first `first_attempt` candidates. The retry budget is shared, so
    /// fewer attempts remain.
    pub fn generate_from(
        &self,
        pii_type: PiiType,
        original: &str,
        store: &MappingStore,
        avoid: &dyn Fn(&str) -> bool,
        first_attempt: usize,
    ) -> Result<String> {
        if let Some(existing) = store.lookup_surrogate(pii_type, original) {
            return Ok(existing.to_string());
        }

        for attempt in first_attempt..self.max_attempts {
            let candidate = self.candidate(pii_type, original, attempt);
            if self.is_free(&candidate, original, store) && !avoid(&candidate) {
                if attempt > 0 {
                    debug!("{} surrogate found after {} retries", pii_type, attempt);
                }
                return Ok(candidate);
            }
            debug!("{} surrogate collision on attempt {}", pii_type, attempt);
        }

        Err(Error::SurrogateExhausted {
            pii_type,
            attempts: self.max_attempts,
        })
    }

    fn is_free(&self, candidate: &str, original: &str, store: &MappingStore) -> bool {
        if candidate.is_empty() || candidate == original {
            return false;
        }
        if store.lookup_original(candidate).is_some() {
            return false;
        }
        if self.reject_nested {
            return !store
                .surrogates()
                .any(|s| s.contains(candidate) || candidate.contains(s));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> SurrogateGenerator {
        SurrogateGenerator::new(&DeidConfig::default())
    }

    #[test]
    fn test_deterministic_across_instances() {
        let store = MappingStore::new("doc");
        let a = generator().generate(PiiType::Name, "Jane Doe", &store).unwrap();
        let b = generator().generate(PiiType::Name, "Jane Doe", &store).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, "Jane Doe");
        assert_eq!(a.split_whitespace().count(), 2);
    }

    #[test]
    fn test_salt_changes_output() {
        let salted = SurrogateGenerator::new(&DeidConfig {
            surrogate_salt: "site-b".into(),
            ..Default::default()
        });
        let plain = generator();
        let differs = (0..8).any(|i| {
            let original = format!("[{i}]");
            plain.candidate(PiiType::Other, &original, 0)
                != salted.candidate(PiiType::Other, &original, 0)
        });
        assert!(differs);
    }

    #[test]
    fn test_collision_forces_retry() {
        let gen = generator();
        let first_choice = gen.candidate(PiiType::Name, "Jane Doe", 0);

        let mut store = MappingStore::new("doc");
        store.insert(PiiType::Name, "Someone Else", &first_choice).unwrap();

        let surrogate = gen.generate(PiiType::Name, "Jane Doe", &store).unwrap();
        assert_ne!(surrogate, first_choice);
        store.insert(PiiType::Name, "Jane Doe", &surrogate).unwrap();
        assert_eq!(store.len(), 2);
        assert_ne!(store.entries()[0].surrogate_value, store.entries()[1].surrogate_value);
    }

    #[test]
    fn test_collision_across_types() {
        let gen = generator();
        let first_choice = gen.candidate(PiiType::Other, "ACCT-991", 0);

        let mut store = MappingStore::new("doc");
        store.insert(PiiType::Address, "1 Main St", &first_choice).unwrap();
        let surrogate = gen.generate(PiiType::Other, "ACCT-991", &store).unwrap();
        assert_ne!(surrogate, first_choice);
    }

    #[test]
    fn test_existing_mapping_returned() {
        let mut store = MappingStore::new("doc");
        store.insert(PiiType::Phone, "555-123-4567", "312-555-0199").unwrap();
        let s = generator()
            .generate(PiiType::Phone, "555-123-4567", &store)
            .unwrap();
        assert_eq!(s, "312-555-0199");
    }

    #[test]
    fn test_exhaustion() {
        let gen = SurrogateGenerator::new(&DeidConfig {
            max_surrogate_attempts: 2,
            ..Default::default()
        });
        let mut store = MappingStore::new("doc");
        for attempt in 0..2 {
            let taken = gen.candidate(PiiType::Email, "a@b.com", attempt);
            store
                .insert(PiiType::Email, &format!("other{attempt}@b.com"), &taken)
                .unwrap();
        }

        let err = gen.generate(PiiType::Email, "a@b.com", &store).unwrap_err();
        assert!(matches!(
            err,
            Error::SurrogateExhausted {
                pii_type: PiiType::Email,
                attempts: 2
            }
        ));
    }

    #[test]
    fn test_avoid_predicate_counts_as_collision() {
        let gen = generator();
        let store = MappingStore::new("doc");
        let first_choice = gen.candidate(PiiType::Address, "1 Main St", 0);
        let s = gen
            .generate_avoiding(PiiType::Address, "1 Main St", &store, &|c| c == first_choice)
            .unwrap();
        assert_eq!(s, gen.candidate(PiiType::Address, "1 Main St", 1));
    }

    #[test]
    fn test_generate_from_skips_earlier_attempts() {
        let gen = SurrogateGenerator::new(&DeidConfig {
            max_surrogate_attempts: 3,
            ..Default::default()
        });
        let store = MappingStore::new("doc");
        let s = gen
            .generate_from(PiiType::Ssn, "123-45-6789", &store, &|_| false, 2)
            .unwrap();
        assert_eq!(s, gen.candidate(PiiType::Ssn, "123-45-6789", 2));
        assert!(gen
            .generate_from(PiiType::Ssn, "123-45-6789", &store, &|_| false, 3)
            .is_err());
    }

    #[test]
    fn test_reject_nested_policy() {
        let gen = SurrogateGenerator::new(&DeidConfig {
            match_policy: SurrogateMatchPolicy::RejectNested,
            ..Default::default()
        });
        let first_choice = gen.candidate(PiiType::Name, "Jane Doe", 0);

        let mut store = MappingStore::new("doc");
        let containing = format!("{first_choice} Jr.");
        store.insert(PiiType::Name, "Someone Else", &containing).unwrap();

        let surrogate = gen.generate(PiiType::Name, "Jane Doe", &store).unwrap();
        assert_ne!(surrogate, first_choice);
        assert!(!containing.contains(&surrogate));

        let lenient = generator()
            .generate(PiiType::Name, "Jane Doe", &store)
            .unwrap();
        assert_eq!(lenient, first_choice);
    }
}
