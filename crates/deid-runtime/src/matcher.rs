//! Longest-match-first surrogate scanner used by deanonymize.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::types::UnmappedSurrogateWarning;
use deid_core::{Error, Result};
use deid_store::MappingStore;
use deid_surrogate::OPAQUE_TOKEN_PATTERN;

static OPAQUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(OPAQUE_TOKEN_PATTERN).unwrap());

/// Compiled alternation of every surrogate in a store.
///
/// Alternatives are ordered longest first, and the regex engine prefers the
/// earliest alternative at a given position, so a surrogate that is a prefix
/// of a longer one never shadows it.
pub struct SurrogateMatcher<'a> {
    store: &'a MappingStore,
    regex: Option<Regex>,
}

impl<'a> SurrogateMatcher<'a> {
    pub fn new(store: &'a MappingStore) -> Result<Self> {
        let mut surrogates: Vec<&str> = store.surrogates().collect();
        if surrogates.is_empty() {
            return Ok(Self { store, regex: None });
        }
        surrogates.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

        let pattern = surrogates
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        let regex = RegexBuilder::new(&pattern)
            .size_limit(256 * 1024 * 1024)
            .dfa_size_limit(64 * 1024 * 1024)
            .build()
            .map_err(|e| Error::Internal(format!("surrogate matcher: {e}")))?;
        Ok(Self {
            store,
            regex: Some(regex),
        })
    }

    /// Replace every known surrogate with its original. Returns the restored
    /// text and the number of replacements.
    pub fn restore(&self, text: &str) -> (String, usize) {
        let Some(regex) = &self.regex else {
            return (text.to_string(), 0);
        };

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut count = 0;
        for m in regex.find_iter(text) {
            if let Some((_, original)) = self.store.lookup_original(m.as_str()) {
                out.push_str(&text[last..m.start()]);
                out.push_str(original);
                last = m.end();
                count += 1;
            }
        }
        out.push_str(&text[last..]);
        (out, count)
    }

    /// Opaque tokens in `text` that the store cannot resolve.
    pub fn unmapped(&self, page_index: usize, text: &str) -> Vec<UnmappedSurrogateWarning> {
        OPAQUE_RE
            .find_iter(text)
            .filter(|m| self.store.lookup_original(m.as_str()).is_none())
            .map(|m| UnmappedSurrogateWarning {
                page_index,
                char_offset: text[..m.start()].chars().count(),
                text: m.as_str().to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deid_core::PiiType;

    #[test]
    fn test_longest_match_first() {
        let mut store = MappingStore::new("doc");
        store.insert(PiiType::Name, "Ann", "Maria").unwrap();
        store.insert(PiiType::Name, "Ann Lee", "Maria Lopez").unwrap();

        let matcher = SurrogateMatcher::new(&store).unwrap();
        let (restored, count) = matcher.restore("Maria Lopez met Maria.");
        assert_eq!(restored, "Ann Lee met Ann.");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_empty_store_is_identity() {
        let store = MappingStore::new("doc");
        let matcher = SurrogateMatcher::new(&store).unwrap();
        assert_eq!(matcher.restore("nothing (here)"), ("nothing (here)".to_string(), 0));
    }

    #[test]
    fn test_regex_metacharacters_escaped() {
        let mut store = MappingStore::new("doc");
        store.insert(PiiType::Other, "acct 7", "[REDACTED-0a1b2c3d]").unwrap();
        store.insert(PiiType::Phone, "555.1234", "+1 (312) 555-0199").unwrap();
        let matcher = SurrogateMatcher::new(&store).unwrap();
        let (restored, _) = matcher.restore("[REDACTED-0a1b2c3d] / +1 (312) 555-0199 / REDACTED");
        assert_eq!(restored, "acct 7 / 555.1234 / REDACTED");
    }

    #[test]
    fn test_unmapped_tokens_reported() {
        let mut store = MappingStore::new("doc");
        store.insert(PiiType::Other, "x", "[REDACTED-0a1b2c3d]").unwrap();
        let matcher = SurrogateMatcher::new(&store).unwrap();
        let warnings = matcher.unmapped(4, "é [REDACTED-0a1b2c3d] [REDACTED-ffffffff]");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].page_index, 4);
        assert_eq!(warnings[0].char_offset, 22);
        assert_eq!(warnings[0].text, "[REDACTED-ffffffff]");
    }
}
