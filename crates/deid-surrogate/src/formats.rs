//! Per-type surrogate builders.
//!
//! Each builder draws from a [`SeedStream`] and keeps the surface shape of
//! the original: token count for names, separators for phone numbers and
//! SSNs, the date format for dates.

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::entropy::SeedStream;
use deid_core::PiiType;

/// Matches the opaque tokens minted for `OTHER` values.
pub const OPAQUE_TOKEN_PATTERN: &str = r"\[REDACTED-[0-9a-f]{8}\]";

const FIRST_NAMES: &[&str] = &[
    "Alan", "Beatrice", "Carlos", "Diana", "Edgar", "Fiona", "Gavin", "Helena", "Ivan", "Julia",
    "Kenneth", "Laura", "Marcus", "Nadia", "Oscar", "Paula", "Quentin", "Rosa", "Simon", "Teresa",
    "Victor", "Wendy", "Xavier", "Yvonne", "Zachary", "Amelia", "Bernard", "Clara", "Dominic",
    "Elise", "Felix", "Grace", "Hugo", "Irene", "Jonah", "Katrina", "Leon", "Maria", "Nolan",
    "Olivia",
];

const LAST_NAMES: &[&str] = &[
    "Abbott", "Barnes", "Castillo", "Dalton", "Ellison", "Fletcher", "Garrison", "Holloway",
    "Ingram", "Jennings", "Keller", "Lopez", "Mercer", "Norwood", "Osborne", "Prescott", "Quinlan",
    "Ramsey", "Sutton", "Thornton", "Underwood", "Vance", "Whitaker", "Yates", "Zimmerman",
    "Ashford", "Bristow", "Carver", "Donovan", "Everett", "Fairbanks", "Goodwin", "Hartley",
    "Irwin", "Kendall", "Langley", "Marlowe", "Pennington", "Radcliffe", "Sinclair",
];

const STREET_NAMES: &[&str] = &[
    "Maple", "Cedar", "Willow", "Lakeview", "Hillcrest", "Ridge", "Sycamore", "Meadow", "Harbor",
    "Juniper", "Orchard", "Chestnut", "Riverside", "Birch", "Summit", "Aspen",
];

const STREET_SUFFIXES: &[&str] = &["St", "Ave", "Rd", "Blvd", "Ln", "Dr", "Ct", "Way"];

const CITIES: &[(&str, &str)] = &[
    ("Springfield", "IL"),
    ("Fairview", "OR"),
    ("Riverton", "WY"),
    ("Greenville", "SC"),
    ("Franklin", "TN"),
    ("Clinton", "IA"),
    ("Madison", "WI"),
    ("Georgetown", "KY"),
    ("Salem", "MA"),
    ("Arlington", "TX"),
    ("Ashland", "OH"),
    ("Milford", "CT"),
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

/// Parse formats tried in order. Month names parse under both `%b` and
/// `%B`; the one that formats back to the input wins.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

static INITIAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\p{Lu}\.?$").unwrap());

/// Build one candidate for `pii_type`.
pub fn build(
    pii_type: PiiType,
    original: &str,
    seed: &mut SeedStream,
    date_shift_days: Option<i64>,
    attempt: usize,
) -> String {
    match pii_type {
        PiiType::Name => name(original, seed),
        PiiType::Phone => phone(original, seed),
        PiiType::Email => email(seed),
        PiiType::Ssn => ssn(original, seed),
        PiiType::Address => address(seed),
        PiiType::Date => date(original, seed, date_shift_days, attempt),
        PiiType::Other => opaque(seed),
    }
}

/// Name with the same number of whitespace-separated tokens. Middle
/// initials stay initials and an all-caps original gives an all-caps result.
pub fn name(original: &str, seed: &mut SeedStream) -> String {
    let tokens: Vec<&str> = original.split_whitespace().collect();
    let count = tokens.len().max(1);

    let mut parts = Vec::with_capacity(count);
    for i in 0..count {
        let token = tokens.get(i).copied().unwrap_or("");
        let part = if count > 1 && i == count - 1 {
            seed.pick(LAST_NAMES).to_string()
        } else if i > 0 && INITIAL_RE.is_match(token) {
            let letter = char::from(b'A' + seed.below(26) as u8);
            format!("{letter}.")
        } else {
            seed.pick(FIRST_NAMES).to_string()
        };
        parts.push(part);
    }

    let joined = parts.join(" ");
    let has_letters = original.chars().any(|c| c.is_alphabetic());
    if has_letters && original.chars().all(|c| !c.is_lowercase()) {
        joined.to_uppercase()
    } else {
        joined
    }
}

/// Replace every digit, keeping separators and a leading `+<country>` prefix.
pub fn phone(original: &str, seed: &mut SeedStream) -> String {
    if !original.chars().any(|c| c.is_ascii_digit()) {
        return opaque(seed);
    }

    let mut out = String::with_capacity(original.len());
    let mut in_country_code = original.trim_start().starts_with('+');
    let mut seen_country_digit = false;
    let mut first = true;
    for ch in original.chars() {
        if ch.is_ascii_digit() {
            if in_country_code {
                seen_country_digit = true;
                out.push(ch);
                continue;
            }
            let digit = if first { seed.range(2, 9) } else { seed.below(10) };
            first = false;
            out.push(char::from(b'0' + digit as u8));
        } else {
            if in_country_code && seen_country_digit {
                in_country_code = false;
            }
            out.push(ch);
        }
    }
    out
}

/// Nine-digit SSNs get a structurally valid number (area 001-899 without
/// 666, non-zero group and serial) in the original digit slots. Anything
/// else is treated like a phone number.
pub fn ssn(original: &str, seed: &mut SeedStream) -> String {
    let slots = original.chars().filter(|c| c.is_ascii_digit()).count();
    if slots != 9 {
        return phone(original, seed);
    }

    let mut area = seed.range(1, 899);
    if area == 666 {
        area = 667;
    }
    let group = seed.range(1, 99);
    let serial = seed.range(1, 9999);
    let digits = format!("{area:03}{group:02}{serial:04}");

    let mut fill = digits.chars();
    original
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                fill.next().unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

pub fn email(seed: &mut SeedStream) -> String {
    let first = seed.pick(FIRST_NAMES).to_lowercase();
    let last = seed.pick(LAST_NAMES).to_lowercase();
    let domain = seed.pick(EMAIL_DOMAINS);
    format!("{first}.{last}@{domain}")
}

pub fn address(seed: &mut SeedStream) -> String {
    let number = seed.range(100, 9999);
    let street = seed.pick(STREET_NAMES);
    let suffix = seed.pick(STREET_SUFFIXES);
    let (city, state) = seed.pick(CITIES);
    let zip = seed.range(10000, 99999);
    format!("{number} {street} {suffix}, {city}, {state} {zip:05}")
}

/// Shifted date in the original's format.
///
/// With a fixed shift every date moves by the same number of days, which
/// keeps intervals between dates intact; `attempt` is added so a collision
/// retry still makes progress. Unparseable input gets a fabricated ISO date.
pub fn date(
    original: &str,
    seed: &mut SeedStream,
    fixed_shift: Option<i64>,
    attempt: usize,
) -> String {
    let trimmed = original.trim();
    let lead = original.len() - original.trim_start().len();
    let tail = lead + trimmed.len();

    let rendered = match parse_date(trimmed) {
        Some((parsed, format)) => {
            let days = match fixed_shift {
                Some(shift) => shift.checked_add(attempt as i64),
                None => {
                    let magnitude = seed.range(1, 365) as i64;
                    Some(if seed.below(2) == 0 { -magnitude } else { magnitude })
                }
            };
            // An unrepresentable shift leaves the date unchanged, which the
            // generator rejects as equal to the original.
            let shifted = days
                .and_then(Duration::try_days)
                .and_then(|delta| parsed.checked_add_signed(delta))
                .unwrap_or(parsed);
            shifted.format(&format).to_string()
        }
        None => fabricated_date(seed),
    };

    format!("{}{}{}", &original[..lead], rendered, &original[tail..])
}

fn fabricated_date(seed: &mut SeedStream) -> String {
    NaiveDate::from_ymd_opt(1950, 1, 1)
        .zip(Duration::try_days(seed.below(25_000) as i64))
        .and_then(|(base, delta)| base.checked_add_signed(delta))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| opaque(seed))
}

/// Parse `text` and return the format that reproduces it, preferring the
/// unpadded variant when the original had no leading zeros. Falls back to
/// the first format that parses at all.
fn parse_date(text: &str) -> Option<(NaiveDate, String)> {
    let mut fallback = None;
    for format in DATE_FORMATS {
        let Ok(parsed) = NaiveDate::parse_from_str(text, format) else {
            continue;
        };
        let unpadded = format.replace("%d", "%-d").replace("%m", "%-m");
        for candidate in [format.to_string(), unpadded] {
            if parsed.format(&candidate).to_string() == text {
                return Some((parsed, candidate));
            }
        }
        fallback.get_or_insert((parsed, format.to_string()));
    }
    fallback
}

pub fn opaque(seed: &mut SeedStream) -> String {
    format!("[REDACTED-{}]", seed.hex(4))
}
