//! Topic name canonicalization
//!
//! Produces the stable join/dedup key for free-text topic labels:
//! 1. Unicode NFC composition, lower-case, trim
//! 2. Whitespace and hyphen runs become a single `_`
//! 3. Punctuation (`. , ; : ! ? ( ) " '`) is stripped
//! 4. Optional diacritic folding through a fixed table
//! 5. Anything outside `[a-z0-9_]` plus the retained accented letters is dropped
//! 6. Repeated `_` collapse, leading/trailing `_` are trimmed
//!
//! The result is idempotent and never fails: missing or empty input maps to
//! [`UNKNOWN_TOPIC`].

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Sentinel key for null, missing, or fully-stripped names.
pub const UNKNOWN_TOPIC: &str = "unknown_topic";

/// Characters removed outright before filtering.
const STRIPPED_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '(', ')', '"', '\''];

/// Accented letters kept by default when folding is off.
pub const DEFAULT_RETAINED: &str = "áàâãäéèêëíìîïóòôõöúùûüçñ";

/// Fixed folding table: accented letter -> unaccented Latin equivalent.
const FOLD_TABLE: &[(char, char)] = &[
    ('á', 'a'),
    ('à', 'a'),
    ('â', 'a'),
    ('ã', 'a'),
    ('ä', 'a'),
    ('å', 'a'),
    ('é', 'e'),
    ('è', 'e'),
    ('ê', 'e'),
    ('ë', 'e'),
    ('í', 'i'),
    ('ì', 'i'),
    ('î', 'i'),
    ('ï', 'i'),
    ('ó', 'o'),
    ('ò', 'o'),
    ('ô', 'o'),
    ('õ', 'o'),
    ('ö', 'o'),
    ('ú', 'u'),
    ('ù', 'u'),
    ('û', 'u'),
    ('ü', 'u'),
    ('ç', 'c'),
    ('ñ', 'n'),
    ('ý', 'y'),
    ('ÿ', 'y'),
];

/// Normalizer settings, loadable from the `[normalizer]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerOptions {
    /// Map accented letters to their Latin base letter
    #[serde(default)]
    pub fold_diacritics: bool,
    /// Accented letters that survive filtering when not folded
    #[serde(default = "default_retained")]
    pub retained_chars: String,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            fold_diacritics: false,
            retained_chars: default_retained(),
        }
    }
}

fn default_retained() -> String {
    DEFAULT_RETAINED.to_string()
}

impl NormalizerOptions {
    pub fn folding() -> Self {
        Self {
            fold_diacritics: true,
            ..Self::default()
        }
    }
}

/// Normalize with the default retained set.
pub fn normalize(name: &str, fold_diacritics: bool) -> String {
    let options = NormalizerOptions {
        fold_diacritics,
        ..NormalizerOptions::default()
    };
    normalize_with(name, &options)
}

/// Normalize an optional name; `None` yields [`UNKNOWN_TOPIC`].
pub fn normalize_opt(name: Option<&str>, fold_diacritics: bool) -> String {
    match name {
        Some(n) => normalize(n, fold_diacritics),
        None => UNKNOWN_TOPIC.to_string(),
    }
}

/// Normalize an arbitrary JSON value, coercing non-strings via their JSON text.
pub fn normalize_value(value: &serde_json::Value, options: &NormalizerOptions) -> String {
    match value {
        serde_json::Value::Null => UNKNOWN_TOPIC.to_string(),
        serde_json::Value::String(s) => normalize_with(s, options),
        other => normalize_with(&other.to_string(), options),
    }
}

pub fn normalize_with(name: &str, options: &NormalizerOptions) -> String {
    let lowered: String = name.nfc().collect::<String>().to_lowercase();
    let trimmed = lowered.trim();

    let mut out = String::with_capacity(trimmed.len());
    let mut pending_separator = false;

    for c in trimmed.chars() {
        if c.is_whitespace() || c == '-' {
            pending_separator = true;
            continue;
        }
        if STRIPPED_PUNCTUATION.contains(&c) {
            continue;
        }

        let c = if options.fold_diacritics { fold_char(c) } else { c };
        let allowed = c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || c == '_'
            || (!options.fold_diacritics && options.retained_chars.contains(c));
        if !allowed {
            continue;
        }

        if pending_separator {
            out.push('_');
            pending_separator = false;
        }
        out.push(c);
    }

    let collapsed = collapse_underscores(&out);
    if collapsed.is_empty() {
        UNKNOWN_TOPIC.to_string()
    } else {
        collapsed
    }
}

fn fold_char(c: char) -> char {
    FOLD_TABLE
        .iter()
        .find(|(accented, _)| *accented == c)
        .map(|(_, plain)| *plain)
        .unwrap_or(c)
}

fn collapse_underscores(s: &str) -> String {
    s.split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
