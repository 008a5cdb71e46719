//! Levenshtein-based similarity between normalized strings.

use strsim::levenshtein;

/// Threshold above which two topic keys are near-duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// `(maxLen - distance) / maxLen`, measured in characters.
///
/// Two empty strings are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    (max_len - distance) as f64 / max_len as f64
}

/// Strictly greater than `threshold`; equality does not count.
pub fn is_near_duplicate(a: &str, b: &str, threshold: f64) -> bool {
    similarity(a, b) > threshold
}
