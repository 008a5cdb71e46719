//! Text canonicalization and fuzzy comparison for topic labels.

pub mod normalize;
pub mod similarity;

pub use normalize::{
    normalize, normalize_opt, normalize_value, normalize_with, NormalizerOptions, UNKNOWN_TOPIC,
};
pub use similarity::{is_near_duplicate, similarity, DEFAULT_SIMILARITY_THRESHOLD};
