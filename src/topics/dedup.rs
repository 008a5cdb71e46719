//! Topic deduplication
//!
//! Two passes over the candidate list:
//! 1. Exact match on the normalized key, first occurrence wins
//! 2. Near-duplicate collapse: for every surviving pair whose key similarity
//!    is strictly above the threshold, the shorter display name is dropped
//!    (equal length keeps the first-seen entry)
//!
//! Pass 2 only marks tombstones during its scan and materializes the
//! survivors once at the end, so indices stay valid throughout.

use std::collections::HashSet;

use tracing::debug;

use super::TopicCandidate;
use crate::text::{similarity, DEFAULT_SIMILARITY_THRESHOLD};

#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    threshold: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl Deduplicator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn dedupe(&self, topics: &[TopicCandidate]) -> Vec<TopicCandidate> {
        let unique = exact_pass(topics);
        self.near_duplicate_pass(unique)
    }

    fn near_duplicate_pass(&self, topics: Vec<TopicCandidate>) -> Vec<TopicCandidate> {
        let mut removed = vec![false; topics.len()];

        for i in 0..topics.len() {
            if removed[i] {
                continue;
            }
            for j in (i + 1)..topics.len() {
                if removed[j] {
                    continue;
                }
                let score = similarity(&topics[i].normalized_name, &topics[j].normalized_name);
                if score <= self.threshold {
                    continue;
                }

                let len_i = topics[i].name.chars().count();
                let len_j = topics[j].name.chars().count();
                let loser = if len_j > len_i { i } else { j };
                debug!(
                    "Near-duplicate topics '{}' / '{}' (similarity {:.2}), dropping '{}'",
                    topics[i].name, topics[j].name, score, topics[loser].name
                );
                removed[loser] = true;
                if loser == i {
                    break;
                }
            }
        }

        topics
            .into_iter()
            .zip(removed)
            .filter_map(|(topic, gone)| (!gone).then_some(topic))
            .collect()
    }
}

fn exact_pass(topics: &[TopicCandidate]) -> Vec<TopicCandidate> {
    let mut seen = HashSet::new();
    topics
        .iter()
        .filter(|t| seen.insert(t.normalized_name.as_str()))
        .cloned()
        .collect()
}

/// Dedupe with the default 0.8 threshold.
pub fn dedupe(topics: &[TopicCandidate]) -> Vec<TopicCandidate> {
    Deduplicator::default().dedupe(topics)
}
