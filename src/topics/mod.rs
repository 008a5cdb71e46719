//! Topic records, mastery buckets and status feedback.

pub mod dedup;
pub mod extract;

use serde::{Deserialize, Serialize};

use crate::quiz::analyzer::AnalysisResult;
use crate::text::{normalize_with, NormalizerOptions};

pub use dedup::{dedupe, Deduplicator};
pub use extract::TopicExtractor;

/// Mastery state of a topic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    #[default]
    Pending,
    Failed,
    Medium,
    Mastered,
}

impl TopicStatus {
    /// Bucket order used for allocation, shortfall and cascade.
    pub const PRIORITY: [TopicStatus; 4] = [
        TopicStatus::Failed,
        TopicStatus::Medium,
        TopicStatus::Pending,
        TopicStatus::Mastered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStatus::Pending => "pending",
            TopicStatus::Failed => "failed",
            TopicStatus::Medium => "medium",
            TopicStatus::Mastered => "mastered",
        }
    }
}

impl std::fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A deduplication candidate: display name plus its canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicCandidate {
    pub name: String,
    pub normalized_name: String,
}

impl TopicCandidate {
    pub fn new(name: impl Into<String>, options: &NormalizerOptions) -> Self {
        let name = name.into();
        let normalized_name = normalize_with(&name, options);
        Self {
            name,
            normalized_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRecord {
    pub sub_topic_name: String,
    pub normalized_sub_topic_name: String,
    #[serde(default)]
    pub status: TopicStatus,
}

impl TopicRecord {
    /// New record in `pending` state with a derived key.
    pub fn new(sub_topic_name: impl Into<String>, options: &NormalizerOptions) -> Self {
        let sub_topic_name = sub_topic_name.into();
        let normalized_sub_topic_name = normalize_with(&sub_topic_name, options);
        Self {
            sub_topic_name,
            normalized_sub_topic_name,
            status: TopicStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: TopicStatus) -> Self {
        self.status = status;
        self
    }
}

impl From<TopicCandidate> for TopicRecord {
    fn from(candidate: TopicCandidate) -> Self {
        Self {
            sub_topic_name: candidate.name,
            normalized_sub_topic_name: candidate.normalized_name,
            status: TopicStatus::Pending,
        }
    }
}

/// Topics grouped by mastery status; the distribution input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicBuckets {
    #[serde(default)]
    pub failed: Vec<TopicRecord>,
    #[serde(default)]
    pub medium: Vec<TopicRecord>,
    #[serde(default)]
    pub pending: Vec<TopicRecord>,
    #[serde(default)]
    pub mastered: Vec<TopicRecord>,
}

impl TopicBuckets {
    /// Group records by their current status, preserving input order.
    pub fn from_records(records: impl IntoIterator<Item = TopicRecord>) -> Self {
        let mut buckets = Self::default();
        for record in records {
            buckets.bucket_mut(record.status).push(record);
        }
        buckets
    }

    pub fn bucket(&self, status: TopicStatus) -> &[TopicRecord] {
        match status {
            TopicStatus::Failed => &self.failed,
            TopicStatus::Medium => &self.medium,
            TopicStatus::Pending => &self.pending,
            TopicStatus::Mastered => &self.mastered,
        }
    }

    fn bucket_mut(&mut self, status: TopicStatus) -> &mut Vec<TopicRecord> {
        match status {
            TopicStatus::Failed => &mut self.failed,
            TopicStatus::Medium => &mut self.medium,
            TopicStatus::Pending => &mut self.pending,
            TopicStatus::Mastered => &mut self.mastered,
        }
    }

    pub fn topic_count(&self) -> usize {
        TopicStatus::PRIORITY
            .iter()
            .map(|s| self.bucket(*s).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.topic_count() == 0
    }

    /// All topics in priority order (`failed`, `medium`, `pending`, `mastered`).
    pub fn iter_prioritized(&self) -> impl Iterator<Item = &TopicRecord> {
        TopicStatus::PRIORITY
            .into_iter()
            .flat_map(move |s| self.bucket(s).iter())
    }
}

/// Write scored statuses back onto topic records.
///
/// Topics absent from the analysis keep their status. Returns how many
/// records changed.
pub fn apply_analysis(records: &mut [TopicRecord], analysis: &AnalysisResult) -> usize {
    let mut changed = 0;
    for record in records.iter_mut() {
        if let Some(perf) = analysis
            .performance_by_sub_topic
            .get(&record.normalized_sub_topic_name)
        {
            if record.status != perf.status {
                record.status = perf.status;
                changed += 1;
            }
        }
    }
    changed
}
