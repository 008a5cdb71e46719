//! Quiz data model, composition and scoring.

pub mod analyzer;
pub mod composer;
pub mod distribution;

use serde::{Deserialize, Serialize};

use crate::text::{normalize_with, NormalizerOptions};

pub use analyzer::{analyze, AnalysisResult};
pub use composer::{ComposedQuiz, CompositionRequest, QuizComposer, QuizSettings};
pub use distribution::{plan_distribution, Allocation, DistributionPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Mixed,
}

impl Difficulty {
    /// Case-insensitive; anything unrecognized is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            "mixed" => Some(Difficulty::Mixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated multiple-choice question.
///
/// `correct_answer` is always one of `options`, and
/// `normalized_sub_topic_name` is derived from `sub_topic_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
    pub sub_topic_name: String,
    #[serde(default)]
    pub normalized_sub_topic_name: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl QuizQuestion {
    /// Recompute the normalized key from the display name.
    pub fn renormalize(&mut self, options: &NormalizerOptions) {
        self.normalized_sub_topic_name = normalize_with(&self.sub_topic_name, options);
    }

    /// Key used to aggregate results; derived on the fly when the stored one is empty.
    pub fn topic_key(&self) -> String {
        if self.normalized_sub_topic_name.is_empty() {
            normalize_with(&self.sub_topic_name, &NormalizerOptions::default())
        } else {
            self.normalized_sub_topic_name.clone()
        }
    }
}
