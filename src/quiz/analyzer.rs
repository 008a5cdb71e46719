//! Quiz scoring
//!
//! Pure function of the question list and the answer map: per-question
//! correctness, per-topic and per-difficulty aggregation, status
//! categorization and ordered recommendations.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Difficulty, QuizQuestion};
use crate::topics::TopicStatus;

/// Below this score a topic is `failed`.
pub const MEDIUM_THRESHOLD: f64 = 50.0;
/// At or above this score a topic is `mastered`.
pub const MASTERED_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicPerformance {
    pub sub_topic_name: String,
    pub score_percent: f64,
    pub status: TopicStatus,
    pub question_count: usize,
    pub correct_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyPerformance {
    pub count: usize,
    pub correct: usize,
    pub score: f64,
}

/// Topic display names grouped by computed status, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCategorization {
    pub failed: Vec<String>,
    pub medium: Vec<String>,
    pub mastered: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub overall_score: f64,
    pub total_questions: usize,
    pub correct_answers: usize,
    /// Keyed by normalized topic name
    pub performance_by_sub_topic: BTreeMap<String, TopicPerformance>,
    pub performance_categorization: PerformanceCategorization,
    /// Only difficulties that occur in the quiz
    pub performance_by_difficulty: BTreeMap<Difficulty, DifficultyPerformance>,
    pub recommendations: Vec<String>,
}

/// `< 50` failed, `50 <= x < 70` medium, `>= 70` mastered.
pub fn classify(score_percent: f64) -> TopicStatus {
    if score_percent < MEDIUM_THRESHOLD {
        TopicStatus::Failed
    } else if score_percent < MASTERED_THRESHOLD {
        TopicStatus::Medium
    } else {
        TopicStatus::Mastered
    }
}

fn percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * correct as f64 / total as f64
    }
}

/// A missing answer counts as incorrect.
pub fn is_correct(question: &QuizQuestion, answers: &HashMap<String, String>) -> bool {
    answers
        .get(&question.id)
        .is_some_and(|a| *a == question.correct_answer)
}

#[derive(Default)]
struct Tally {
    name: String,
    total: usize,
    correct: usize,
}

pub fn analyze(questions: &[QuizQuestion], answers: &HashMap<String, String>) -> AnalysisResult {
    let mut topic_order: Vec<String> = Vec::new();
    let mut topics: HashMap<String, Tally> = HashMap::new();
    let mut difficulties: BTreeMap<Difficulty, (usize, usize)> = BTreeMap::new();
    let mut total_correct = 0;

    for question in questions {
        let correct = is_correct(question, answers);
        if correct {
            total_correct += 1;
        }

        let key = question.topic_key();
        let tally = topics.entry(key.clone()).or_insert_with(|| {
            topic_order.push(key);
            Tally {
                name: question.sub_topic_name.clone(),
                ..Tally::default()
            }
        });
        tally.total += 1;
        tally.correct += usize::from(correct);

        let entry = difficulties.entry(question.difficulty).or_default();
        entry.0 += 1;
        entry.1 += usize::from(correct);
    }

    let mut performance_by_sub_topic = BTreeMap::new();
    let mut categorization = PerformanceCategorization::default();
    for key in topic_order {
        let Some(tally) = topics.remove(&key) else {
            continue;
        };
        let score = percent(tally.correct, tally.total);
        let status = classify(score);
        match status {
            TopicStatus::Failed => categorization.failed.push(tally.name.clone()),
            TopicStatus::Medium => categorization.medium.push(tally.name.clone()),
            _ => categorization.mastered.push(tally.name.clone()),
        }
        performance_by_sub_topic.insert(
            key,
            TopicPerformance {
                sub_topic_name: tally.name,
                score_percent: score,
                status,
                question_count: tally.total,
                correct_count: tally.correct,
            },
        );
    }

    let performance_by_difficulty = difficulties
        .into_iter()
        .filter(|(_, (count, _))| *count > 0)
        .map(|(difficulty, (count, correct))| {
            (
                difficulty,
                DifficultyPerformance {
                    count,
                    correct,
                    score: percent(correct, count),
                },
            )
        })
        .collect();

    let overall_score = percent(total_correct, questions.len());
    let recommendations = recommendations(&categorization, overall_score);

    debug!(
        "Analyzed {} questions: {} correct ({:.1}%), {} failed / {} medium / {} mastered topics",
        questions.len(),
        total_correct,
        overall_score,
        categorization.failed.len(),
        categorization.medium.len(),
        categorization.mastered.len()
    );

    AnalysisResult {
        overall_score,
        total_questions: questions.len(),
        correct_answers: total_correct,
        performance_by_sub_topic,
        performance_categorization: categorization,
        performance_by_difficulty,
        recommendations,
    }
}

fn recommendations(categorization: &PerformanceCategorization, overall_score: f64) -> Vec<String> {
    let mut out = Vec::new();

    if !categorization.failed.is_empty() {
        out.push(format!(
            "Review these topics first, your answers show significant gaps: {}.",
            categorization.failed.join(", ")
        ));
    }
    if !categorization.medium.is_empty() {
        out.push(format!(
            "Practice these topics a bit more to reach mastery: {}.",
            categorization.medium.join(", ")
        ));
    }

    let closing = if overall_score < MEDIUM_THRESHOLD {
        "Your overall score is low. Go back over the study material before taking another quiz."
    } else if overall_score < MASTERED_THRESHOLD {
        "You are making progress. Focused practice on the weaker topics will raise your score."
    } else {
        "Great work! Keep reviewing periodically to retain what you have mastered."
    };
    out.push(closing.to_string());

    out
}
