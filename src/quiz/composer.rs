//! Quiz composition: plan, prompt, generate, repair-parse, validate.
//!
//! The distribution plan is computed (and can fail) before any provider
//! call. The provider call is the only retried step; parse and validation
//! failures are terminal.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::distribution::{plan_distribution, DistributionPlan};
use super::{Difficulty, QuizQuestion};
use crate::api::{RetryingInvoker, TextGenerator};
use crate::errors::{preview, QuizforgeError, ValidationError};
use crate::response_parser::parse_response;
use crate::text::{normalize_with, NormalizerOptions};
use crate::topics::{TopicBuckets, TopicStatus};

/// Quiz settings, loadable from the `[quiz]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSettings {
    #[serde(default = "default_total_questions")]
    pub default_total_questions: usize,
    #[serde(default = "default_true")]
    pub prioritize_weak_and_medium_topics: bool,
    /// Language the questions are written in
    #[serde(default = "default_language")]
    pub language: String,
    /// Source material beyond this many characters is cut from the prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            default_total_questions: default_total_questions(),
            prioritize_weak_and_medium_topics: true,
            language: default_language(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_total_questions() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_language() -> String {
    "English".to_string()
}
fn default_max_context_chars() -> usize {
    12_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRequest {
    pub buckets: TopicBuckets,
    pub total_questions: usize,
    #[serde(default = "default_true")]
    pub prioritize_weak_and_medium_topics: bool,
    /// Study material the questions should be grounded in
    #[serde(default)]
    pub source_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedQuiz {
    pub plan: DistributionPlan,
    pub questions: Vec<QuizQuestion>,
}

pub struct QuizComposer {
    generator: Arc<dyn TextGenerator>,
    invoker: RetryingInvoker,
    normalizer: NormalizerOptions,
    settings: QuizSettings,
}

impl QuizComposer {
    pub fn new(generator: Arc<dyn TextGenerator>, invoker: RetryingInvoker) -> Self {
        Self {
            generator,
            invoker,
            normalizer: NormalizerOptions::default(),
            settings: QuizSettings::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerOptions) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_settings(mut self, settings: QuizSettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn compose(
        &self,
        request: &CompositionRequest,
    ) -> Result<ComposedQuiz, QuizforgeError> {
        self.compose_with_cancel(request, &CancellationToken::new())
            .await
    }

    pub async fn compose_with_cancel(
        &self,
        request: &CompositionRequest,
        cancel: &CancellationToken,
    ) -> Result<ComposedQuiz, QuizforgeError> {
        let plan = plan_distribution(
            &request.buckets,
            request.total_questions,
            request.prioritize_weak_and_medium_topics,
        )?;

        let prompt = build_prompt(&plan, request.source_text.as_deref(), &self.settings);
        let generation = self
            .invoker
            .generate(self.generator.as_ref(), &prompt, cancel)
            .await?;

        let payload: Value = parse_response(&generation.text)?;
        let questions = validate_questions(payload, &self.normalizer)?;

        if questions.len() != plan.total_questions {
            warn!(
                "Model returned {} questions, plan asked for {}",
                questions.len(),
                plan.total_questions
            );
        }
        info!(
            "Composed quiz with {} questions over {} topics",
            questions.len(),
            plan.topic_count()
        );

        Ok(ComposedQuiz { plan, questions })
    }
}

fn difficulty_hint(status: TopicStatus) -> &'static str {
    match status {
        TopicStatus::Failed => "easy to medium, focus on fundamentals",
        TopicStatus::Medium => "medium",
        TopicStatus::Pending => "mixed",
        TopicStatus::Mastered => "hard, test deeper understanding",
    }
}

/// Render the plan as a generation prompt.
pub fn build_prompt(
    plan: &DistributionPlan,
    source_text: Option<&str>,
    settings: &QuizSettings,
) -> String {
    let mut prompt = format!(
        "Create exactly {} multiple-choice quiz questions written in {}.\n\
         Distribute them across the sub-topics exactly as listed:\n",
        plan.total_questions, settings.language
    );

    for (status, allocation) in plan.iter() {
        prompt.push_str(&format!(
            "- {}: {} question{} (difficulty: {})\n",
            allocation.topic.sub_topic_name,
            allocation.question_count,
            if allocation.question_count == 1 { "" } else { "s" },
            difficulty_hint(status)
        ));
    }

    if let Some(text) = source_text.filter(|t| !t.trim().is_empty()) {
        let excerpt: String = text.chars().take(settings.max_context_chars).collect();
        prompt.push_str("\nBase every question on this study material:\n\"\"\"\n");
        prompt.push_str(&excerpt);
        prompt.push_str("\n\"\"\"\n");
    }

    prompt.push_str(
        "\nEach question has 4 options and exactly one correct answer. \
         `correctAnswer` must repeat one of the options verbatim and `subTopicName` \
         must repeat the sub-topic name exactly as listed.\n\
         Respond with JSON only, in this shape:\n\
         {\"questions\": [{\"id\": \"q1\", \"questionText\": \"...\", \
         \"options\": [\"...\", \"...\", \"...\", \"...\"], \"correctAnswer\": \"...\", \
         \"explanation\": \"...\", \"subTopicName\": \"...\", \
         \"difficulty\": \"easy|medium|hard\"}]}\n",
    );

    prompt
}

/// Accepted top-level shapes, tried in order.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionPayload {
    List(Vec<Value>),
    Wrapped { questions: Vec<Value> },
}

/// A question as the model wrote it; every field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    id: Option<Value>,
    #[serde(alias = "question")]
    question_text: Option<String>,
    options: Option<Vec<Value>>,
    #[serde(alias = "answer")]
    correct_answer: Option<Value>,
    explanation: Option<String>,
    #[serde(alias = "subTopic")]
    sub_topic_name: Option<String>,
    difficulty: Option<String>,
}

/// Decode and validate a parsed response into questions.
///
/// Fails on the first question missing a required field; the error names
/// the question id (or a synthesized `q{n}` id) and its index.
pub fn validate_questions(
    payload: Value,
    normalizer: &NormalizerOptions,
) -> Result<Vec<QuizQuestion>, ValidationError> {
    let payload_preview = preview(&payload.to_string());
    let items = match serde_json::from_value::<QuestionPayload>(payload) {
        Ok(QuestionPayload::List(items)) => items,
        Ok(QuestionPayload::Wrapped { questions }) => questions,
        Err(_) => {
            return Err(ValidationError {
                question_id: "-".to_string(),
                index: 0,
                field: "questions",
                reason: "expected an array of questions or an object with a `questions` array"
                    .to_string(),
                preview: payload_preview,
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| validate_question(index, item, normalizer))
        .collect()
}

fn validate_question(
    index: usize,
    item: Value,
    normalizer: &NormalizerOptions,
) -> Result<QuizQuestion, ValidationError> {
    let item_preview = preview(&item.to_string());
    let fallback_id = format!("q{}", index + 1);
    let fail = |id: &str, field: &'static str, reason: &str| ValidationError {
        question_id: id.to_string(),
        index,
        field,
        reason: reason.to_string(),
        preview: item_preview.clone(),
    };

    let raw: RawQuestion = serde_json::from_value(item)
        .map_err(|e| fail(&fallback_id, "question", &format!("not a question object: {}", e)))?;

    let id = raw
        .id
        .as_ref()
        .and_then(scalar_text)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback_id);

    let question_text = raw
        .question_text
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| fail(&id, "questionText", "missing questionText"))?;

    let options: Vec<String> = raw
        .options
        .ok_or_else(|| fail(&id, "options", "missing options"))?
        .iter()
        .filter_map(scalar_text)
        .collect();
    if options.is_empty() {
        return Err(fail(&id, "options", "options must be a non-empty array"));
    }
    if options.len() < 2 {
        return Err(fail(&id, "options", "at least two options are required"));
    }

    let answer = raw
        .correct_answer
        .as_ref()
        .and_then(scalar_text)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| fail(&id, "correctAnswer", "missing correctAnswer"))?;

    let sub_topic_name = raw
        .sub_topic_name
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| fail(&id, "subTopicName", "missing subTopicName"))?;

    let correct_answer = resolve_answer(&answer, &options).ok_or_else(|| {
        fail(
            &id,
            "correctAnswer",
            &format!("correctAnswer {:?} is not one of the options", answer),
        )
    })?;

    let difficulty = raw
        .difficulty
        .as_deref()
        .and_then(Difficulty::parse)
        .unwrap_or_default();

    Ok(QuizQuestion {
        id,
        question_text,
        normalized_sub_topic_name: normalize_with(&sub_topic_name, normalizer),
        sub_topic_name,
        options,
        correct_answer,
        explanation: raw.explanation.unwrap_or_default(),
        difficulty,
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Match the model's answer to an option: verbatim, then ignoring
/// surrounding whitespace, then as an option letter (`B`, `b)`, `C.`).
fn resolve_answer(answer: &str, options: &[String]) -> Option<String> {
    if let Some(exact) = options.iter().find(|o| o.as_str() == answer) {
        return Some(exact.clone());
    }
    let trimmed = answer.trim();
    if let Some(close) = options.iter().find(|o| o.trim() == trimmed) {
        return Some(close.clone());
    }

    let letter = trimmed.trim_end_matches([')', '.', ':']);
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            let idx = (c.to_ascii_uppercase() as u8 - b'A') as usize;
            options.get(idx).cloned()
        }
        _ => None,
    }
}
