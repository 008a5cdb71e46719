//! Sub-topic extraction from study material.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Deduplicator, TopicCandidate};
use crate::api::{RetryingInvoker, TextGenerator};
use crate::errors::{preview, QuizforgeError, ValidationError};
use crate::response_parser::parse_response;
use crate::text::NormalizerOptions;

/// Accepted response shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TopicPayload {
    List(Vec<Value>),
    Wrapped {
        #[serde(alias = "subTopics")]
        topics: Vec<Value>,
    },
}

/// Asks the model for the sub-topics of a document, then normalizes and
/// deduplicates what comes back.
pub struct TopicExtractor {
    generator: Arc<dyn TextGenerator>,
    invoker: RetryingInvoker,
    normalizer: NormalizerOptions,
    deduplicator: Deduplicator,
    max_topics: usize,
}

impl TopicExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, invoker: RetryingInvoker) -> Self {
        Self {
            generator,
            invoker,
            normalizer: NormalizerOptions::default(),
            deduplicator: Deduplicator::default(),
            max_topics: 12,
        }
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerOptions) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_deduplicator(mut self, deduplicator: Deduplicator) -> Self {
        self.deduplicator = deduplicator;
        self
    }

    pub fn with_max_topics(mut self, max_topics: usize) -> Self {
        self.max_topics = max_topics.max(1);
        self
    }

    pub fn prompt(&self, document: &str) -> String {
        format!(
            "List the distinct sub-topics a student must master to understand the \
             study material below. Give at most {} short sub-topic names.\n\
             Respond with JSON only, in this shape:\n\
             {{\"subTopics\": [\"...\", \"...\"]}}\n\n\
             Study material:\n\"\"\"\n{}\n\"\"\"\n",
            self.max_topics, document
        )
    }

    pub async fn extract(
        &self,
        document: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TopicCandidate>, QuizforgeError> {
        let generation = self
            .invoker
            .generate(self.generator.as_ref(), &self.prompt(document), cancel)
            .await?;

        let payload: Value = parse_response(&generation.text)?;
        let names = topic_names(payload)?;
        debug!("Model proposed {} sub-topics", names.len());

        let candidates = candidates_from_names(&names, &self.normalizer, &self.deduplicator);
        info!("Extracted {} distinct sub-topics", candidates.len());
        Ok(candidates)
    }
}

/// Pull display names out of a topic payload.
///
/// Items may be strings or objects carrying `name`, `subTopicName` or
/// `topic`; blank names are skipped.
pub fn topic_names(payload: Value) -> Result<Vec<String>, ValidationError> {
    let payload_preview = preview(&payload.to_string());
    let items = match serde_json::from_value::<TopicPayload>(payload) {
        Ok(TopicPayload::List(items)) | Ok(TopicPayload::Wrapped { topics: items }) => items,
        Err(_) => {
            return Err(ValidationError {
                question_id: "-".to_string(),
                index: 0,
                field: "subTopics",
                reason: "expected an array of topics or an object with a `subTopics` array"
                    .to_string(),
                preview: payload_preview,
            })
        }
    };

    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => ["name", "subTopicName", "topic"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect())
}

/// Normalize then deduplicate display names.
pub fn candidates_from_names(
    names: &[String],
    normalizer: &NormalizerOptions,
    deduplicator: &Deduplicator,
) -> Vec<TopicCandidate> {
    let candidates: Vec<TopicCandidate> = names
        .iter()
        .map(|n| TopicCandidate::new(n.as_str(), normalizer))
        .collect();
    deduplicator.dedupe(&candidates)
}
