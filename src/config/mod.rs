//! Configuration Management
//!
//! Loads pipeline configuration from TOML files.
//! Configuration includes:
//! - Provider settings (endpoint, model, credentials, timeout)
//! - Retry policy for generation calls
//! - Topic normalization and deduplication knobs
//! - Quiz composition defaults

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::retry::RetrySettings;
use crate::errors::QuizforgeError;
use crate::quiz::composer::QuizSettings;
use crate::text::{NormalizerOptions, DEFAULT_SIMILARITY_THRESHOLD};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub normalizer: NormalizerOptions,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub quiz: QuizSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Pairs scoring strictly above this are near-duplicates
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            retry: RetrySettings::default(),
            normalizer: NormalizerOptions::default(),
            dedup: DedupConfig::default(),
            quiz: QuizSettings::default(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8000/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> usize {
    4096
}
fn default_request_timeout() -> u64 {
    120
}
fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn parse_toml(content: &str, origin: &str) -> std::result::Result<Config, QuizforgeError> {
    toml::from_str(content)
        .map_err(|e| QuizforgeError::Config(format!("Failed to parse config {}: {}", origin, e)))
}

impl Config {
    /// Load from `path`, or from `quizforge.toml` then
    /// `~/.config/quizforge/config.toml`, falling back to defaults.
    /// `QUIZFORGE_*` environment variables override file values.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|e| {
                    QuizforgeError::Config(format!("Failed to read config from {}: {}", p, e))
                })?;
                parse_toml(&content, p)?
            }
            None => {
                let mut candidates = vec![std::path::PathBuf::from("quizforge.toml")];
                if let Some(home) = dirs::home_dir() {
                    candidates.push(home.join(".config/quizforge/config.toml"));
                }

                let mut loaded = None;
                for p in &candidates {
                    if let Ok(content) = std::fs::read_to_string(p) {
                        debug!("Loading config from {}", p.display());
                        loaded = Some(parse_toml(&content, &p.display().to_string())?);
                        break;
                    }
                }
                loaded.unwrap_or_else(|| {
                    debug!("No config file found, using defaults");
                    Self::default()
                })
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `QUIZFORGE_*` overrides; unparsable numbers are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("QUIZFORGE_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(model) = lookup("QUIZFORGE_MODEL") {
            self.model = model;
        }
        if let Some(api_key) = lookup("QUIZFORGE_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(t) = lookup("QUIZFORGE_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
            self.request_timeout_secs = t;
        }
        if let Some(n) = lookup("QUIZFORGE_MAX_RETRIES").and_then(|v| v.parse::<u32>().ok()) {
            self.retry.max_retries = n;
        }
    }

    pub fn validate(&self) -> std::result::Result<(), QuizforgeError> {
        let fail = |msg: String| Err(QuizforgeError::Config(msg));

        if self.endpoint.trim().is_empty() {
            return fail("endpoint must not be empty".into());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return fail(format!("temperature {} is outside 0.0..=2.0", self.temperature));
        }
        if self.max_tokens == 0 {
            return fail("max_tokens must be positive".into());
        }
        if self.request_timeout_secs == 0 {
            return fail("request_timeout_secs must be positive".into());
        }
        if self.retry.max_retries == 0 {
            return fail("retry.max_retries must be at least 1".into());
        }
        if self.retry.backoff_factor < 1.0 {
            return fail(format!(
                "retry.backoff_factor {} must be at least 1.0",
                self.retry.backoff_factor
            ));
        }
        if self.retry.min_delay_ms > self.retry.max_delay_ms {
            return fail("retry.min_delay_ms exceeds retry.max_delay_ms".into());
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            return fail(format!(
                "dedup.similarity_threshold {} is outside 0.0..=1.0",
                self.dedup.similarity_threshold
            ));
        }
        if self.quiz.default_total_questions == 0 {
            return fail("quiz.default_total_questions must be positive".into());
        }
        Ok(())
    }
}
