use thiserror::Error;

/// Upper bound on the number of characters of offending text carried by an error.
pub const PREVIEW_LIMIT: usize = 200;

/// The central error type for quizforge.
///
/// Each pipeline stage has its own error enum so callers can decide on
/// recovery programmatically; this wrapper unifies them at the edges.
#[derive(Error, Debug)]
pub enum QuizforgeError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("AI provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// JSON extraction/repair failure on a model response.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("response text is empty")]
    EmptyInput,

    #[error("unrecoverable response after {attempts} decode attempts: {source} (text: {preview:?})")]
    Unrecoverable {
        attempts: usize,
        #[source]
        source: serde_json::Error,
        preview: String,
    },
}

/// The payload decoded but a question is missing something it must carry.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("question {question_id} (index {index}) is invalid: {reason} (question: {preview:?})")]
pub struct ValidationError {
    pub question_id: String,
    pub index: usize,
    pub field: &'static str,
    pub reason: String,
    pub preview: String,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limit exceeded")]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("provider returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("failed to decode provider response: {0}")]
    Parse(String),

    #[error("provider returned no completion text")]
    EmptyCompletion,

    #[error("request cancelled")]
    Cancelled,

    #[error("provider call failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Timeouts, connection failures, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout
            | ProviderError::Network(_)
            | ProviderError::RateLimit { .. } => true,
            ProviderError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Wait requested by the provider, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            ProviderError::RateLimit {
                retry_after_secs: Some(secs),
            } => Some(std::time::Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    #[error("no topics available in any bucket")]
    NoTopics,

    #[error("total question count must be at least 1, got {0}")]
    InvalidTotal(usize),
}

pub type Result<T> = std::result::Result<T, QuizforgeError>;

/// Truncate `text` to [`PREVIEW_LIMIT`] characters for diagnostics.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LIMIT) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_PAYLOAD_ERROR: u8 = 3;
pub const EXIT_PROVIDER_ERROR: u8 = 4;
pub const EXIT_DISTRIBUTION_ERROR: u8 = 5;

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<QuizforgeError>() {
        return match err {
            QuizforgeError::Config(_) => EXIT_CONFIG_ERROR,
            QuizforgeError::Parse(_) | QuizforgeError::Validation(_) => EXIT_PAYLOAD_ERROR,
            QuizforgeError::Provider(_) => EXIT_PROVIDER_ERROR,
            QuizforgeError::Distribution(_) => EXIT_DISTRIBUTION_ERROR,
            QuizforgeError::Other(_) => EXIT_ERROR,
        };
    }

    // Stage errors that went into anyhow without the wrapper
    if e.downcast_ref::<ParseError>().is_some() || e.downcast_ref::<ValidationError>().is_some() {
        return EXIT_PAYLOAD_ERROR;
    }
    if e.downcast_ref::<ProviderError>().is_some() {
        return EXIT_PROVIDER_ERROR;
    }
    if e.downcast_ref::<DistributionError>().is_some() {
        return EXIT_DISTRIBUTION_ERROR;
    }

    EXIT_ERROR
}
