//! Quizforge - adaptive quizzes from unreliable model output
//!
//! The pipeline that sits between a language model and a quiz:
//!
//! - **Parsing**: recover JSON from fenced, chatty or slightly broken responses
//! - **Topics**: canonical topic keys, exact and near-duplicate removal
//! - **Composition**: weighted per-topic question allocation by mastery status
//! - **Retries**: bounded exponential backoff around provider calls, cancellable
//! - **Analysis**: per-topic and per-difficulty scoring with recommendations
//!
//! # Quick Start
//!
//! ```ignore
//! use quizforge::{ApiClient, Config, CompositionRequest, QuizComposer, RetryingInvoker};
//!
//! let config = Config::load(None)?;
//! let client = Arc::new(ApiClient::new(&config)?);
//! let composer = QuizComposer::new(client, RetryingInvoker::default());
//! let quiz = composer.compose(&request).await?;
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod quiz;
pub mod response_parser;
pub mod testing;
pub mod text;
pub mod topics;

pub use api::{ApiClient, RetryPolicy, RetryingInvoker, TextGenerator};
pub use config::Config;
pub use errors::{QuizforgeError, Result};
pub use quiz::{
    analyze, plan_distribution, AnalysisResult, ComposedQuiz, CompositionRequest, QuizComposer,
    QuizQuestion,
};
pub use response_parser::parse_response;
pub use topics::{dedupe, TopicBuckets, TopicCandidate, TopicExtractor, TopicRecord, TopicStatus};
