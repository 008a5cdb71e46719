//! Test doubles for the generation seam.
//!
//! - [`ScriptedGenerator`] answers from a queue, in process
//! - [`mock_api::MockLlmServer`] speaks the chat-completions wire format over HTTP

pub mod mock_api;

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::types::Generation;
use crate::api::TextGenerator;
use crate::errors::ProviderError;

/// A [`TextGenerator`] that replays queued outcomes and records every prompt.
///
/// Once the queue runs dry every call fails with
/// [`ProviderError::EmptyCompletion`].
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a generator that answers once with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    pub fn push(&self, outcome: Result<String, ProviderError>) {
        self.script.lock().push_back(outcome);
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generation, ProviderError> {
        self.prompts.lock().push(prompt.to_string());
        match self.script.lock().pop_front() {
            Some(Ok(text)) => Ok(Generation::new(text)),
            Some(Err(e)) => Err(e),
            None => Err(ProviderError::EmptyCompletion),
        }
    }
}
