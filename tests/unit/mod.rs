//! Unit tests for quizforge modules
//!
//! Network tests talk to a loopback mock provider only.

mod test_api;
mod test_cli;
mod test_config;
mod test_error_paths;
mod test_pipeline;
