//! Logging and tracing setup.

pub mod telemetry;

pub use telemetry::{
    init_tracing, init_tracing_verbose, init_tracing_with_filter, logging_retry_observer,
    redact_secrets, sanitize_for_log, track_stage,
};
