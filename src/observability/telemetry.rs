//! Telemetry
//!
//! Structured logging for pipeline stages.
//! - Stage spans with timing and outcome
//! - Retry attempt logging
//! - Log-injection and secret scrubbing for model-provided text
//! - Log levels via RUST_LOG

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use regex::Regex;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::{RetryEvent, RetryObserver};

/// Escape control characters so model output cannot forge log lines.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x1b' => out.push_str("\\e"),
            '\x00' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"(?i)(sk-|key-|token-)[A-Za-z0-9_\-]{8,}",
            r"(?i)Bearer\s+[A-Za-z0-9_\-\.]{8,}",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Replace API keys and bearer tokens with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    let mut result = input.to_string();
    for pattern in secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}

/// Initialize the global subscriber, but only when RUST_LOG is set.
/// Without it nothing is installed and CLI output stays clean.
pub fn init_tracing() {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        init_tracing_with_filter(&filter);
    }
}

pub fn init_tracing_verbose() {
    init_tracing_with_filter("info")
}

/// Initialize with a custom filter string. Later calls are no-ops.
pub fn init_tracing_with_filter(filter: &str) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_level(true)
            .compact()
            .with_writer(std::io::stderr);

        let filter_layer = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// Run one pipeline stage inside a span that records duration and outcome.
pub async fn track_stage<F, Fut, T, E>(stage: &str, f: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let span = info_span!(
        "pipeline.stage",
        stage = stage,
        duration_ms = tracing::field::Empty,
        success = tracing::field::Empty,
    );

    let outcome = f().instrument(span.clone()).await;
    let duration = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration);
    span.record("success", outcome.is_ok());

    let _enter = span.enter();
    match &outcome {
        Ok(_) => info!(duration_ms = duration, "Stage {} completed", stage),
        Err(e) => {
            let safe_err = redact_secrets(&sanitize_for_log(&e.to_string()));
            error!(duration_ms = duration, error = safe_err.as_str(), "Stage {} failed", stage);
        }
    }
    outcome
}

/// A [`RetryObserver`] that logs each scheduled retry at warn level.
pub fn logging_retry_observer() -> RetryObserver {
    Arc::new(|event: &RetryEvent| {
        let safe_err = redact_secrets(&sanitize_for_log(&event.error));
        warn!(
            attempt = event.attempt,
            max_attempts = event.max_attempts,
            delay_ms = event.delay.as_millis() as u64,
            error = safe_err.as_str(),
            "Generation attempt failed, retrying"
        );
    })
}
