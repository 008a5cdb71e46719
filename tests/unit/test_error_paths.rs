//! Error classification and exit codes
//!
//! Each pipeline stage fails with its own error type; these tests check the
//! mapping to process exit codes and which provider failures are retryable.

use quizforge::errors::{
    get_exit_code, DistributionError, ParseError, ProviderError, QuizforgeError,
    EXIT_DISTRIBUTION_ERROR, EXIT_ERROR, EXIT_PAYLOAD_ERROR, EXIT_PROVIDER_ERROR,
};
use quizforge::response_parser::{parse_optional, parse_response};
use quizforge::{plan_distribution, TopicBuckets};
use serde_json::Value;

#[test]
fn test_parse_errors_are_payload_errors() {
    let err = parse_response::<Value>("I cannot produce JSON today.").unwrap_err();
    assert!(matches!(err, ParseError::Unrecoverable { .. }));
    assert_eq!(get_exit_code(&anyhow::Error::new(err)), EXIT_PAYLOAD_ERROR);

    let err = parse_optional::<Value>(None).unwrap_err();
    assert!(matches!(err, ParseError::EmptyInput));
}

#[test]
fn test_unrecoverable_error_keeps_preview_short() {
    let junk = format!("{{ \"a\": {} ", "x".repeat(5_000));
    match parse_response::<Value>(&junk).unwrap_err() {
        ParseError::Unrecoverable { preview, .. } => {
            assert!(preview.chars().count() <= quizforge::errors::PREVIEW_LIMIT + 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_distribution_errors() {
    let err = plan_distribution(&TopicBuckets::default(), 10, true).unwrap_err();
    assert_eq!(err, DistributionError::NoTopics);
    let wrapped: anyhow::Error = QuizforgeError::from(err).into();
    assert_eq!(get_exit_code(&wrapped), EXIT_DISTRIBUTION_ERROR);
}

#[test]
fn test_provider_error_classification() {
    let transient = [
        ProviderError::Timeout,
        ProviderError::Network("connection reset".into()),
        ProviderError::RateLimit { retry_after_secs: None },
        ProviderError::HttpStatus { status: 500, message: String::new() },
    ];
    for err in transient {
        assert!(err.is_transient(), "{err:?} should be retryable");
    }

    let terminal = [
        ProviderError::HttpStatus { status: 401, message: String::new() },
        ProviderError::Parse("not json".into()),
        ProviderError::EmptyCompletion,
        ProviderError::Cancelled,
    ];
    for err in terminal {
        assert!(!err.is_transient(), "{err:?} should not be retried");
    }

    let wrapped = anyhow::Error::new(ProviderError::Timeout);
    assert_eq!(get_exit_code(&wrapped), EXIT_PROVIDER_ERROR);
}

#[test]
fn test_unknown_errors_exit_generic() {
    assert_eq!(get_exit_code(&anyhow::anyhow!("disk on fire")), EXIT_ERROR);
}
