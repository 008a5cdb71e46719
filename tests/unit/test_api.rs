//! HTTP client behind the retrying invoker, against the loopback mock server.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use quizforge::api::{
    ApiClient, RetryEvent, RetryObserver, RetryPolicy, RetryingInvoker, TextGenerator,
};
use quizforge::config::Config;
use quizforge::errors::ProviderError;
use quizforge::testing::mock_api::{MockLlmServer, MockResponse};
use tokio_util::sync::CancellationToken;

fn client(server: &MockLlmServer) -> ApiClient {
    let config = Config {
        endpoint: server.url().to_string(),
        request_timeout_secs: 5,
        api_key: Some("sk-test-key-123456".into()),
        ..Config::default()
    };
    ApiClient::new(&config).unwrap()
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff_factor: 2.0,
        min_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let server = MockLlmServer::builder()
        .with_error(503, "overloaded")
        .with_mock(MockResponse::RateLimited { retry_after_secs: 1 })
        .with_response("{\"ok\": true}")
        .build()
        .await;

    let delays = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&delays);
    let observer: RetryObserver = Arc::new(move |event: &RetryEvent| {
        seen.lock().push(event.delay);
    });
    let invoker = RetryingInvoker::new(fast_policy(3)).with_observer(observer);

    let client = client(&server);
    let generation = invoker
        .generate(&client, "prompt", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(generation.text, "{\"ok\": true}");
    // The 429 asks for a second; the policy caps the wait at 20ms.
    assert_eq!(
        *delays.lock(),
        vec![Duration::from_millis(5), Duration::from_millis(20)]
    );
    assert_eq!(server.request_bodies().await.len(), 3);
    server.stop().await;
}

#[tokio::test]
async fn test_exhaustion_reports_last_error() {
    let server = MockLlmServer::builder()
        .with_default_response(MockResponse::Error {
            status: 502,
            body: "bad gateway".into(),
        })
        .build()
        .await;

    let client = client(&server);
    let err = RetryingInvoker::new(fast_policy(2))
        .generate(&client, "prompt", &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ProviderError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, ProviderError::HttpStatus { status: 502, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(server.request_bodies().await.len(), 2);
    server.stop().await;
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockLlmServer::builder()
        .with_error(400, "bad request")
        .with_response("never served")
        .build()
        .await;

    let client = client(&server);
    let err = RetryingInvoker::new(fast_policy(3))
        .generate(&client, "prompt", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::HttpStatus { status: 400, .. }));
    assert_eq!(server.request_bodies().await.len(), 1);
    server.stop().await;
}

#[tokio::test]
async fn test_request_carries_model_and_prompt() {
    let server = MockLlmServer::builder().with_response("x").build().await;
    client(&server).generate("list the topics").await.unwrap();

    let body: serde_json::Value =
        serde_json::from_str(&server.request_bodies().await[0]).unwrap();
    assert_eq!(body["model"], Config::default().model);
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "list the topics");
    assert_eq!(body["stream"], false);
    server.stop().await;
}

#[tokio::test]
async fn test_cancel_interrupts_slow_provider() {
    let server = MockLlmServer::builder()
        .with_latency(2_000)
        .with_response("late")
        .build()
        .await;

    let client = client(&server);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = RetryingInvoker::new(fast_policy(3))
        .generate(&client, "prompt", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Cancelled));
    assert!(started.elapsed() < Duration::from_millis(1_500));
    server.stop().await;
}
