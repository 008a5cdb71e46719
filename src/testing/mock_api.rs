//! Mock chat-completions server for client tests.
//!
//! Emulates an OpenAI-compatible `POST .../chat/completions` endpoint so the
//! HTTP client can be exercised without a live provider.
//!
//! # Example
//! ```ignore
//! let server = MockLlmServer::builder()
//!     .with_error(503, "overloaded")
//!     .with_response(r#"{"questions": []}"#)
//!     .build()
//!     .await;
//! let endpoint = server.url(); // e.g. "http://127.0.0.1:12345/v1"
//! // ... point the client at `endpoint` ...
//! server.stop().await;
//! ```

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};

/// How the server answers one request.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A well-formed completion whose message content is this text.
    Text(String),
    /// A completion whose message content is `null`.
    EmptyContent,
    /// An HTTP error with the given status code and body.
    Error { status: u16, body: String },
    /// 429 with a `Retry-After` header.
    RateLimited { retry_after_secs: u64 },
    /// A 200 with an arbitrary body, for malformed-envelope cases.
    RawBody(String),
}

#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Served in FIFO order; afterwards `default_response` answers.
    pub responses: Vec<MockResponse>,
    pub default_response: MockResponse,
    /// Added before every response
    pub latency_ms: u64,
    pub model: String,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            responses: Vec::new(),
            default_response: MockResponse::Error {
                status: 500,
                body: "mock script exhausted".to_string(),
            },
            latency_ms: 0,
            model: "mock-model".to_string(),
        }
    }
}

#[derive(Default)]
pub struct MockLlmServerBuilder {
    config: MockServerConfig,
}

impl MockLlmServerBuilder {
    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.config.responses.push(MockResponse::Text(text.into()));
        self
    }

    pub fn with_error(mut self, status: u16, body: impl Into<String>) -> Self {
        self.config.responses.push(MockResponse::Error {
            status,
            body: body.into(),
        });
        self
    }

    pub fn with_mock(mut self, response: MockResponse) -> Self {
        self.config.responses.push(response);
        self
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.config.latency_ms = ms;
        self
    }

    pub fn with_default_response(mut self, resp: MockResponse) -> Self {
        self.config.default_response = resp;
        self
    }

    pub async fn build(self) -> MockLlmServer {
        MockLlmServer::start(self.config).await
    }
}

/// Handle to a running mock server; stop it with [`MockLlmServer::stop`].
pub struct MockLlmServer {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockLlmServer {
    pub fn builder() -> MockLlmServerBuilder {
        MockLlmServerBuilder::default()
    }

    /// Bind `127.0.0.1:0` and serve in a background task.
    ///
    /// # Panics
    /// If the loopback listener cannot be bound. Test-only helper.
    pub async fn start(config: MockServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let addr = listener.local_addr().expect("failed to get local addr");
        let url = format!("http://{}/v1", addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(accept_loop(
            listener,
            Arc::new(config),
            Arc::clone(&requests),
            shutdown_rx,
        ));

        Self {
            url,
            requests,
            shutdown_tx,
            handle,
        }
    }

    /// Endpoint base, including the `/v1` prefix.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw request bodies received so far.
    pub async fn request_bodies(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<MockServerConfig>,
    requests: Arc<Mutex<Vec<String>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let response_idx = Arc::new(Mutex::new(0usize));

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let cfg = Arc::clone(&config);
                        let idx = Arc::clone(&response_idx);
                        let log = Arc::clone(&requests);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, cfg, idx, log).await {
                                tracing::debug!("mock server connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => tracing::debug!("mock server accept error: {}", e),
                }
            }
        }
    }
}

/// Read headers plus a `Content-Length` body.
async fn read_request(stream: &mut tokio::net::TcpStream) -> std::io::Result<(String, String)> {
    let mut buf = Vec::with_capacity(8192);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok((String::new(), String::new()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    Ok((head, body))
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    config: Arc<MockServerConfig>,
    response_idx: Arc<Mutex<usize>>,
    requests: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let (head, body) = read_request(&mut stream).await?;
    if head.is_empty() {
        return Ok(());
    }

    let is_chat = head.starts_with("POST") && head.contains("/chat/completions");
    if !is_chat {
        return write_http_response(&mut stream, 404, "", &[]).await;
    }
    requests.lock().await.push(body);

    if config.latency_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(config.latency_ms)).await;
    }

    let mock_response = {
        let mut idx = response_idx.lock().await;
        match config.responses.get(*idx) {
            Some(resp) => {
                *idx += 1;
                resp.clone()
            }
            None => config.default_response.clone(),
        }
    };

    match mock_response {
        MockResponse::Text(text) => {
            let body = format_chat_response(&config.model, Some(&text));
            write_http_response(&mut stream, 200, &body, &[]).await
        }
        MockResponse::EmptyContent => {
            let body = format_chat_response(&config.model, None);
            write_http_response(&mut stream, 200, &body, &[]).await
        }
        MockResponse::Error { status, body } => {
            write_http_response(&mut stream, status, &body, &[]).await
        }
        MockResponse::RateLimited { retry_after_secs } => {
            let header = format!("Retry-After: {}", retry_after_secs);
            write_http_response(&mut stream, 429, "slow down", &[header]).await
        }
        MockResponse::RawBody(body) => write_http_response(&mut stream, 200, &body, &[]).await,
    }
}

fn format_chat_response(model: &str, content: Option<&str>) -> String {
    serde_json::json!({
        "id": "mock-resp-1",
        "object": "chat.completion",
        "created": 1_700_000_000u64,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
    .to_string()
}

async fn write_http_response(
    stream: &mut tokio::net::TcpStream,
    status: u16,
    body: &str,
    extra_headers: &[String],
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };
    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        reason,
        body.len()
    );
    for header in extra_headers {
        response.push_str(header);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    response.push_str(body);

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}
