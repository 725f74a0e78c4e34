//! HTTP client for the local RAG API and the inference service.

mod fallback;

pub use fallback::fallback_answer;

use crate::model::OllamaHealth;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest<'a> {
    question: &'a str,
    top_k: u32,
    rerank_top_k: u32,
    enable_reranking: bool,
}

impl<'a> AskRequest<'a> {
    fn new(question: &'a str) -> Self {
        Self {
            question,
            top_k: 12,
            rerank_top_k: 6,
            enable_reranking: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    success: bool,
    #[serde(default)]
    response: Option<AskAnswer>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskAnswer {
    answer: String,
    #[serde(default)]
    overall_confidence: f64,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<serde_json::Value>,
}

/// Result of a single question.
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    Answer { answer: String, confidence: f64 },
    /// The service answered but reported `success: false`.
    Failed(String),
    HttpError { status: u16, body: String },
    /// The service was unreachable; carries the local canned answer.
    Fallback(String),
    Timeout,
    Error(String),
}

impl AskOutcome {
    /// Text shown for an answer, confidence appended with two decimals.
    pub fn format_answer(answer: &str, confidence: f64) -> String {
        format!("{answer}\n\n[Confidence: {confidence:.2}]")
    }
}

/// Result of a liveness check against the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCheck {
    Healthy,
    HttpStatus(u16),
    Unreachable,
    Failed(String),
}

impl ConnectionCheck {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ConnectionCheck::Healthy)
    }
}

#[derive(Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    api_base: String,
    ollama_url: String,
    ask_timeout: Duration,
    check_timeout: Duration,
    connected: Arc<AtomicBool>,
}

impl QueryClient {
    pub fn new(api_base: impl Into<String>, ollama_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("copilot-control/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            ollama_url: ollama_url.into().trim_end_matches('/').to_string(),
            ask_timeout: DEFAULT_ASK_TIMEOUT,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Override the question and health-check request timeouts.
    pub fn with_timeouts(mut self, ask: Duration, check: Duration) -> Self {
        self.ask_timeout = ask;
        self.check_timeout = check;
        self
    }

    /// Same connection pool and connectivity flag, new endpoints.
    pub fn with_endpoints(&self, api_base: impl Into<String>, ollama_url: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            ollama_url: ollama_url.into().trim_end_matches('/').to_string(),
            ask_timeout: self.ask_timeout,
            check_timeout: self.check_timeout,
            connected: self.connected.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub async fn ask(&self, question: &str) -> AskOutcome {
        let url = format!("{}/api/rag/ask", self.api_base);
        let res = self
            .http
            .post(&url)
            .json(&AskRequest::new(question))
            .timeout(self.ask_timeout)
            .send()
            .await;

        let resp = match res {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                tracing::warn!(%url, "ask timed out");
                return AskOutcome::Timeout;
            }
            Err(e) if e.is_connect() => {
                tracing::info!(%url, "query service unreachable, answering locally: {e}");
                self.set_connected(false);
                return AskOutcome::Fallback(fallback_answer(question));
            }
            Err(e) => return AskOutcome::Error(e.to_string()),
        };

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            self.set_connected(false);
            return AskOutcome::HttpError {
                status: status.as_u16(),
                body,
            };
        }

        let parsed: AskResponse = match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) if e.is_timeout() => return AskOutcome::Timeout,
            Err(e) => return AskOutcome::Error(format!("malformed response: {e}")),
        };

        if !parsed.success {
            return AskOutcome::Failed(
                parsed
                    .error
                    .unwrap_or_else(|| "Unknown error occurred".into()),
            );
        }

        match parsed.response {
            Some(answer) => {
                self.set_connected(true);
                AskOutcome::Answer {
                    answer: answer.answer,
                    confidence: answer.overall_confidence,
                }
            }
            None => AskOutcome::Error("malformed response: missing `response`".into()),
        }
    }

    /// Call `GET /health`; updates and returns the connectivity flag.
    pub async fn test_connection(&self) -> ConnectionCheck {
        let url = format!("{}/health", self.api_base);
        let check = match self.http.get(&url).timeout(self.check_timeout).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => ConnectionCheck::Healthy,
            Ok(resp) => ConnectionCheck::HttpStatus(resp.status().as_u16()),
            Err(e) if e.is_connect() => ConnectionCheck::Unreachable,
            Err(e) => ConnectionCheck::Failed(e.to_string()),
        };
        tracing::debug!(%url, ?check, "health check");
        self.set_connected(check.is_healthy());
        check
    }

    /// Query the inference service's model listing.
    pub async fn check_ollama(&self) -> OllamaHealth {
        let url = format!("{}/api/tags", self.ollama_url);
        match self.http.get(&url).timeout(self.check_timeout).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                let models = resp
                    .json::<TagsResponse>()
                    .await
                    .map(|t| t.models.len())
                    .unwrap_or(0);
                OllamaHealth::Running { models }
            }
            Ok(resp) => OllamaHealth::Error {
                status: resp.status().as_u16(),
            },
            Err(e) => OllamaHealth::NotRunning {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    // Port 9 (discard) is essentially never bound on test hosts.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    fn client_for(base: &str) -> QueryClient {
        QueryClient::new(base, base).unwrap()
    }

    #[tokio::test]
    async fn ask_posts_fixed_payload_and_formats_answer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/rag/ask")
            .match_body(Matcher::Json(json!({
                "question": "What is X?",
                "topK": 12,
                "rerankTopK": 6,
                "enableReranking": true
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"response":{"answer":"X","overallConfidence":0.7}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let outcome = client.ask("What is X?").await;
        mock.assert_async().await;

        match outcome {
            AskOutcome::Answer { answer, confidence } => {
                let text = AskOutcome::format_answer(&answer, confidence);
                assert!(text.contains('X'));
                assert!(text.contains("0.70"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn ask_reports_service_error_message() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/rag/ask")
            .with_status(200)
            .with_body(r#"{"success":false,"error":"index empty"}"#)
            .create_async()
            .await;

        let outcome = client_for(&server.url()).ask("anything").await;
        assert_eq!(outcome, AskOutcome::Failed("index empty".into()));
    }

    #[tokio::test]
    async fn ask_failure_without_message_uses_default() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/rag/ask")
            .with_status(200)
            .with_body(r#"{"success":false}"#)
            .create_async()
            .await;

        let outcome = client_for(&server.url()).ask("anything").await;
        assert_eq!(outcome, AskOutcome::Failed("Unknown error occurred".into()));
    }

    #[tokio::test]
    async fn ask_non_200_marks_disconnected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/rag/ask")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let client = client_for(&server.url());
        client.set_connected(true);
        let outcome = client.ask("anything").await;
        assert_eq!(
            outcome,
            AskOutcome::HttpError {
                status: 503,
                body: "maintenance".into()
            }
        );
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn ask_malformed_body_is_generic_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/rag/ask")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        let outcome = client_for(&server.url()).ask("anything").await;
        assert!(matches!(outcome, AskOutcome::Error(msg) if msg.contains("malformed")));
    }

    #[tokio::test]
    async fn ask_unreachable_falls_back_to_greeting() {
        let client = client_for(UNREACHABLE);
        client.set_connected(true);
        let outcome = client.ask("hello").await;
        assert_eq!(outcome, AskOutcome::Fallback(fallback_answer("hello")));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn health_500_is_disconnected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(500)
            .create_async()
            .await;

        let client = client_for(&server.url());
        client.set_connected(true);
        let check = client.test_connection().await;
        assert_eq!(check, ConnectionCheck::HttpStatus(500));
        assert!(!check.is_healthy());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn health_200_is_connected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server.url());
        assert!(client.test_connection().await.is_healthy());
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn health_unreachable() {
        let client = client_for(UNREACHABLE);
        assert_eq!(client.test_connection().await, ConnectionCheck::Unreachable);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn ollama_counts_models() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama3"},{"name":"nomic-embed-text"}]}"#)
            .create_async()
            .await;

        let health = client_for(&server.url()).check_ollama().await;
        assert_eq!(health, OllamaHealth::Running { models: 2 });
    }

    #[tokio::test]
    async fn ollama_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(404)
            .create_async()
            .await;

        let health = client_for(&server.url()).check_ollama().await;
        assert_eq!(health, OllamaHealth::Error { status: 404 });
    }

    #[tokio::test]
    async fn timed_out_question_leaves_connectivity_alone() {
        // Accepted into the backlog but never answered.
        let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", silent.local_addr().unwrap());
        let client = client_for(&base)
            .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));

        client.set_connected(true);
        assert_eq!(client.ask("hello").await, AskOutcome::Timeout);
        assert!(client.is_connected());

        client.set_connected(false);
        assert_eq!(client.ask("hello").await, AskOutcome::Timeout);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn endpoints_swap_keeps_timeouts() {
        let client = client_for(UNREACHABLE)
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(2));
        let moved = client.with_endpoints(UNREACHABLE, UNREACHABLE);
        assert_eq!(moved.ask_timeout, Duration::from_secs(1));
        assert_eq!(moved.check_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn endpoints_swap_keeps_connectivity_flag() {
        let client = client_for(UNREACHABLE);
        client.set_connected(true);
        let moved = client.with_endpoints("http://127.0.0.1:1", UNREACHABLE);
        assert!(moved.is_connected());
        moved.set_connected(false);
        assert!(!client.is_connected());
    }
}
