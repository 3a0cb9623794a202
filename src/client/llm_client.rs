//! Chat-completions risk classifier.
//!
//! Epistemic foundation:
//! - K_i: Azure OpenAI and OpenAI-compatible servers share the chat schema
//! - B_i: API will respond within timeout (might fail)
//! - B_i: Response will be valid JSON with one choice (might fail)
//! - I^B: Network availability unknowable → surface as retryable, never guess

use crate::client::{ClassificationTask, RiskClassifier};
use crate::models::{
    ApiFlavor, ConfigError, ResolvedClassifier, Result, TriageError, UnavailableCause,
    UserContext,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Risk classifier backed by a chat-completions deployment.
///
/// Everything here is fixed at construction. One HTTP call per
/// `classify`; retries belong to the caller.
pub struct ChatClassifier {
    client: reqwest::Client,
    url: String,
    /// Sent as `model` for OpenAI-compatible endpoints
    model: Option<String>,
    deployment: String,
    task: ClassificationTask,
    timeout: Duration,
    max_tokens: u32,
    temperature: f64,
}

impl ChatClassifier {
    /// Create a classifier from resolved settings.
    pub fn new(
        settings: &ResolvedClassifier,
        task: ClassificationTask,
    ) -> std::result::Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let (url, model) = match settings.flavor {
            ApiFlavor::Azure => {
                let mut key = HeaderValue::from_str(&settings.api_key).map_err(|_| invalid_key())?;
                key.set_sensitive(true);
                headers.insert("api-key", key);
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    settings.endpoint, settings.deployment, settings.api_version
                );
                (url, None)
            }
            ApiFlavor::OpenAi => {
                let mut bearer = HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
                    .map_err(|_| invalid_key())?;
                bearer.set_sensitive(true);
                headers.insert(AUTHORIZATION, bearer);
                let url = format!("{}/chat/completions", settings.endpoint);
                (url, Some(settings.deployment.clone()))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "classifier",
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            url,
            model,
            deployment: settings.deployment.clone(),
            task,
            timeout: settings.timeout,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }

    /// Full request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn task(&self) -> &ClassificationTask {
        &self.task
    }
}

fn invalid_key() -> ConfigError {
    ConfigError::InvalidValue {
        field: "api_key",
        reason: "contains characters not allowed in an HTTP header".to_string(),
    }
}

/// Map a non-success status to a classifier error.
///
/// 429, 408 and 5xx are transient. Everything else means the request
/// itself was refused and retrying will not help.
fn status_error(status: StatusCode, body: &str, retry_after: Option<f64>) -> TriageError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(500).collect());

    match status {
        StatusCode::TOO_MANY_REQUESTS => UnavailableCause::RateLimited {
            retry_after_secs: retry_after,
        }
        .into(),
        StatusCode::REQUEST_TIMEOUT => UnavailableCause::ServerError {
            status: status.as_u16(),
            message,
        }
        .into(),
        s if s.is_server_error() => UnavailableCause::ServerError {
            status: s.as_u16(),
            message,
        }
        .into(),
        s => TriageError::ClassifierRejected {
            status: s.as_u16(),
            message,
        },
    }
}

/// Pull the label out of a successful response body.
fn extract_label(body: &str) -> Result<String> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| TriageError::MalformedResponse(format!("Failed to parse response: {e}")))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TriageError::MalformedResponse("No choices in response".to_string()))?
        .message
        .content
        .ok_or_else(|| TriageError::MalformedResponse("Choice has no content".to_string()))?;

    if content.trim().is_empty() {
        return Err(TriageError::MalformedResponse(
            "Choice content is empty".to_string(),
        ));
    }

    Ok(content)
}

#[async_trait]
impl RiskClassifier for ChatClassifier {
    /// Classify a context.
    ///
    /// B_i(API available) → Result
    /// B_i(valid response) → Result
    async fn classify(&self, context: &UserContext) -> Result<String> {
        let start = Instant::now();

        let request = ChatCompletionRequest {
            model: self.model.as_deref(),
            messages: self.task.messages(context),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UnavailableCause::Timeout(self.timeout)
                } else {
                    UnavailableCause::Network(e)
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok());

        // A body that cannot be read is a transport failure; content
        // problems are caught by extract_label.
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                UnavailableCause::Timeout(self.timeout)
            } else {
                UnavailableCause::Network(e)
            }
        })?;

        debug!(
            deployment = %self.deployment,
            task = %self.task.id(),
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Classifier responded"
        );

        if !status.is_success() {
            return Err(status_error(status, &body, retry_after));
        }

        extract_label(&body)
    }

    fn name(&self) -> &str {
        &self.deployment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP stub: accepts a single connection, captures the
    /// request, replies with the canned response (or never, if `None`).
    async fn stub_server(
        response: Option<String>,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            match response {
                Some(raw) => {
                    socket.write_all(raw.as_bytes()).await.unwrap();
                    socket.shutdown().await.ok();
                }
                None => std::future::pending::<()>().await,
            }
            request
        });

        (format!("http://{addr}"), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    fn chat_body(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    fn settings(endpoint: &str, flavor: ApiFlavor) -> ResolvedClassifier {
        ResolvedClassifier {
            flavor,
            endpoint: endpoint.to_string(),
            deployment: "kyc-risk".to_string(),
            api_key: "test-key".to_string(),
            api_version: "2024-06-01".to_string(),
            timeout: Duration::from_secs(1),
            max_tokens: 8,
            temperature: 0.0,
        }
    }

    fn context() -> UserContext {
        UserContext::new("stable employment, clean history").unwrap()
    }

    fn classifier(endpoint: &str, flavor: ApiFlavor) -> ChatClassifier {
        ChatClassifier::new(&settings(endpoint, flavor), ClassificationTask::default()).unwrap()
    }

    #[tokio::test]
    async fn test_azure_request_shape_and_label() {
        let (endpoint, server) =
            stub_server(Some(http_response("200 OK", "", &chat_body(" Low\n")))).await;
        let classifier = classifier(&endpoint, ApiFlavor::Azure);

        let label = classifier.classify(&context()).await.unwrap();
        assert_eq!(label, " Low\n");

        let request = server.await.unwrap();
        assert!(request.starts_with(
            "POST /openai/deployments/kyc-risk/chat/completions?api-version=2024-06-01 HTTP/1.1"
        ));
        assert!(request.to_lowercase().contains("api-key: test-key"));
        assert!(request.contains("stable employment, clean history"));
        assert!(!request.contains("\"model\""));
    }

    #[tokio::test]
    async fn test_openai_flavor_sends_model_and_bearer() {
        let (endpoint, server) =
            stub_server(Some(http_response("200 OK", "", &chat_body("High")))).await;
        let classifier = classifier(&endpoint, ApiFlavor::OpenAi);
        assert_eq!(classifier.url(), format!("{endpoint}/chat/completions"));

        assert_eq!(classifier.classify(&context()).await.unwrap(), "High");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /chat/completions HTTP/1.1"));
        assert!(request.to_lowercase().contains("authorization: bearer test-key"));
        assert!(request.contains("\"model\":\"kyc-risk\""));
    }

    #[tokio::test]
    async fn test_rate_limited_carries_retry_after() {
        let body = r#"{"error": {"message": "Too many requests"}}"#;
        let (endpoint, _server) = stub_server(Some(http_response(
            "429 Too Many Requests",
            "Retry-After: 7\r\n",
            body,
        )))
        .await;
        let classifier = classifier(&endpoint, ApiFlavor::Azure);

        let err = classifier.classify(&context()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(7.0));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let (endpoint, _server) = stub_server(Some(http_response(
            "503 Service Unavailable",
            "",
            "upstream overloaded",
        )))
        .await;
        let classifier = classifier(&endpoint, ApiFlavor::Azure);

        let err = classifier.classify(&context()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClassifierUnavailable);
        assert!(err.to_string().contains("upstream overloaded"));
    }

    #[tokio::test]
    async fn test_auth_failure_is_rejected_not_retryable() {
        let body = r#"{"error": {"message": "Access denied due to invalid subscription key"}}"#;
        let (endpoint, _server) =
            stub_server(Some(http_response("401 Unauthorized", "", body))).await;
        let classifier = classifier(&endpoint, ApiFlavor::Azure);

        match classifier.classify(&context()).await {
            Err(TriageError::ClassifierRejected { status, message }) => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid subscription key"));
            }
            other => panic!("expected ClassifierRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let (endpoint, _server) =
            stub_server(Some(http_response("200 OK", "", r#"{"choices": []}"#))).await;
        let classifier = classifier(&endpoint, ApiFlavor::Azure);

        let err = classifier.classify(&context()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_truncated_body_is_unavailable() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 500\r\n\r\n{\"choi";
        let (endpoint, _server) = stub_server(Some(raw.to_string())).await;
        let classifier = classifier(&endpoint, ApiFlavor::Azure);

        let err = classifier.classify(&context()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClassifierUnavailable);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_hung_server_times_out() {
        let (endpoint, _server) = stub_server(None).await;
        let classifier = classifier(&endpoint, ApiFlavor::Azure);

        match classifier.classify(&context()).await {
            Err(TriageError::ClassifierUnavailable(UnavailableCause::Timeout(d))) => {
                assert_eq!(d, Duration::from_secs(1));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let classifier = classifier(&format!("http://{addr}"), ApiFlavor::Azure);

        let err = classifier.classify(&context()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_extract_label() {
        assert_eq!(extract_label(&chat_body("Medium")).unwrap(), "Medium");
        assert!(extract_label("not json").is_err());
        assert!(extract_label(r#"{"choices":[{"message":{"content":null}}]}"#).is_err());
        assert!(extract_label(&chat_body("   ")).is_err());
    }

    #[test]
    fn test_invalid_api_key_header() {
        let mut s = settings("http://localhost", ApiFlavor::Azure);
        s.api_key = "bad\nkey".to_string();
        assert!(matches!(
            ChatClassifier::new(&s, ClassificationTask::default()),
            Err(ConfigError::InvalidValue { field: "api_key", .. })
        ));
    }
}
