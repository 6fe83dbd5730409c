//! OpenAI chat completions client
//!
//! One request per call: no retry, no backoff. The live completion request
//! has no client-side timeout; only the setup health check is bounded.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RuntimeContext;
use crate::history::Turn;

/// Timeout for the credential check run at startup
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters of one completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Turn>,
    pub max_tokens: u32,
    pub top_p: f64,
    pub temperature: f64,
    /// Opaque per-conversation tag, set to the conversation id
    pub user: String,
}

/// Anything that can turn a message list into the model's raw reply text
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Why the startup check failed
#[derive(Debug, Error)]
pub enum SetupError {
    /// The API key was rejected. Retrying will not help.
    #[error("invalid API key: {0}")]
    Authentication(String),
    /// The service could not be reached or answered with an error
    #[error("completion service not ready: {0}")]
    NotReady(String),
}

/// OpenAI REST client
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("mycroft/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Create a client from runtime context
    pub fn from_context(ctx: &RuntimeContext) -> Result<Self> {
        Self::new(ctx.openai_base_url(), ctx.api_key()?)
    }

    /// Validate credentials by listing the available models
    pub async fn check(&self) -> Result<(), SetupError> {
        let url = format!("{}/models", self.base_url);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(|err| SetupError::NotReady(format!("request to {url}: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        if status == StatusCode::UNAUTHORIZED {
            Err(SetupError::Authentication(message))
        } else {
            Err(SetupError::NotReady(message))
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        log::debug!(
            "POST {} model={} messages={}",
            url,
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(error_message(status, &body)));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .with_context(|| format!("parsing response from {url}"))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("completion response contained no choices"))
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Prefer the API's own error message over the raw body
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string());

    if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![Turn::user("hello"), Turn::assistant(r#"{"comment":"Ok!"}"#)],
            max_tokens: 150,
            top_p: 1.0,
            temperature: 0.5,
            user: "conv-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_complete_sends_parameters_and_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "user", "content": "hello"},
                    {"role": "assistant", "content": "{\"comment\":\"Ok!\"}"}
                ],
                "max_tokens": 150,
                "top_p": 1.0,
                "temperature": 0.5,
                "user": "conv-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "{\"comment\":\"Hi\"}"}},
                    {"message": {"role": "assistant", "content": "second"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), "sk-test").unwrap();
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, r#"{"comment":"Hi"}"#);
    }

    #[tokio::test]
    async fn test_complete_reports_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached", "type": "requests"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), "sk-test").unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("429"));
        assert!(text.contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn test_complete_without_choices_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), "sk-test").unwrap();
        assert!(client.complete(&request()).await.is_err());
    }

    #[tokio::test]
    async fn test_check_distinguishes_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer sk-good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer sk-bad"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let good = OpenAiClient::new(&server.uri(), "sk-good").unwrap();
        assert!(good.check().await.is_ok());

        let bad = OpenAiClient::new(&server.uri(), "sk-bad").unwrap();
        match bad.check().await {
            Err(SetupError::Authentication(message)) => {
                assert!(message.contains("Incorrect API key provided"))
            }
            other => panic!("expected authentication error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_server_error_is_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), "sk-test").unwrap();
        assert!(matches!(
            client.check().await,
            Err(SetupError::NotReady(_))
        ));
    }
}
