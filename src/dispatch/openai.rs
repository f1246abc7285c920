//! OpenAI chat-completions backend
//!
//! Classifies each HTTP response into a `DispatchOutcome` and lifts the
//! `x-ratelimit-*` headers into `BudgetFeedback` so the tracker always sees
//! the service's own view of the remaining allowance.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{CompletionBackend, CompletionRequest, DispatchOutcome};
use crate::budget::{parse_reset_duration, BudgetFeedback};
use crate::error::ReviewError;

/// Official OpenAI chat-completions endpoint
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const HEADER_REMAINING_REQUESTS: &str = "x-ratelimit-remaining-requests";
const HEADER_REMAINING_TOKENS: &str = "x-ratelimit-remaining-tokens";
const HEADER_RESET_REQUESTS: &str = "x-ratelimit-reset-requests";
const HEADER_RESET_TOKENS: &str = "x-ratelimit-reset-tokens";

pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: OPENAI_API_URL.to_string(),
        }
    }

    /// Override the endpoint (self-hosted gateways, tests)
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<DispatchOutcome, ReviewError> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let feedback = feedback_from_headers(response.headers());
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(DispatchOutcome::Throttled { feedback });
        }

        if status.is_success() {
            let parsed: ChatResponse = response.json().await?;
            let text = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            return Ok(DispatchOutcome::Completed { text, feedback });
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(parsed) => parsed.error.message,
            Err(_) => "unknown error".to_string(),
        };
        Ok(DispatchOutcome::Failed {
            status: status.as_u16(),
            message,
        })
    }
}

fn feedback_from_headers(headers: &HeaderMap) -> BudgetFeedback {
    let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    BudgetFeedback {
        remaining_requests: text(HEADER_REMAINING_REQUESTS).and_then(|v| v.parse().ok()),
        remaining_tokens: text(HEADER_REMAINING_TOKENS).and_then(|v| v.parse().ok()),
        reset_requests: text(HEADER_RESET_REQUESTS).and_then(parse_reset_duration),
        reset_tokens: text(HEADER_RESET_TOKENS).and_then(parse_reset_duration),
    }
}

// Wire types (request subset the review flow needs)

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default = "unknown_message")]
    message: String,
}

fn unknown_message() -> String {
    "unknown error".to_string()
}
