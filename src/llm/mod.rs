use std::fmt;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{ProviderKind, ProviderSettings};

/// Enumerates the supported LLM backends behind the shared utility.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LlmProvider {
    OpenAi,
    Azure,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Azure => write!(f, "azure"),
        }
    }
}

impl From<ProviderKind> for LlmProvider {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::OpenAi => LlmProvider::OpenAi,
            ProviderKind::Azure => LlmProvider::Azure,
        }
    }
}

/// Defines the shape of a chat-style interaction with an LLM.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Individual chat message, compatible with OpenAI compliant providers.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Supported chat roles passed to providers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
        }
    }
}

/// Captures basic token usage metrics associated with a call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
    pub total_tokens: usize,
}

/// Full response surface returned to callers.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub token_usage: TokenUsage,
    pub provider: LlmProvider,
    pub model: String,
}

/// Transport level failures, kept separate from the user-facing taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("no API key configured for the {0} provider")]
    MissingCredentials(LlmProvider),

    #[error("provider rejected credentials with status {status}")]
    Unauthorized { status: u16, body: String },

    #[error("input exceeds the model context window: {0}")]
    ContextLengthExceeded(String),

    #[error("provider call failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected provider payload: {0}")]
    MalformedResponse(String),

    #[error("provider returned an empty completion")]
    EmptyCompletion,
}

/// Main entry point for invoking providers.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    settings: ProviderSettings,
}

impl LlmClient {
    pub fn new(settings: ProviderSettings) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { http, settings })
    }

    pub fn provider(&self) -> LlmProvider {
        self.settings.kind.into()
    }

    /// Execute a single chat completion. No retry is attempted here.
    pub async fn execute(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let provider = self.provider();
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return Err(LlmError::MissingCredentials(provider));
        };

        let messages = request
            .messages
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role.as_str(),
                    "content": msg.text,
                })
            })
            .collect::<Vec<_>>();

        let mut payload = serde_json::json!({
            "model": self.settings.model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }

        let builder = match provider {
            LlmProvider::OpenAi => self
                .http
                .post(format!("{}/chat/completions", self.settings.endpoint))
                .bearer_auth(api_key),
            LlmProvider::Azure => self
                .http
                .post(format!(
                    "{}/openai/deployments/{}/chat/completions",
                    self.settings.endpoint, self.settings.model
                ))
                .query(&[("api-version", self.settings.api_version.as_str())])
                .header("api-key", api_key),
        };

        debug!(%provider, model = %self.settings.model, "sending chat completion request");
        let response = builder.json(&payload).send().await?;
        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(classify_failure(status, &response_text));
        }

        let body: serde_json::Value = serde_json::from_str(&response_text)
            .map_err(|err| LlmError::MalformedResponse(format!("{err}: {}", preview(&response_text))))?;

        let (text, usage) = extract_text_and_usage(&body)
            .ok_or_else(|| LlmError::MalformedResponse(preview(&response_text)))?;

        if text.trim().is_empty() {
            return Err(LlmError::EmptyCompletion);
        }

        let prompt_tokens = approximate_token_count(
            &request
                .messages
                .iter()
                .map(|m| m.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let mut token_usage = usage.unwrap_or_default();
        if token_usage.prompt_tokens == 0 {
            token_usage.prompt_tokens = prompt_tokens;
        }
        if token_usage.response_tokens == 0 {
            token_usage.response_tokens = approximate_token_count(&text);
        }
        token_usage.total_tokens = token_usage.prompt_tokens + token_usage.response_tokens;

        Ok(LlmResponse {
            text,
            token_usage,
            provider,
            model: self.settings.model.clone(),
        })
    }
}

fn classify_failure(status: StatusCode, body: &str) -> LlmError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return LlmError::Unauthorized {
            status: status.as_u16(),
            body: preview(body),
        };
    }

    if status == StatusCode::BAD_REQUEST || status == StatusCode::PAYLOAD_TOO_LARGE {
        if let Some(message) = context_length_message(body) {
            return LlmError::ContextLengthExceeded(message);
        }
    }

    warn!(status = status.as_u16(), "provider returned a non-success status");
    LlmError::Http {
        status: status.as_u16(),
        body: preview(body),
    }
}

/// Providers report context overflow either with a dedicated error code or only in the message.
fn context_length_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProviderErrorEnvelope>(body).ok()?;
    let error = parsed.error?;
    let message = error.message.unwrap_or_default();
    let code_matches = error.code.as_deref() == Some("context_length_exceeded");
    let message_matches = {
        let lowered = message.to_ascii_lowercase();
        lowered.contains("maximum context length") || lowered.contains("context_length_exceeded")
    };

    (code_matches || message_matches).then_some(message)
}

fn preview(text: &str) -> String {
    if text.chars().count() > 500 {
        format!("{}...", text.chars().take(500).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Extract assistant text and optional usage metrics from a Chat Completions payload.
fn extract_text_and_usage(value: &serde_json::Value) -> Option<(String, Option<TokenUsage>)> {
    let chat = serde_json::from_value::<OpenAiChatCompletionPayload>(value.clone()).ok()?;
    if chat.choices.is_empty() {
        return None;
    }

    let text = chat
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .unwrap_or_default();

    let usage = chat.usage.map(|usage| TokenUsage {
        prompt_tokens: usage.prompt_tokens.unwrap_or_default(),
        response_tokens: usage.completion_tokens.unwrap_or_default(),
        total_tokens: usage.total_tokens.unwrap_or_default(),
    });

    Some((text, usage))
}

fn approximate_token_count(input: &str) -> usize {
    input.split_whitespace().count()
}

#[derive(Debug, Deserialize)]
struct OpenAiChatCompletionPayload {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChatMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorEnvelope {
    #[serde(default)]
    error: Option<ProviderErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}
