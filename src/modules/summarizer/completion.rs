use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    error::{SummarizerError, SummarizerResult},
    llm::{ChatMessage, LlmClient, LlmError, LlmRequest, MessageRole},
};

use super::length::GenerationParams;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that creates clear, concise summaries.";
const TEMPERATURE: f32 = 0.7;

/// Produces a summary for already extracted text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, text: &str, params: GenerationParams) -> SummarizerResult<String>;
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn complete(&self, text: &str, params: GenerationParams) -> SummarizerResult<String> {
        let request = build_summary_request(text, params);
        let response = self.execute(request).await?;

        info!(
            provider = %response.provider,
            model = %response.model,
            prompt_tokens = response.token_usage.prompt_tokens,
            response_tokens = response.token_usage.response_tokens,
            "summary generated"
        );
        Ok(response.text)
    }
}

fn build_summary_request(text: &str, params: GenerationParams) -> LlmRequest {
    let instruction = format!(
        "Please provide a summary of the following text in {}-{} sentences:\n\n{}",
        params.target_sentences_min, params.target_sentences_max, text
    );

    LlmRequest::new(vec![
        ChatMessage::new(MessageRole::System, SYSTEM_PROMPT),
        ChatMessage::new(MessageRole::User, instruction),
    ])
    .with_max_tokens(params.max_tokens)
    .with_temperature(TEMPERATURE)
}

impl From<LlmError> for SummarizerError {
    fn from(err: LlmError) -> Self {
        warn!(error = %err, "completion call failed");
        match err {
            LlmError::MissingCredentials(_) | LlmError::Unauthorized { .. } => {
                SummarizerError::Authentication(err.to_string())
            }
            LlmError::ContextLengthExceeded(_) => SummarizerError::validation(
                "The document is too long for the summarization model. Try a shorter text.",
            ),
            LlmError::Http { .. }
            | LlmError::Transport(_)
            | LlmError::MalformedResponse(_)
            | LlmError::EmptyCompletion => SummarizerError::ServiceUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        config::AppConfig,
        modules::summarizer::length::{LengthClass, resolve},
        test_support::{closed_local_url, spawn_server},
    };

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<Value>>>);

    fn client_for(endpoint: String, api_key: Option<&str>) -> LlmClient {
        let mut settings = AppConfig::for_tests().provider;
        settings.endpoint = endpoint;
        settings.api_key = api_key.map(str::to_string);
        LlmClient::new(settings).expect("client")
    }

    async fn provider_with(status: StatusCode, body: Value) -> (String, Captured) {
        let captured = Captured::default();
        let app = Router::new()
            .route(
                "/chat/completions",
                post(
                    move |State(captured): State<Captured>, Json(payload): Json<Value>| {
                        let body = body.clone();
                        async move {
                            captured.0.lock().unwrap().push(payload);
                            (status, Json(body))
                        }
                    },
                ),
            )
            .with_state(captured.clone());
        let addr = spawn_server(app).await;
        (format!("http://{addr}"), captured)
    }

    #[test]
    fn prompt_carries_sentence_bounds_and_token_cap() {
        let request = build_summary_request("Body text.", resolve(LengthClass::Short));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].text, SYSTEM_PROMPT);
        assert!(request.messages[1].text.contains("in 1-2 sentences"));
        assert!(request.messages[1].text.ends_with("Body text."));
        assert_eq!(request.max_tokens, Some(150));
        assert_eq!(request.temperature, Some(0.7));
    }

    #[tokio::test]
    async fn returns_completion_text_verbatim() {
        let (endpoint, captured) = provider_with(
            StatusCode::OK,
            json!({ "choices": [{ "message": { "content": "  A fox jumped.\n" } }] }),
        )
        .await;
        let client = client_for(endpoint, Some("key"));

        let summary = client
            .complete("The quick brown fox.", resolve(LengthClass::Long))
            .await
            .expect("summary");
        assert_eq!(summary, "  A fox jumped.\n");

        let payloads = captured.0.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["max_tokens"], 600);
    }

    #[tokio::test]
    async fn missing_key_is_an_authentication_error() {
        let client = client_for("http://127.0.0.1:9".to_string(), None);
        let err = client
            .complete("text", resolve(LengthClass::Medium))
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Authentication(_)));
    }

    #[tokio::test]
    async fn rejected_key_is_an_authentication_error() {
        let (endpoint, _) = provider_with(
            StatusCode::UNAUTHORIZED,
            json!({ "error": { "message": "Incorrect API key provided" } }),
        )
        .await;
        let err = client_for(endpoint, Some("bad"))
            .complete("text", resolve(LengthClass::Medium))
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Authentication(_)));
    }

    #[tokio::test]
    async fn context_overflow_becomes_a_validation_error() {
        let (endpoint, _) = provider_with(
            StatusCode::BAD_REQUEST,
            json!({ "error": { "message": "too long", "code": "context_length_exceeded" } }),
        )
        .await;
        let err = client_for(endpoint, Some("key"))
            .complete("text", resolve(LengthClass::Medium))
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Validation(_)));
    }

    #[tokio::test]
    async fn upstream_outage_and_unreachable_host_are_unavailable() {
        let (endpoint, _) =
            provider_with(StatusCode::SERVICE_UNAVAILABLE, json!({ "error": {} })).await;
        let err = client_for(endpoint, Some("key"))
            .complete("text", resolve(LengthClass::Medium))
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::ServiceUnavailable(_)));

        let err = client_for(closed_local_url().await, Some("key"))
            .complete("text", resolve(LengthClass::Medium))
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::ServiceUnavailable(_)));
    }
}
