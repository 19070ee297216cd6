//! Request dispatch.
//!
//! Routes one chat request to the provider its `model_type` selects and
//! normalizes whatever comes back (reply text + token usage) into an
//! [`AskResponse`]. Failures never escape: they become the reply text.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::llm::{ChatRequest, LLMError, Provider, ProviderRegistry, RegisteredProvider, Usage};

/// Reply sent when Gemini answers without any candidate.
pub const NO_GEMINI_RESPONSE: &str = "No response from Gemini model.";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /ask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
    #[serde(default = "default_model_type", deserialize_with = "null_as_default_model_type")]
    pub model_type: String,
}

impl AskRequest {
    pub fn new(message: impl Into<String>, model_type: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model_type: model_type.into(),
        }
    }
}

/// Response of `POST /ask`, for successes and handled failures alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub response: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl AskResponse {
    fn from_reply(reply: Reply) -> Self {
        Self {
            response: reply.text,
            prompt_tokens: reply.usage.prompt_tokens,
            completion_tokens: reply.usage.completion_tokens,
            total_tokens: reply.usage.total_tokens,
        }
    }

    fn error(message: String) -> Self {
        Self::from_reply(Reply {
            text: message,
            usage: Usage::default(),
        })
    }
}

fn default_model_type() -> String {
    Provider::DEFAULT_SELECTOR.to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_model_type<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_model_type))
}

// ============================================================================
// Branch results
// ============================================================================

/// What a successful branch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub usage: Usage,
}

/// Why a branch produced no reply.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The selected provider has no credential (or was never registered).
    #[error("{}", not_configured_message(.0))]
    NotConfigured(Provider),

    /// The provider call itself failed.
    #[error(transparent)]
    Llm(#[from] LLMError),
}

fn not_configured_message(provider: &Provider) -> &'static str {
    match provider {
        Provider::Gemini => "Error: Google API Key not configured for Gemini-Flash.",
        Provider::Groq => "Error: Groq API Key not configured.",
        Provider::OpenAI => "Error: OpenAI API Key not configured.",
        Provider::Ollama => "Error: local model server not configured.",
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes [`AskRequest`]s to the providers held in its registry.
#[derive(Clone)]
pub struct Dispatcher {
    providers: ProviderRegistry,
}

impl Dispatcher {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self { providers }
    }

    /// Answer one request. Never fails; errors are reported in `response`.
    pub async fn dispatch(&self, request: &AskRequest) -> AskResponse {
        let provider = Provider::from_selector(&request.model_type);
        debug!(model_type = %request.model_type, %provider, "dispatching chat request");

        match self.route(provider, &request.message).await {
            Ok(reply) => AskResponse::from_reply(reply),
            Err(e @ DispatchError::NotConfigured(_)) => {
                warn!(model_type = %request.model_type, "{}", e);
                AskResponse::error(e.to_string())
            }
            Err(e @ DispatchError::Llm(_)) => {
                error!(model_type = %request.model_type, error = %e, "provider request failed");
                AskResponse::error(format!(
                    "Error processing request for {}: {}",
                    request.model_type, e
                ))
            }
        }
    }

    async fn route(&self, provider: Provider, message: &str) -> Result<Reply, DispatchError> {
        let Some(registered) = self.providers.get(provider) else {
            return Err(DispatchError::NotConfigured(provider));
        };

        match provider {
            Provider::Gemini => counted_reply(&registered, message).await,
            Provider::Groq | Provider::OpenAI | Provider::Ollama => {
                completion_reply(&registered, message).await
            }
        }
    }
}

/// Generate, then count prompt and reply tokens with the provider's tokenizer.
async fn counted_reply(
    registered: &RegisteredProvider,
    message: &str,
) -> Result<Reply, DispatchError> {
    let response = registered
        .client
        .chat(ChatRequest::single_turn(&registered.model, message))
        .await?;

    let Some(choice) = response.choices.into_iter().next() else {
        return Ok(Reply {
            text: NO_GEMINI_RESPONSE.to_string(),
            usage: Usage::default(),
        });
    };
    let text = choice.message.content;

    let prompt_tokens = registered
        .client
        .count_tokens(&registered.model, message)
        .await?;
    let completion_tokens = registered
        .client
        .count_tokens(&registered.model, &text)
        .await?;

    Ok(Reply {
        text,
        usage: Usage::from_counts(prompt_tokens, completion_tokens),
    })
}

/// Single-turn chat completion; usage is taken from the response when present.
async fn completion_reply(
    registered: &RegisteredProvider,
    message: &str,
) -> Result<Reply, DispatchError> {
    let response = registered
        .client
        .chat(ChatRequest::single_turn(&registered.model, message))
        .await?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LLMError::MalformedResponse("response has no choices".to_string()))?;

    let usage = response
        .usage
        .map(|u| Usage::from_counts(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(Reply {
        text: choice.message.content,
        usage,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::{ChatResponse, Choice, LLMProvider, Message, Role};

    /// In-memory provider recording what it was asked.
    struct StubProvider {
        reply: Option<String>,
        usage: Option<Usage>,
        fail_with: Option<u16>,
        seen: Mutex<Vec<String>>,
    }

    impl StubProvider {
        fn replying(text: &str, usage: Option<Usage>) -> Self {
            Self {
                reply: Some(text.to_string()),
                usage,
                fail_with: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn empty() -> Self {
            Self {
                reply: None,
                usage: None,
                fail_with: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                fail_with: Some(status),
                ..Self::empty()
            }
        }
    }

    #[async_trait]
    impl LLMProvider for StubProvider {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", request.model, request.messages[0].content));
            if let Some(status) = self.fail_with {
                return Err(LLMError::Api {
                    status,
                    message: "boom".to_string(),
                });
            }
            let choices = self
                .reply
                .iter()
                .map(|text| Choice {
                    index: 0,
                    message: Message {
                        role: Role::Assistant,
                        content: text.clone(),
                    },
                    finish_reason: Some("stop".to_string()),
                })
                .collect();
            Ok(ChatResponse {
                id: "stub".to_string(),
                choices,
                usage: self.usage,
            })
        }

        /// One token per whitespace-separated word.
        async fn count_tokens(&self, _model: &str, text: &str) -> Result<u32, LLMError> {
            Ok(text.split_whitespace().count() as u32)
        }
    }

    fn dispatcher_with(provider: Provider, stub: Arc<StubProvider>) -> Dispatcher {
        let mut registry = ProviderRegistry::new();
        registry.register(provider, stub, "stub-model");
        Dispatcher::new(registry)
    }

    #[test]
    fn missing_model_type_defaults_to_llama3() {
        let request: AskRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(request, AskRequest::new("hi", "llama3"));

        let request: AskRequest =
            serde_json::from_str(r#"{"message": "hi", "model_type": null}"#).unwrap();
        assert_eq!(request.model_type, "llama3");
    }

    #[test]
    fn missing_message_defaults_to_empty() {
        let request: AskRequest = serde_json::from_str(r#"{"model_type": "groq"}"#).unwrap();
        assert_eq!(request, AskRequest::new("", "groq"));
    }

    #[tokio::test]
    async fn groq_reports_usage_from_provider() {
        let stub = Arc::new(StubProvider::replying(
            "hello",
            Some(Usage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            }),
        ));
        let dispatcher = dispatcher_with(Provider::Groq, stub.clone());

        let response = dispatcher.dispatch(&AskRequest::new("hi", "groq")).await;
        assert_eq!(
            response,
            AskResponse {
                response: "hello".to_string(),
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            }
        );
        assert_eq!(*stub.seen.lock().unwrap(), vec!["stub-model:hi"]);
    }

    #[tokio::test]
    async fn total_is_sum_even_when_provider_total_disagrees() {
        let stub = Arc::new(StubProvider::replying(
            "x",
            Some(Usage {
                prompt_tokens: 4,
                completion_tokens: 6,
                total_tokens: 99,
            }),
        ));
        let dispatcher = dispatcher_with(Provider::OpenAI, stub);

        let response = dispatcher.dispatch(&AskRequest::new("hi", "openai")).await;
        assert_eq!(response.total_tokens, 10);
    }

    #[tokio::test]
    async fn local_reply_without_usage_has_zero_counts() {
        let stub = Arc::new(StubProvider::replying("ok", None));
        let dispatcher = dispatcher_with(Provider::Ollama, stub);

        let response = dispatcher.dispatch(&AskRequest::new("hi", "llama3")).await;
        assert_eq!(response.response, "ok");
        assert_eq!(response.prompt_tokens, 0);
        assert_eq!(response.completion_tokens, 0);
        assert_eq!(response.total_tokens, 0);
    }

    #[tokio::test]
    async fn unknown_selector_goes_to_local_provider() {
        let stub = Arc::new(StubProvider::replying("local", None));
        let dispatcher = dispatcher_with(Provider::Ollama, stub.clone());

        let response = dispatcher
            .dispatch(&AskRequest::new("hi", "mistral-large"))
            .await;
        assert_eq!(response.response, "local");
        assert_eq!(stub.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gemini_counts_prompt_and_reply_separately() {
        let stub = Arc::new(StubProvider::replying(
            "three word reply",
            Some(Usage::from_counts(100, 100)),
        ));
        let dispatcher = dispatcher_with(Provider::Gemini, stub);

        let response = dispatcher
            .dispatch(&AskRequest::new("count these two", "gemini-flash"))
            .await;
        assert_eq!(response.response, "three word reply");
        assert_eq!(response.prompt_tokens, 3);
        assert_eq!(response.completion_tokens, 3);
        assert_eq!(response.total_tokens, 6);
    }

    #[tokio::test]
    async fn gemini_without_candidates() {
        let dispatcher = dispatcher_with(Provider::Gemini, Arc::new(StubProvider::empty()));

        let response = dispatcher
            .dispatch(&AskRequest::new("hi", "gemini-flash"))
            .await;
        assert_eq!(response.response, NO_GEMINI_RESPONSE);
        assert_eq!(response.total_tokens, 0);
    }

    #[tokio::test]
    async fn missing_credentials_give_fixed_messages() {
        let dispatcher = Dispatcher::new(ProviderRegistry::new());

        let cases = [
            (
                "gemini-flash",
                "Error: Google API Key not configured for Gemini-Flash.",
            ),
            ("groq", "Error: Groq API Key not configured."),
            ("openai", "Error: OpenAI API Key not configured."),
        ];
        for (model_type, expected) in cases {
            let response = dispatcher.dispatch(&AskRequest::new("hi", model_type)).await;
            assert_eq!(response.response, expected);
            assert_eq!(response.prompt_tokens, 0);
            assert_eq!(response.completion_tokens, 0);
            assert_eq!(response.total_tokens, 0);
        }
    }

    #[tokio::test]
    async fn provider_error_is_reported_with_raw_selector() {
        let dispatcher = dispatcher_with(Provider::Ollama, Arc::new(StubProvider::failing(503)));

        let response = dispatcher.dispatch(&AskRequest::new("hi", "llama-9000")).await;
        assert_eq!(
            response.response,
            "Error processing request for llama-9000: api error (status 503): boom"
        );
        assert_eq!(response.total_tokens, 0);
    }

    #[tokio::test]
    async fn empty_choices_is_an_error_for_completion_branches() {
        let dispatcher = dispatcher_with(Provider::Groq, Arc::new(StubProvider::empty()));

        let response = dispatcher.dispatch(&AskRequest::new("hi", "groq")).await;
        assert_eq!(
            response.response,
            "Error processing request for groq: malformed response: response has no choices"
        );
    }

    #[tokio::test]
    async fn same_request_twice_yields_same_response() {
        let stub = Arc::new(StubProvider::replying("same", Some(Usage::from_counts(1, 1))));
        let dispatcher = dispatcher_with(Provider::Groq, stub);
        let request = AskRequest::new("hi", "groq");

        let first = dispatcher.dispatch(&request).await;
        let second = dispatcher.dispatch(&request).await;
        assert_eq!(first, second);
    }

    #[test]
    fn response_serializes_to_wire_shape() {
        let response = AskResponse {
            response: "hello".to_string(),
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "response": "hello",
                "prompt_tokens": 3,
                "completion_tokens": 2,
                "total_tokens": 5
            })
        );
    }
}
