//! LLM provider trait and the closed set of supported providers.

use std::fmt;

use async_trait::async_trait;

use super::error::LLMError;
use super::types::{ChatRequest, ChatResponse};

/// Trait for LLM providers with different API formats.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Make a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;

    /// Count the tokens `text` occupies for `model` using the provider's tokenizer.
    async fn count_tokens(&self, _model: &str, _text: &str) -> Result<u32, LLMError> {
        Err(LLMError::Unsupported("token counting"))
    }
}

/// Supported providers, selected per request by the client's `model_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gemini,
    Groq,
    OpenAI,
    /// Local Ollama server. Any unknown selector lands here.
    Ollama,
}

impl Provider {
    /// Selector the client sends when it does not pick a provider.
    pub const DEFAULT_SELECTOR: &'static str = "llama3";

    pub const ALL: [Provider; 4] = [
        Provider::Gemini,
        Provider::Groq,
        Provider::OpenAI,
        Provider::Ollama,
    ];

    /// Map a client selector to a provider. Matching is exact and case-sensitive.
    pub fn from_selector(selector: &str) -> Self {
        match selector {
            "gemini-flash" => Provider::Gemini,
            "groq" => Provider::Groq,
            "openai" => Provider::OpenAI,
            _ => Provider::Ollama,
        }
    }

    /// Whether the provider is only usable with an API key.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Gemini => "gemini",
            Provider::Groq => "groq",
            Provider::OpenAI => "openai",
            Provider::Ollama => "ollama",
        };
        f.write_str(name)
    }
}
