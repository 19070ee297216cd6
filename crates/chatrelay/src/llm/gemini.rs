//! Google Gemini provider with native API format.
//!
//! Chat goes through `generateContent`; token counting through `countTokens`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{LLMError, check_status};
use super::provider::LLMProvider;
use super::types::{ChatRequest, ChatResponse, Choice, Message, Role};

/// Gemini provider speaking the `generativelanguage` REST API.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(client: Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn post<B: Serialize>(
        &self,
        model: &str,
        method: &str,
        body: &B,
    ) -> Result<reqwest::Response, LLMError> {
        let url = format!("{}/models/{}:{}", self.base_url, model, method);
        debug!(%url, "sending gemini request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        check_status(response).await
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let gemini_request = GenerateContentRequest {
            contents: request.messages.iter().map(Content::from_message).collect(),
        };
        let response = self
            .post(&request.model, "generateContent", &gemini_request)
            .await?;

        let gemini_response: GenerateContentResponse = response.json().await?;
        from_gemini_response(gemini_response)
    }

    async fn count_tokens(&self, model: &str, text: &str) -> Result<u32, LLMError> {
        let body = CountTokensRequest {
            contents: vec![Content::user(text)],
        };
        let response = self.post(model, "countTokens", &body).await?;
        let counted: CountTokensResponse = response.json().await?;
        Ok(counted.total_tokens)
    }
}

// --- Gemini format types and conversions ---

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    /// Gemini calls the assistant side `model`.
    fn from_message(message: &Message) -> Self {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(message.content.clone()),
            }],
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Serialize)]
struct CountTokensRequest {
    contents: Vec<Content>,
}

#[derive(Deserialize)]
struct CountTokensResponse {
    #[serde(rename = "totalTokens", default)]
    total_tokens: u32,
}

/// Only the first candidate is read; its first text part becomes the reply.
fn from_gemini_response(response: GenerateContentResponse) -> Result<ChatResponse, LLMError> {
    let choices = match response.candidates.into_iter().next() {
        None => Vec::new(),
        Some(candidate) => {
            let text = candidate
                .content
                .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
                .ok_or_else(|| {
                    LLMError::MalformedResponse("first candidate has no text part".to_string())
                })?;
            vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: text,
                },
                finish_reason: candidate.finish_reason,
            }]
        }
    };

    Ok(ChatResponse {
        id: String::new(),
        choices,
        usage: None,
    })
}
