//! LLM provider clients for chat completions.

mod error;
mod gemini;
mod openai;
mod provider;
mod registry;
mod types;

pub use error::LLMError;
pub use gemini::GeminiProvider;
pub use openai::OpenAICompatibleProvider;
pub use provider::{LLMProvider, Provider};
pub use registry::{ProviderRegistry, RegisteredProvider};
pub use types::{ChatRequest, ChatResponse, Choice, Message, Role, Usage};
