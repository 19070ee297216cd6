//! chatrelay - relay chat messages to hosted or local LLM providers.

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod llm;
pub mod server;
