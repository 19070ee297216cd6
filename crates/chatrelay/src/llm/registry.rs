//! Provider registry for managing LLM provider instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use super::error::LLMError;
use super::gemini::GeminiProvider;
use super::openai::OpenAICompatibleProvider;
use super::provider::{LLMProvider, Provider};
use crate::config::{Credentials, ProvidersConfig};

/// Bearer token sent to Ollama, which accepts any key.
const OLLAMA_PLACEHOLDER_KEY: &str = "ollama";

/// A provider implementation together with the model it is asked for.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub client: Arc<dyn LLMProvider>,
    pub model: String,
}

/// Registry of LLM providers, keyed by provider type.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize providers from configuration and the credentials on hand.
    ///
    /// Providers that need a key are skipped when it is missing; Ollama is
    /// always registered.
    pub fn from_config(
        config: &ProvidersConfig,
        credentials: &Credentials,
    ) -> Result<Self, LLMError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        let mut registry = Self::new();

        for provider in Provider::ALL {
            let settings = config.settings(provider);
            let api_key = credentials.get(provider).map(str::to_string);

            if provider.requires_credential() && api_key.is_none() {
                warn!(
                    %provider,
                    env = settings.api_key_env.as_deref().unwrap_or("<unset>"),
                    "API key not found; {} calls will be rejected",
                    provider
                );
                continue;
            }

            let implementation: Arc<dyn LLMProvider> = match (provider, api_key) {
                (Provider::Gemini, Some(key)) => Arc::new(GeminiProvider::new(
                    client.clone(),
                    settings.base_url.clone(),
                    key,
                )),
                (Provider::Ollama, key) => Arc::new(OpenAICompatibleProvider::new(
                    client.clone(),
                    settings.base_url.clone(),
                    key.or_else(|| Some(OLLAMA_PLACEHOLDER_KEY.to_string())),
                )),
                (_, key) => Arc::new(OpenAICompatibleProvider::new(
                    client.clone(),
                    settings.base_url.clone(),
                    key,
                )),
            };

            info!(
                %provider,
                base_url = %settings.base_url,
                model = %settings.model,
                "Registered provider"
            );
            registry.register(provider, implementation, settings.model);
        }

        Ok(registry)
    }

    /// Register a provider implementation.
    pub fn register(
        &mut self,
        provider: Provider,
        implementation: Arc<dyn LLMProvider>,
        model: impl Into<String>,
    ) {
        self.providers.insert(
            provider,
            RegisteredProvider {
                client: implementation,
                model: model.into(),
            },
        );
    }

    /// Get a provider by type.
    pub fn get(&self, provider: Provider) -> Option<RegisteredProvider> {
        self.providers.get(&provider).cloned()
    }
}
