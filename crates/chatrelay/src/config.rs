use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::llm::Provider;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

// ============================================================================
// ProvidersConfig
// ============================================================================

/// Per-provider overrides. Anything left out uses the provider's defaults.
#[derive(Debug, Deserialize)]
pub struct ProvidersConfig {
    /// Timeout applied to every outbound provider call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub groq: ProviderConfig,
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub ollama: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            gemini: ProviderConfig::default(),
            groq: ProviderConfig::default(),
            openai: ProviderConfig::default(),
            ollama: ProviderConfig::default(),
        }
    }
}

impl ProvidersConfig {
    /// Effective settings for `provider`, with defaults filled in.
    pub fn settings(&self, provider: Provider) -> ProviderSettings {
        let overrides = match provider {
            Provider::Gemini => &self.gemini,
            Provider::Groq => &self.groq,
            Provider::OpenAI => &self.openai,
            Provider::Ollama => &self.ollama,
        };
        let defaults = ProviderSettings::defaults(provider);

        ProviderSettings {
            base_url: overrides.base_url.clone().unwrap_or(defaults.base_url),
            model: overrides.model.clone().unwrap_or(defaults.model),
            api_key_env: overrides.api_key_env.clone().or(defaults.api_key_env),
        }
    }
}

fn default_request_timeout() -> u64 {
    600
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Resolved connection settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub base_url: String,
    pub model: String,
    pub api_key_env: Option<String>,
}

impl ProviderSettings {
    pub fn defaults(provider: Provider) -> Self {
        let (base_url, model, api_key_env) = match provider {
            Provider::Gemini => (
                "https://generativelanguage.googleapis.com/v1beta",
                "gemini-2.5-flash-preview-05-20",
                Some("GOOGLE_API_KEY"),
            ),
            Provider::Groq => (
                "https://api.groq.com/openai/v1",
                "llama3-8b-8192",
                Some("GROQ_API_KEY"),
            ),
            Provider::OpenAI => (
                "https://api.openai.com/v1",
                "gpt-4o-mini",
                Some("OPENAI_API_KEY"),
            ),
            Provider::Ollama => ("http://localhost:11434/v1", "phi3", None),
        };
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key_env: api_key_env.map(str::to_string),
        }
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// API keys available to this process, keyed by provider.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<Provider, String>,
}

impl Credentials {
    /// Read each provider's key from the environment variable its settings name.
    pub fn from_env(providers: &ProvidersConfig) -> Self {
        Self::from_lookup(providers, |name| std::env::var(name).ok())
    }

    /// Like [`Credentials::from_env`] but with a caller-supplied lookup.
    pub fn from_lookup(
        providers: &ProvidersConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut credentials = Self::default();
        for provider in Provider::ALL {
            if let Some(env) = providers.settings(provider).api_key_env
                && let Some(key) = lookup(&env)
            {
                credentials = credentials.with(provider, key);
            }
        }
        credentials
    }

    /// Add a key. An empty key counts as missing.
    pub fn with(mut self, provider: Provider, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.is_empty() {
            self.keys.insert(provider, key);
        }
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&str> {
        self.keys.get(&provider).map(String::as_str)
    }
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================
