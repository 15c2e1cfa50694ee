use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, error};

use crate::errors::LlmError;

/// Configuration for the model provider
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("LLM_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
            provider: std::env::var("LLM_PROVIDER").unwrap_or(defaults.provider),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: std::env::var("LLM_MODEL").unwrap_or(defaults.model),
            max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tokens),
            temperature: std::env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temperature),
        }
    }
}

/// Single-turn model invocation returning the raw response text
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Vendor tag recorded in analysis provenance
    fn vendor(&self) -> String;

    /// Completes `prompt` under a system instruction that demands strict JSON
    async fn complete_json(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

/// OpenAI API request/response structures
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: usize,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize, Clone)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI provider implementation
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, max_tokens: usize, temperature: f32) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            model,
            max_tokens,
            temperature,
            client,
        })
    }

    async fn call_openai_with_retry(&self, request: OpenAiRequest) -> Result<OpenAiResponse, LlmError> {
        let mut retry_count = 0;
        let max_retries = 3;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.call_openai(&request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= max_retries {
                        error!("OpenAI API call failed after {} retries: {}", max_retries, e);
                        return Err(e);
                    }

                    warn!("OpenAI API call failed (attempt {}/{}): {}. Retrying in {:?}...",
                          retry_count, max_retries, e, delay);
                    tokio::time::sleep(delay).await;
                    delay *= 2; // 1s, 2s, 4s
                }
            }
        }
    }

    async fn call_openai(&self, request: &OpenAiRequest) -> Result<OpenAiResponse, LlmError> {
        let response = self.client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 429 {
            return Err(LlmError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError(format!("HTTP {}: {}", status, error_text)));
        }

        response.json::<OpenAiResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn vendor(&self) -> String {
        format!("openai/{}", self.model)
    }

    async fn complete_json(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        info!("Requesting structured completion (model: {}, max_tokens: {}, prompt: {} chars)",
              self.model, self.max_tokens, prompt.len());

        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self.call_openai_with_retry(request).await?;

        if let Some(usage) = &response.usage {
            info!("LLM completion generated. Tokens: {} prompt + {} completion = {} total",
                  usage.prompt_tokens, usage.completion_tokens, usage.total_tokens);
        }

        response.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No content in response".to_string()))
    }
}

/// Stand-in used when no provider is configured; every call fails with `Disabled`
pub struct DisabledProvider;

#[async_trait]
impl LlmProvider for DisabledProvider {
    fn vendor(&self) -> String {
        "disabled".to_string()
    }

    async fn complete_json(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

/// Picks the provider named in config, falling back to `DisabledProvider`
pub fn build_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    if !config.enabled {
        info!("LLM features are disabled in configuration");
        return Arc::new(DisabledProvider);
    }

    let api_key = match config.api_key.as_deref() {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => {
            warn!("LLM API key not configured. LLM features disabled.");
            return Arc::new(DisabledProvider);
        }
    };

    match config.provider.as_str() {
        "openai" => match OpenAiProvider::new(api_key, config.model.clone(), config.max_tokens, config.temperature) {
            Ok(provider) => {
                info!("Initializing LLM service with provider: {} ({})", config.provider, config.model);
                Arc::new(provider)
            }
            Err(e) => {
                error!("Failed to initialize OpenAI provider: {}. LLM features disabled.", e);
                Arc::new(DisabledProvider)
            }
        },
        other => {
            warn!("Unknown LLM provider: {}. LLM features disabled.", other);
            Arc::new(DisabledProvider)
        }
    }
}
