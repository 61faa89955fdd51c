//! HTTP routing to the configured model provider.
//!
//! One [`HttpAiRouter`] is built from the `ai` config section. It speaks the chat API of
//! the selected provider, applies the configured timeout, and retries rate-limit and
//! server errors up to `ai.max_retries` times.

use std::time::Duration;

use actiongate_core::config::{AiConfig, AiProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::llm::{AiRequestContext, AiRouteResponse, AiRouter, TokenUsage};

const SYSTEM_PROMPT: &str =
    "You route requests to actions. Answer with a single JSON object and nothing else.";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1024;
const RETRY_DELAY_MS: u64 = 250;

pub struct HttpAiRouter {
    client: reqwest::Client,
    provider: AiProvider,
    model: String,
    endpoint: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpAiRouter {
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build AI HTTP client")?;
        let base_url = config
            .base_url
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(default_base_url(config.provider));

        Ok(Self {
            client,
            provider: config.provider,
            model: config.model.clone(),
            endpoint: endpoint(config.provider, base_url),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, body: &Value) -> Result<Attempt> {
        let mut request = self.client.post(&self.endpoint).json(body);
        request = match (self.provider, &self.api_key) {
            (AiProvider::Anthropic, Some(key)) => request
                .header("x-api-key", key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            (_, Some(key)) => request.bearer_auth(key.expose_secret()),
            (_, None) => request,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) if error.is_timeout() || error.is_connect() => {
                return Ok(Attempt::Retryable(error.to_string()));
            }
            Err(error) => return Err(error.into()),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(Attempt::Done(response.json().await.context("provider returned invalid JSON")?));
        }
        let detail = response.text().await.unwrap_or_default();
        let message = format!("{} returned {status}: {}", self.provider.as_str(), truncate(&detail, 200));
        if status.as_u16() == 429 || status.is_server_error() {
            Ok(Attempt::Retryable(message))
        } else {
            Err(anyhow!(message))
        }
    }
}

enum Attempt {
    Done(Value),
    Retryable(String),
}

#[async_trait]
impl AiRouter for HttpAiRouter {
    async fn route_ai_request(
        &self,
        function_id: &str,
        prompt: &str,
        context: &AiRequestContext,
    ) -> Result<AiRouteResponse> {
        let body = request_body(self.provider, &self.model, prompt);
        let mut attempt = 0u32;
        let payload = loop {
            match self.send_once(&body).await? {
                Attempt::Done(payload) => break payload,
                Attempt::Retryable(reason) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "agent.ai.retry",
                        provider = self.provider.as_str(),
                        function_id,
                        attempt,
                        reason = %reason,
                        "retrying AI provider request"
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt))).await;
                }
                Attempt::Retryable(reason) => {
                    return Err(anyhow!("{reason} (gave up after {} attempts)", attempt + 1));
                }
            }
        };

        let (response, tokens) = parse_completion(self.provider, &payload)
            .ok_or_else(|| anyhow!("{} response has no completion text", self.provider.as_str()))?;
        info!(
            event_name = "agent.ai.routed",
            provider = self.provider.as_str(),
            model = %self.model,
            function_id,
            run_id = %context.run_id,
            tokens,
            "AI provider answered"
        );
        Ok(AiRouteResponse {
            provider: self.provider.as_str().to_string(),
            model: self.model.clone(),
            response,
            usage: TokenUsage { tokens, cost_usd: Decimal::ZERO },
        })
    }
}

fn default_base_url(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::OpenAi => "https://api.openai.com",
        AiProvider::Anthropic => "https://api.anthropic.com",
        AiProvider::Ollama => "http://localhost:11434",
    }
}

fn endpoint(provider: AiProvider, base_url: &str) -> String {
    let path = match provider {
        AiProvider::OpenAi => "/v1/chat/completions",
        AiProvider::Anthropic => "/v1/messages",
        AiProvider::Ollama => "/api/chat",
    };
    format!("{}{path}", base_url.trim_end_matches('/'))
}

fn request_body(provider: AiProvider, model: &str, prompt: &str) -> Value {
    match provider {
        AiProvider::OpenAi => json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "response_format": { "type": "json_object" },
        }),
        AiProvider::Anthropic => json!({
            "model": model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": prompt }],
        }),
        AiProvider::Ollama => json!({
            "model": model,
            "stream": false,
            "format": "json",
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        }),
    }
}

/// Completion text and total token count, in the provider's response shape.
fn parse_completion(provider: AiProvider, payload: &Value) -> Option<(String, u64)> {
    let count = |pointer: &str| payload.pointer(pointer).and_then(Value::as_u64).unwrap_or(0);
    let (text, tokens) = match provider {
        AiProvider::OpenAi => {
            (payload.pointer("/choices/0/message/content"), count("/usage/total_tokens"))
        }
        AiProvider::Anthropic => (
            payload.pointer("/content/0/text"),
            count("/usage/input_tokens") + count("/usage/output_tokens"),
        ),
        AiProvider::Ollama => {
            (payload.pointer("/message/content"), count("/prompt_eval_count") + count("/eval_count"))
        }
    };
    text.and_then(Value::as_str).map(|text| (text.to_string(), tokens))
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
