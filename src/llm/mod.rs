pub mod anthropic;
pub mod client;
pub mod gemini;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};

pub use client::{FallbackClient, Summary, SynthesisError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_p: 0.9,
            max_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub sampling: SamplingParams,
    pub stage: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HardErrorKind {
    /// Non-2xx, non-429 status from the provider.
    Status,
    /// 2xx with nothing usable in it.
    EmptyPayload,
    /// No HTTP response at all (connect, timeout, body read).
    Transport,
}

/// Token counts reported by the provider, when it reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success { text: String, usage: TokenUsage },
    RateLimited { message: String },
    HardError { kind: HardErrorKind, message: String },
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success { .. } => "success",
            AttemptOutcome::RateLimited { .. } => "rate_limited",
            AttemptOutcome::HardError { .. } => "hard_error",
        }
    }
}

/// Result of asking one provider once. Lives only for the duration of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAttempt {
    pub provider: String,
    pub model: String,
    pub outcome: AttemptOutcome,
    pub http_status: Option<u16>,
}

impl ProviderAttempt {
    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Success { .. } => None,
            AttemptOutcome::RateLimited { message } | AttemptOutcome::HardError { message, .. } => {
                Some(message)
            }
        }
    }
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Makes exactly one request. Never retries, never returns empty text as success.
    async fn attempt(&self, req: &GenerateRequest) -> ProviderAttempt;
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn server_address(&self) -> &str;
}

/// Instantiates adapters in the configured preference order.
pub fn build_providers(
    configs: &[ProviderConfig],
    timeout: Duration,
) -> reqwest::Result<Vec<Arc<dyn Provider>>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::with_capacity(configs.len());
    for cfg in configs {
        let provider: Arc<dyn Provider> = match cfg.kind {
            ProviderKind::Gemini => Arc::new(gemini::GeminiProvider::new(cfg, timeout)?),
            ProviderKind::Anthropic => Arc::new(anthropic::AnthropicProvider::new(cfg, timeout)?),
            ProviderKind::OpenAi | ProviderKind::Ollama => {
                Arc::new(openai::OpenAIProvider::new(cfg, timeout)?)
            }
        };
        providers.push(provider);
    }
    Ok(providers)
}

/// Shared HTTP-to-outcome mapping used by every adapter.
///
/// 429 is a rate limit, any other non-2xx is a hard error carrying the
/// provider's own message in full, and a 2xx without extractable text is a
/// hard error too. `error_message` pulls the message out of the provider's
/// error envelope; `extract_text` pulls the generated text out of a success
/// body. Token usage is filled in by [`execute`].
pub(crate) fn classify_response(
    provider: &str,
    status: StatusCode,
    body: &str,
    error_message: impl Fn(&str) -> Option<String>,
    extract_text: impl Fn(&str) -> Option<String>,
) -> AttemptOutcome {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let detail = error_message(body).unwrap_or_else(|| "too many requests".to_string());
        return AttemptOutcome::RateLimited {
            message: format!("{provider} rate limited ({status}): {detail}"),
        };
    }

    if !status.is_success() {
        let detail = error_message(body).unwrap_or_else(|| {
            let raw = body.trim();
            if raw.is_empty() {
                status.to_string()
            } else {
                raw.to_string()
            }
        });
        return AttemptOutcome::HardError {
            kind: HardErrorKind::Status,
            message: format!("{provider} API error ({status}): {detail}"),
        };
    }

    match extract_text(body) {
        Some(text) if !text.trim().is_empty() => AttemptOutcome::Success {
            text,
            usage: TokenUsage::default(),
        },
        _ => AttemptOutcome::HardError {
            kind: HardErrorKind::EmptyPayload,
            message: format!("{provider} returned no text in its response"),
        },
    }
}

pub(crate) fn transport_error(provider: &str, err: &reqwest::Error) -> AttemptOutcome {
    AttemptOutcome::HardError {
        kind: HardErrorKind::Transport,
        message: format!("{provider} request failed: {err}"),
    }
}

/// Sends a prepared request and classifies whatever comes back.
pub(crate) async fn execute(
    provider: &str,
    model: &str,
    request: reqwest::RequestBuilder,
    error_message: impl Fn(&str) -> Option<String>,
    extract_text: impl Fn(&str) -> Option<String>,
    extract_usage: impl Fn(&str) -> TokenUsage,
) -> ProviderAttempt {
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            return ProviderAttempt {
                provider: provider.to_string(),
                model: model.to_string(),
                outcome: transport_error(provider, &err),
                http_status: err.status().map(|s| s.as_u16()),
            };
        }
    };

    let status = response.status();
    let outcome = match response.text().await {
        Ok(body) => {
            let outcome = classify_response(provider, status, &body, error_message, extract_text);
            match outcome {
                AttemptOutcome::Success { text, .. } => AttemptOutcome::Success {
                    text,
                    usage: extract_usage(&body),
                },
                other => other,
            }
        }
        Err(err) => transport_error(provider, &err),
    };

    ProviderAttempt {
        provider: provider.to_string(),
        model: model.to_string(),
        outcome,
        http_status: Some(status.as_u16()),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}
