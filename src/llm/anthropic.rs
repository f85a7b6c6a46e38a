use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{
    AttemptOutcome, ChatMessage, GenerateRequest, HardErrorKind, Provider, ProviderAttempt, Role,
    TokenUsage,
};
use crate::config::ProviderConfig;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(cfg: &ProviderConfig, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key: cfg.api_key.clone().unwrap_or_default(),
            model: cfg.model.clone(),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    /// Sent alone: current Claude models reject `temperature` and `top_p` together.
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicUsageEnvelope {
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn to_wire(messages: &[ChatMessage]) -> Vec<AnthropicMessage<'_>> {
    messages
        .iter()
        .map(|m| AnthropicMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        })
        .collect()
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<AnthropicError>(body)
        .ok()
        .map(|e| e.error.message)
}

fn extract_text(body: &str) -> Option<String> {
    let resp: AnthropicResponse = serde_json::from_str(body).ok()?;
    let text = resp
        .content
        .iter()
        .filter(|c| c.content_type == "text")
        .filter_map(|c| c.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    Some(text)
}

fn extract_usage(body: &str) -> TokenUsage {
    serde_json::from_str::<AnthropicUsageEnvelope>(body)
        .ok()
        .and_then(|e| e.usage)
        .map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        })
        .unwrap_or_default()
}

fn build_body<'a>(model: &'a str, req: &'a GenerateRequest) -> AnthropicRequest<'a> {
    AnthropicRequest {
        model,
        max_tokens: req.sampling.max_tokens,
        temperature: req.sampling.temperature,
        system: req.system.as_deref(),
        messages: to_wire(&req.messages),
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    async fn attempt(&self, req: &GenerateRequest) -> ProviderAttempt {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&self.api_key) {
            Ok(value) => {
                headers.insert("x-api-key", value);
            }
            Err(e) => {
                return ProviderAttempt {
                    provider: self.name().to_string(),
                    model: self.model.clone(),
                    outcome: AttemptOutcome::HardError {
                        kind: HardErrorKind::Transport,
                        message: format!("invalid API key header: {e}"),
                    },
                    http_status: None,
                };
            }
        }
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .headers(headers)
            .json(&build_body(&self.model, req));

        super::execute(
            self.name(),
            &self.model,
            request,
            error_message,
            extract_text,
            extract_usage,
        )
        .await
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn server_address(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{SamplingParams, classify_response};
    use reqwest::StatusCode;

    fn request(system: Option<&str>, messages: Vec<ChatMessage>) -> GenerateRequest {
        GenerateRequest {
            system: system.map(str::to_string),
            messages,
            sampling: SamplingParams::default(),
            stage: "summary",
        }
    }

    #[test]
    fn test_request_shape() {
        let req = request(
            Some("be brief"),
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("reply"),
                ChatMessage::user("second"),
            ],
        );
        let value = serde_json::to_value(build_body("claude-haiku-4-5-20251001", &req)).unwrap();
        assert_eq!(value["model"], "claude-haiku-4-5-20251001");
        assert_eq!(value["system"], "be brief");
        assert_eq!(value["max_tokens"], 8192);
        assert_eq!(value["messages"][1]["role"], "assistant");
        assert_eq!(value["messages"][2]["content"], "second");
    }

    #[test]
    fn test_sends_temperature_without_top_p() {
        let req = request(None, vec![ChatMessage::user("hi")]);
        let value = serde_json::to_value(build_body("claude-haiku-4-5-20251001", &req)).unwrap();
        assert!(value.get("temperature").is_some());
        assert!(value.get("top_p").is_none());
    }

    #[test]
    fn test_system_omitted_when_absent() {
        let req = request(None, vec![]);
        let value = serde_json::to_value(build_body("m", &req)).unwrap();
        assert!(value.get("system").is_none());
    }

    #[test]
    fn test_extract_usage() {
        let body = r#"{"content": [{"type": "text", "text": "hi"}],
            "usage": {"input_tokens": 1200, "output_tokens": 340}}"#;
        assert_eq!(
            extract_usage(body),
            TokenUsage {
                input_tokens: Some(1200),
                output_tokens: Some(340),
            }
        );
        assert_eq!(
            extract_usage(r#"{"content": []}"#),
            TokenUsage::default()
        );
    }

    #[test]
    fn test_extract_joins_text_blocks() {
        let body = r#"{"content": [
            {"type": "text", "text": "Hello, "},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": "world"}
        ], "model": "m"}"#;
        assert_eq!(extract_text(body).as_deref(), Some("Hello, world"));
    }

    #[test]
    fn test_overloaded_error_uses_envelope_message() {
        let body = r#"{"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}"#;
        let outcome = classify_response(
            "anthropic",
            StatusCode::from_u16(529).unwrap(),
            body,
            error_message,
            extract_text,
        );
        assert!(matches!(
            outcome,
            AttemptOutcome::HardError { kind: HardErrorKind::Status, ref message } if message.ends_with("Overloaded")
        ));
    }

    #[test]
    fn test_rate_limit_error() {
        let body = r#"{"type": "error", "error": {"type": "rate_limit_error", "message": "Number of request tokens has exceeded your per-minute rate limit"}}"#;
        let outcome = classify_response(
            "anthropic",
            StatusCode::TOO_MANY_REQUESTS,
            body,
            error_message,
            extract_text,
        );
        assert_eq!(outcome.label(), "rate_limited");
    }

    #[test]
    fn test_empty_content_is_empty_payload() {
        let outcome = classify_response(
            "anthropic",
            StatusCode::OK,
            r#"{"content": []}"#,
            error_message,
            extract_text,
        );
        assert!(matches!(
            outcome,
            AttemptOutcome::HardError {
                kind: HardErrorKind::EmptyPayload,
                ..
            }
        ));
    }
}
