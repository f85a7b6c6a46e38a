use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GenerateRequest, Provider, ProviderAttempt, Role, TokenUsage};
use crate::config::{ProviderConfig, ProviderKind};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// OpenAI chat-completions adapter. Also serves Ollama through its
/// OpenAI-compatible `/v1` endpoint.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    provider_name: &'static str,
}

impl OpenAIProvider {
    pub fn new(cfg: &ProviderConfig, timeout: Duration) -> reqwest::Result<Self> {
        let (provider_name, base_url) = match cfg.kind {
            ProviderKind::Ollama => (
                "ollama",
                format!(
                    "{}/v1",
                    cfg.base_url
                        .as_deref()
                        .unwrap_or(OLLAMA_BASE_URL)
                        .trim_end_matches('/')
                ),
            ),
            _ => (
                "openai",
                cfg.base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            ),
        };

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url,
            provider_name,
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

fn build_body<'a>(model: &'a str, req: &'a GenerateRequest) -> ChatCompletionRequest<'a> {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(system) = req.system.as_deref() {
        messages.push(WireMessage {
            role: "system",
            content: system,
        });
    }
    messages.extend(req.messages.iter().map(|m| WireMessage {
        role: match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: &m.content,
    }));

    ChatCompletionRequest {
        model,
        messages,
        temperature: req.sampling.temperature,
        top_p: req.sampling.top_p,
        max_tokens: req.sampling.max_tokens,
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<OpenAIError>(body)
        .ok()
        .map(|e| e.error.message)
}

fn extract_text(body: &str) -> Option<String> {
    let resp: ChatCompletionResponse = serde_json::from_str(body).ok()?;
    resp.choices.into_iter().next()?.message.content
}

fn extract_usage(body: &str) -> TokenUsage {
    serde_json::from_str::<ChatCompletionResponse>(body)
        .ok()
        .and_then(|r| r.usage)
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    async fn attempt(&self, req: &GenerateRequest) -> ProviderAttempt {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&build_body(&self.model, req));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

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
        self.provider_name
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
    use crate::llm::{ChatMessage, SamplingParams};

    fn config(kind: ProviderKind, base_url: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            kind,
            model: "m".into(),
            api_key: None,
            base_url: base_url.map(str::to_string),
        }
    }

    #[test]
    fn test_system_message_leads() {
        let req = GenerateRequest {
            system: Some("sys".into()),
            messages: vec![ChatMessage::user("q")],
            sampling: SamplingParams::default(),
            stage: "test",
        };
        let value = serde_json::to_value(build_body("gpt-4.1", &req)).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["max_tokens"], 8192);
        assert_eq!(value["model"], "gpt-4.1");
    }

    #[test]
    fn test_extract_text() {
        let body = r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "done"}, "finish_reason": "stop"}]}"#;
        assert_eq!(extract_text(body).as_deref(), Some("done"));
        assert_eq!(extract_text(r#"{"choices": []}"#), None);
    }

    #[test]
    fn test_extract_usage() {
        let body = r#"{"choices": [{"message": {"content": "done"}}],
            "usage": {"prompt_tokens": 900, "completion_tokens": 120, "total_tokens": 1020}}"#;
        assert_eq!(
            extract_usage(body),
            TokenUsage {
                input_tokens: Some(900),
                output_tokens: Some(120),
            }
        );
        assert_eq!(extract_usage(r#"{"choices": []}"#), TokenUsage::default());
    }

    #[test]
    fn test_error_envelope() {
        let body = r#"{"error": {"message": "Rate limit reached for gpt-4.1", "type": "requests"}}"#;
        assert_eq!(
            error_message(body).as_deref(),
            Some("Rate limit reached for gpt-4.1")
        );
    }

    #[test]
    fn test_ollama_base_url() {
        let provider = OpenAIProvider::new(
            &config(ProviderKind::Ollama, Some("http://gpu-box:11434/")),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.server_address(), "http://gpu-box:11434/v1");
    }

    #[test]
    fn test_openai_default_base_url() {
        let provider =
            OpenAIProvider::new(&config(ProviderKind::OpenAi, None), Duration::from_secs(5))
                .unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.server_address(), OPENAI_BASE_URL);
    }
}
