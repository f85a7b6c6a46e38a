use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ChatMessage, GenerateRequest, Provider, ProviderAttempt, Role, TokenUsage};
use crate::config::ProviderConfig;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
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
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageEnvelope {
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

fn build_body<'a>(req: &'a GenerateRequest) -> GeminiRequest<'a> {
    GeminiRequest {
        system_instruction: req.system.as_deref().map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart { text }],
        }),
        contents: req.messages.iter().map(to_content).collect(),
        generation_config: GenerationConfig {
            temperature: req.sampling.temperature,
            top_p: req.sampling.top_p,
            max_output_tokens: req.sampling.max_tokens,
        },
    }
}

fn to_content(message: &ChatMessage) -> GeminiContent<'_> {
    GeminiContent {
        role: Some(match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        }),
        parts: vec![GeminiPart {
            text: &message.content,
        }],
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<GeminiError>(body)
        .ok()
        .map(|e| e.error.message)
}

fn extract_text(body: &str) -> Option<String> {
    let resp: GeminiResponse = serde_json::from_str(body).ok()?;
    let content = resp.candidates.into_iter().next()?.content?;
    Some(
        content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""),
    )
}

fn extract_usage(body: &str) -> TokenUsage {
    serde_json::from_str::<GeminiUsageEnvelope>(body)
        .ok()
        .and_then(|e| e.usage_metadata)
        .map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl Provider for GeminiProvider {
    async fn attempt(&self, req: &GenerateRequest) -> ProviderAttempt {
        let request = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&build_body(req));

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
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn server_address(&self) -> &str {
        &self.base_url
    }
}
