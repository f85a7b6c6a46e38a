use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::llm::SamplingParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Anthropic,
    OpenAi,
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            other => bail!("unknown provider '{other}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub event_source_url: String,
    pub event_source_token: Option<String>,
    pub event_source_timeout: Duration,
    pub providers: Vec<ProviderConfig>,
    /// Listed in `SUMMARY_PROVIDERS` but left out for lack of an API key.
    pub skipped_providers: Vec<ProviderKind>,
    pub provider_timeout: Duration,
    pub sampling: SamplingParams,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let order = parse_provider_order(&var("SUMMARY_PROVIDERS", "gemini,anthropic"))?;
        let mut providers = Vec::with_capacity(order.len());
        let mut skipped_providers = Vec::new();
        for kind in order {
            let cfg = match kind {
                ProviderKind::Gemini => ProviderConfig {
                    kind,
                    model: var("GEMINI_MODEL", "gemini-2.5-pro"),
                    api_key: secret("GEMINI_API_KEY"),
                    base_url: secret("GEMINI_BASE_URL"),
                },
                ProviderKind::Anthropic => ProviderConfig {
                    kind,
                    model: var("ANTHROPIC_MODEL", "claude-haiku-4-5-20251001"),
                    api_key: secret("ANTHROPIC_API_KEY"),
                    base_url: secret("ANTHROPIC_BASE_URL"),
                },
                ProviderKind::OpenAi => ProviderConfig {
                    kind,
                    model: var("OPENAI_MODEL", "gpt-4.1-mini"),
                    api_key: secret("OPENAI_API_KEY"),
                    base_url: secret("OPENAI_BASE_URL"),
                },
                ProviderKind::Ollama => ProviderConfig {
                    kind,
                    model: var("OLLAMA_MODEL", "llama3.1"),
                    api_key: None,
                    base_url: Some(var("OLLAMA_BASE_URL", "http://localhost:11434")),
                },
            };

            if cfg.kind != ProviderKind::Ollama && cfg.api_key.is_none() {
                skipped_providers.push(cfg.kind);
                continue;
            }
            providers.push(cfg);
        }

        Ok(Self {
            port: parse(&var("APP_PORT", "8080"), "APP_PORT")?,
            environment: var("APP_ENVIRONMENT", "development"),
            event_source_url: var(
                "EVENT_SOURCE_URL",
                "http://localhost:3000/api/events/by-date",
            ),
            event_source_token: secret("EVENT_SOURCE_TOKEN"),
            event_source_timeout: Duration::from_secs(parse(
                &var("EVENT_SOURCE_TIMEOUT_SECS", "30"),
                "EVENT_SOURCE_TIMEOUT_SECS",
            )?),
            providers,
            skipped_providers,
            provider_timeout: Duration::from_secs(parse(
                &var("PROVIDER_TIMEOUT_SECS", "120"),
                "PROVIDER_TIMEOUT_SECS",
            )?),
            sampling: SamplingParams {
                temperature: parse(&var("SUMMARY_TEMPERATURE", "0.4"), "SUMMARY_TEMPERATURE")?,
                top_p: parse(&var("SUMMARY_TOP_P", "0.9"), "SUMMARY_TOP_P")?,
                max_tokens: parse(&var("SUMMARY_MAX_TOKENS", "8192"), "SUMMARY_MAX_TOKENS")?,
            },
            otel_service_name: var("OTEL_SERVICE_NAME", "event-explorer"),
            otel_exporter_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse<T>(raw: &str, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} must be a number, got '{raw}'"))
}

/// Parses a comma-separated preference list, keeping order and dropping
/// duplicates after their first appearance.
pub fn parse_provider_order(raw: &str) -> anyhow::Result<Vec<ProviderKind>> {
    let mut order = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind: ProviderKind = name
            .parse()
            .with_context(|| format!("invalid SUMMARY_PROVIDERS entry '{name}'"))?;
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    Ok(order)
}
