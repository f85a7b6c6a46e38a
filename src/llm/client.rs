use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;

use super::{
    AttemptOutcome, GenerateRequest, HardErrorKind, Provider, ProviderAttempt, TokenUsage, truncate,
};
use crate::telemetry::metrics::{
    GEN_AI_ERROR_COUNT, GEN_AI_FALLBACK_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_RATE_LIMITED,
    GEN_AI_TOKEN_USAGE,
};

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("no events to summarize")]
    EmptyInput,

    #[error("a follow-up needs both a summary and a question")]
    EmptyFollowUp,

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every configured provider was tried once and none produced text.
    /// Displays according to the last attempt, which is what decides whether
    /// the operator should wait or investigate.
    #[error("{}", exhausted_message(.last))]
    AllProvidersExhausted {
        last: Box<ProviderAttempt>,
        attempts: Vec<AttemptSummary>,
    },
}

fn exhausted_message(last: &ProviderAttempt) -> String {
    match &last.outcome {
        AttemptOutcome::RateLimited { .. } => {
            "AI providers are rate limited, please retry shortly".to_string()
        }
        AttemptOutcome::HardError { message, .. } => format!("upstream error: {message}"),
        AttemptOutcome::Success { .. } => "upstream error: unexpected success".to_string(),
    }
}

impl SynthesisError {
    /// HTTP status a caller-facing surface should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            SynthesisError::EmptyInput | SynthesisError::EmptyFollowUp => 400,
            SynthesisError::Configuration(_) => 500,
            SynthesisError::AllProvidersExhausted { last, .. } => match &last.outcome {
                AttemptOutcome::RateLimited { .. } => 429,
                AttemptOutcome::HardError {
                    kind: HardErrorKind::Status,
                    ..
                } => last.http_status.unwrap_or(502),
                AttemptOutcome::HardError { .. } => 502,
                AttemptOutcome::Success { .. } => 500,
            },
        }
    }
}

/// Compact, serializable record of one attempt for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptSummary {
    pub provider: String,
    pub model: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ProviderAttempt> for AttemptSummary {
    fn from(attempt: &ProviderAttempt) -> Self {
        Self {
            provider: attempt.provider.clone(),
            model: attempt.model.clone(),
            outcome: attempt.outcome.label(),
            http_status: attempt.http_status,
            error: attempt.error_message().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    pub attempts: Vec<AttemptSummary>,
}

/// Tries providers in preference order, one attempt each, and stops at the
/// first one that returns text.
pub struct FallbackClient {
    providers: Vec<Arc<dyn Provider>>,
}

impl FallbackClient {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    pub fn is_configured(&self) -> bool {
        !self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn ensure_configured(&self) -> Result<(), SynthesisError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(SynthesisError::Configuration(
                "no AI providers configured".into(),
            ))
        }
    }

    pub async fn summarize(&self, req: &GenerateRequest) -> Result<Summary, SynthesisError> {
        self.ensure_configured()?;

        let mut attempts: Vec<AttemptSummary> = Vec::with_capacity(self.providers.len());
        let mut last: Option<ProviderAttempt> = None;

        for (i, provider) in self.providers.iter().enumerate() {
            if let Some(previous) = &last {
                GEN_AI_FALLBACK_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider.name().to_string()),
                        KeyValue::new("fallback.reason", previous.outcome.label()),
                    ],
                );
                tracing::warn!(
                    failed_provider = %previous.provider,
                    next_provider = %provider.name(),
                    reason = previous.outcome.label(),
                    error = %truncate(previous.error_message().unwrap_or_default(), 500),
                    "provider attempt failed, falling back"
                );
            }

            let attempt = self.attempt_once(provider.as_ref(), req, i).await;
            attempts.push(AttemptSummary::from(&attempt));

            if let AttemptOutcome::Success { text, usage } = attempt.outcome {
                return Ok(Summary {
                    text,
                    provider: attempt.provider,
                    model: attempt.model,
                    usage,
                    attempts,
                });
            }
            last = Some(attempt);
        }

        match last {
            Some(last) => {
                tracing::error!(
                    provider = %last.provider,
                    outcome = last.outcome.label(),
                    attempts = attempts.len(),
                    "all providers exhausted"
                );
                Err(SynthesisError::AllProvidersExhausted {
                    last: Box::new(last),
                    attempts,
                })
            }
            None => Err(SynthesisError::Configuration(
                "no AI providers configured".into(),
            )),
        }
    }

    async fn attempt_once(
        &self,
        provider: &dyn Provider,
        req: &GenerateRequest,
        position: usize,
    ) -> ProviderAttempt {
        let provider_name = provider.name().to_string();
        let model = provider.model().to_string();
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %format!("gen_ai.chat {model}"),
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %model,
            server.address = %provider.server_address(),
            gen_ai.request.temperature = req.sampling.temperature,
            gen_ai.request.top_p = req.sampling.top_p,
            gen_ai.request.max_tokens = req.sampling.max_tokens as i64,
            fallback.position = position as i64,
            report.stage = req.stage,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            http.response.status_code = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        if let Some(first) = req.messages.last() {
            tracing::debug!(
                parent: &span,
                prompt = %truncate(&first.content, 1000),
                "gen_ai.user.message"
            );
        }

        let attempt = provider.attempt(req).instrument(span.clone()).await;
        let duration = start.elapsed().as_secs_f64();

        if let Some(status) = attempt.http_status {
            span.record("http.response.status_code", status as i64);
        }

        let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name.clone());
        let model_kv = KeyValue::new("gen_ai.request.model", model.clone());
        GEN_AI_OPERATION_DURATION.record(
            duration,
            &[
                KeyValue::new("gen_ai.operation.name", "chat"),
                KeyValue::new("outcome", attempt.outcome.label()),
                provider_kv.clone(),
                model_kv.clone(),
            ],
        );

        match &attempt.outcome {
            AttemptOutcome::Success { text, usage } => {
                span.record("otel.status_code", "OK");
                if let Some(input) = usage.input_tokens {
                    span.record("gen_ai.usage.input_tokens", input as i64);
                }
                if let Some(output) = usage.output_tokens {
                    span.record("gen_ai.usage.output_tokens", output as i64);
                }
                for (token_type, count) in [
                    ("input", usage.input_tokens),
                    ("output", usage.output_tokens),
                ] {
                    let Some(count) = count else { continue };
                    GEN_AI_TOKEN_USAGE.record(
                        f64::from(count),
                        &[
                            KeyValue::new("gen_ai.token.type", token_type),
                            KeyValue::new("gen_ai.operation.name", "chat"),
                            provider_kv.clone(),
                            model_kv.clone(),
                        ],
                    );
                }
                tracing::debug!(
                    parent: &span,
                    completion = %truncate(text, 2000),
                    "gen_ai.assistant.message"
                );
            }
            AttemptOutcome::RateLimited { message } => {
                span.record("otel.status_code", "ERROR");
                span.record("error.type", "rate_limit");
                GEN_AI_RATE_LIMITED.add(1, &[provider_kv, model_kv]);
                tracing::warn!(
                    parent: &span,
                    error = %truncate(message, 500),
                    "provider rate limited"
                );
            }
            AttemptOutcome::HardError { kind, message } => {
                let error_type = match kind {
                    HardErrorKind::Status => "http_error",
                    HardErrorKind::EmptyPayload => "empty_payload",
                    HardErrorKind::Transport => "network_error",
                };
                span.record("otel.status_code", "ERROR");
                span.record("error.type", error_type);
                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[provider_kv, model_kv, KeyValue::new("error.type", error_type)],
                );
                tracing::warn!(
                    parent: &span,
                    error = %truncate(message, 500),
                    "provider hard error"
                );
            }
        }

        attempt
    }
}
