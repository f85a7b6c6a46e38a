use crate::events::EventRecord;
use crate::llm::{ChatMessage, FallbackClient, GenerateRequest, SamplingParams, Summary, SynthesisError};

use super::format;

#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub events: &'a [EventRecord],
    pub start_date: &'a str,
    pub end_date: Option<&'a str>,
    pub group_filter: &'a str,
}

/// Turns an already-fetched event set into one synthesis.
///
/// Rejects empty input and an unconfigured client before any prompt is
/// built. Errors from the fallback client pass through untouched; no retry
/// happens here.
#[tracing::instrument(
    name = "report.synthesize",
    skip(client, request),
    fields(
        report.events = request.events.len(),
        report.group = %format::group_label(request.group_filter),
        report.provider,
        report.prompt_chars,
    )
)]
pub async fn synthesize(
    client: &FallbackClient,
    sampling: SamplingParams,
    request: SynthesisRequest<'_>,
) -> Result<Summary, SynthesisError> {
    if request.events.is_empty() {
        return Err(SynthesisError::EmptyInput);
    }
    client.ensure_configured()?;

    let prompt = format::build_prompt(
        request.events,
        request.start_date,
        request.end_date,
        request.group_filter,
    );

    let span = tracing::Span::current();
    span.record("report.prompt_chars", prompt.len());

    let summary = client
        .summarize(&GenerateRequest {
            system: None,
            messages: vec![ChatMessage::user(prompt)],
            sampling,
            stage: "summary",
        })
        .await?;

    span.record("report.provider", summary.provider.as_str());

    Ok(summary)
}
