use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::AppResult;
use crate::events::EventRecord;
use crate::llm::TokenUsage;
use crate::llm::client::AttemptSummary;
use crate::report::{self, ChatContext, FollowUpAnswer, SynthesisRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryBody {
    #[serde(default)]
    pub events: Vec<EventRecord>,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub group_filter: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    pub attempts: Vec<AttemptSummary>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub context: ChatContext,
    pub question: String,
}

pub async fn create_summary(
    State(state): State<AppState>,
    Json(body): Json<SummaryBody>,
) -> AppResult<Json<SummaryResponse>> {
    let summary = report::synthesize(
        &state.llm_client,
        state.config.sampling,
        SynthesisRequest {
            events: &body.events,
            start_date: &body.start_date,
            end_date: body.end_date.as_deref(),
            group_filter: &body.group_filter,
        },
    )
    .await?;

    tracing::info!(
        provider = %summary.provider,
        attempts = summary.attempts.len(),
        chars = summary.text.len(),
        "summary generated"
    );

    Ok(Json(SummaryResponse {
        summary: summary.text,
        provider: summary.provider,
        model: summary.model,
        usage: summary.usage,
        attempts: summary.attempts,
    }))
}

pub async fn follow_up(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> AppResult<Json<FollowUpAnswer>> {
    let answer = report::ask_follow_up(
        &state.llm_client,
        state.config.sampling,
        body.context,
        &body.question,
    )
    .await?;

    Ok(Json(answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_body_defaults() {
        let body: SummaryBody = serde_json::from_str(r#"{"startDate": "2025-01-01"}"#).unwrap();
        assert!(body.events.is_empty());
        assert_eq!(body.group_filter, "");
        assert!(body.end_date.is_none());
    }

    #[test]
    fn test_chat_body_deserialize() {
        let body: ChatBody = serde_json::from_str(
            r#"{"context": {"summary": "s", "messages": []}, "question": "why?"}"#,
        )
        .unwrap();
        assert_eq!(body.context.summary, "s");
        assert_eq!(body.question, "why?");
    }
}
