use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, FallbackClient, GenerateRequest, SamplingParams, SynthesisError};

const FOLLOW_UP_INSTRUCTIONS: &str = "\
You are answering follow-up questions from the pastoral team about an event report summary \
you wrote earlier. Answer only from the summary below and the conversation so far. If the \
summary does not contain the answer, say so plainly instead of guessing. Quote verbatim when \
quoting.";

/// Prior synthesis plus the question/answer history that followed it.
///
/// The caller owns and stores this; the service only reads it and hands back
/// an extended copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    pub summary: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatContext {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            messages: Vec::new(),
        }
    }

    fn system_prompt(&self) -> String {
        format!("{FOLLOW_UP_INSTRUCTIONS}\n\nSUMMARY:\n{}", self.summary)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowUpAnswer {
    pub answer: String,
    pub provider: String,
    pub context: ChatContext,
}

#[tracing::instrument(
    name = "report.follow_up",
    skip(client, context, question),
    fields(chat.history = context.messages.len(), chat.provider)
)]
pub async fn ask_follow_up(
    client: &FallbackClient,
    sampling: SamplingParams,
    context: ChatContext,
    question: &str,
) -> Result<FollowUpAnswer, SynthesisError> {
    if context.summary.trim().is_empty() || question.trim().is_empty() {
        return Err(SynthesisError::EmptyFollowUp);
    }
    client.ensure_configured()?;

    let mut messages = context.messages.clone();
    messages.push(ChatMessage::user(question.trim()));

    let summary = client
        .summarize(&GenerateRequest {
            system: Some(context.system_prompt()),
            messages: messages.clone(),
            sampling,
            stage: "follow_up",
        })
        .await?;

    tracing::Span::current().record("chat.provider", summary.provider.as_str());

    messages.push(ChatMessage::assistant(summary.text.clone()));

    Ok(FollowUpAnswer {
        answer: summary.text,
        provider: summary.provider,
        context: ChatContext {
            summary: context.summary,
            messages,
        },
    })
}
