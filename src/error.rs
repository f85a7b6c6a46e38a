use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::events::range::RangeError;
use crate::llm::SynthesisError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Range(_) => StatusCode::BAD_REQUEST,
            AppError::Synthesis(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn get_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_message = match &self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Range(e) => e.to_string(),
            AppError::Synthesis(e) => {
                if status.is_server_error() {
                    tracing::error!(error = %e, status = status.as_u16(), "Synthesis failed");
                } else {
                    tracing::warn!(error = %e, status = status.as_u16(), "Synthesis rejected");
                }
                e.to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                "Internal server error".to_string()
            }
        };

        let mut body = json!({
            "error": error_message,
            "status": status.as_u16(),
        });

        if let AppError::Synthesis(SynthesisError::AllProvidersExhausted { attempts, .. }) = &self
        {
            body["attempts"] = json!(attempts);
        }
        if let Some(trace_id) = get_trace_id() {
            body["trace_id"] = json!(trace_id);
        }

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AttemptOutcome, HardErrorKind, ProviderAttempt};

    fn exhausted(outcome: AttemptOutcome, http_status: Option<u16>) -> AppError {
        AppError::Synthesis(SynthesisError::AllProvidersExhausted {
            last: Box::new(ProviderAttempt {
                provider: "gemini".into(),
                model: "gemini-2.5-pro".into(),
                outcome,
                http_status,
            }),
            attempts: vec![],
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_validation_error() {
        let error = AppError::Validation("field is required".to_string());
        assert_eq!(error.to_string(), "Validation error: field is required");
    }

    #[test]
    fn test_range_error_is_transparent() {
        let error = AppError::from(RangeError::TooLarge { days: 120 });
        assert_eq!(
            error.to_string(),
            "Range too large: 120 days requested, at most 90 allowed"
        );
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (
                AppError::Validation("test".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Range(RangeError::Invalid("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Synthesis(SynthesisError::EmptyInput),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Synthesis(SynthesisError::Configuration("none".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                exhausted(
                    AttemptOutcome::RateLimited {
                        message: "quota".into(),
                    },
                    Some(429),
                ),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                exhausted(
                    AttemptOutcome::HardError {
                        kind: HardErrorKind::EmptyPayload,
                        message: "empty".into(),
                    },
                    Some(200),
                ),
                StatusCode::BAD_GATEWAY,
            ),
            (
                exhausted(
                    AttemptOutcome::HardError {
                        kind: HardErrorKind::Status,
                        message: "denied".into(),
                    },
                    Some(403),
                ),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::Internal("test".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected_status) in test_cases {
            assert_eq!(error.status_code(), expected_status, "{error}");
        }
    }

    #[tokio::test]
    async fn test_upstream_message_reaches_body() {
        let response = exhausted(
            AttemptOutcome::HardError {
                kind: HardErrorKind::Status,
                message: "gemini API error (400 Bad Request): API key not valid".into(),
            },
            Some(400),
        )
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(
            body["error"],
            "upstream error: gemini API error (400 Bad Request): API key not valid"
        );
        assert_eq!(body["status"], 400);
        assert!(body["attempts"].is_array());
    }

    #[tokio::test]
    async fn test_internal_error_is_masked() {
        let response = AppError::Internal("db exploded".into()).into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("attempts").is_none());
    }
}
