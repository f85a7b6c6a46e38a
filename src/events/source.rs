use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::model::EventRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DayFetchError {
    /// The source answered with an error, or could not be reached.
    #[error("{0}")]
    Upstream(String),

    /// The request was torn down because the run was cancelled.
    #[error("request aborted")]
    Aborted,
}

/// Fetches the event reports recorded for one calendar day.
///
/// Implementations must return `DayFetchError::Aborted` when `cancel` fires
/// while a request is in flight, and must not swallow it as an upstream error.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_day(
        &self,
        date: NaiveDate,
        group_filter: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<EventRecord>, DayFetchError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DayRequest<'a> {
    date: String,
    group_filter: &'a str,
}

#[derive(Deserialize)]
struct DayResponse {
    data: Vec<EventRecord>,
}

#[derive(Deserialize)]
struct DayErrorResponse {
    error: String,
    hint: Option<String>,
}

pub struct HttpEventSource {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpEventSource {
    pub fn new(url: &str, token: Option<&str>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
            token: token.map(str::to_string),
        })
    }

    async fn send(
        &self,
        date: NaiveDate,
        group_filter: &str,
    ) -> Result<Vec<EventRecord>, DayFetchError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                    DayFetchError::Upstream(format!("invalid event source token: {e}"))
                })?,
            );
        }

        let response = self
            .client
            .post(&self.url)
            .headers(headers)
            .json(&DayRequest {
                date: date.format("%Y-%m-%d").to_string(),
                group_filter,
            })
            .send()
            .await
            .map_err(|e| DayFetchError::Upstream(format!("event source unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DayFetchError::Upstream(format!("failed to read response: {e}")))?;

        parse_day_response(status, &body)
    }
}

#[async_trait::async_trait]
impl EventSource for HttpEventSource {
    async fn fetch_day(
        &self,
        date: NaiveDate,
        group_filter: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<EventRecord>, DayFetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DayFetchError::Aborted),
            result = self.send(date, group_filter) => result,
        }
    }
}

/// Maps a raw source response onto the day's records or an error message.
///
/// Non-2xx answers carry `{error, hint?}`; the hint is appended in parentheses
/// when present. Bodies that don't match either envelope fall back to the
/// status line so the failure is still attributable.
pub(crate) fn parse_day_response(
    status: StatusCode,
    body: &str,
) -> Result<Vec<EventRecord>, DayFetchError> {
    if !status.is_success() {
        let message = match serde_json::from_str::<DayErrorResponse>(body) {
            Ok(DayErrorResponse {
                error,
                hint: Some(hint),
            }) if !hint.is_empty() => format!("{error} ({hint})"),
            Ok(DayErrorResponse { error, .. }) => error,
            Err(_) if body.trim().is_empty() => format!("event source returned {status}"),
            Err(_) => format!("event source returned {status}: {}", body.trim()),
        };
        return Err(DayFetchError::Upstream(message));
    }

    serde_json::from_str::<DayResponse>(body)
        .map(|r| r.data)
        .map_err(|e| DayFetchError::Upstream(format!("malformed event source response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_envelope() {
        let body = r#"{"data": [{"eventId": "1", "title": "A", "date": "2025-01-01"}]}"#;
        let events = parse_day_response(StatusCode::OK, body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "A");
    }

    #[test]
    fn test_parse_empty_day() {
        let events = parse_day_response(StatusCode::OK, r#"{"data": []}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_error_with_hint() {
        let err = parse_day_response(
            StatusCode::BAD_GATEWAY,
            r#"{"error": "Upstream timeout", "hint": "try a smaller range"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            DayFetchError::Upstream("Upstream timeout (try a smaller range)".into())
        );
    }

    #[test]
    fn test_parse_error_without_hint() {
        let err = parse_day_response(StatusCode::UNAUTHORIZED, r#"{"error": "Unauthorized"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized");
    }

    #[test]
    fn test_parse_error_non_json_body() {
        let err =
            parse_day_response(StatusCode::INTERNAL_SERVER_ERROR, "boom").unwrap_err();
        assert_eq!(
            err.to_string(),
            "event source returned 500 Internal Server Error: boom"
        );
    }

    #[test]
    fn test_parse_malformed_success_body() {
        let err = parse_day_response(StatusCode::OK, "<html>").unwrap_err();
        assert!(err.to_string().starts_with("malformed event source response"));
    }

    #[tokio::test]
    async fn test_fetch_day_aborts_when_cancelled() {
        // Unroutable address: the request would hang until timeout without the token.
        let source = HttpEventSource::new(
            "http://10.255.255.1:9/events",
            None,
            Duration::from_secs(30),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = source
            .fetch_day(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                "all",
                &cancel,
            )
            .await;
        assert_eq!(result, Err(DayFetchError::Aborted));
    }
}
