use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::events::range::{self, RangeError};
use crate::events::{EventRecord, FetchOutcome, FetchStatus, PerDateError, RangeRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeBody {
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub group_filter: String,
}

impl From<RangeBody> for RangeRequest {
    fn from(body: RangeBody) -> Self {
        RangeRequest {
            start_date: body.start_date,
            end_date: body.end_date,
            group_filter: body.group_filter,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RangeResponse {
    pub events: Vec<EventRecord>,
    pub errors: Vec<PerDateError>,
    pub status: FetchStatus,
    pub cancelled: bool,
}

impl From<FetchOutcome> for RangeResponse {
    fn from(outcome: FetchOutcome) -> Self {
        let status = outcome.status();
        RangeResponse {
            events: outcome.events,
            errors: outcome.errors,
            status,
            cancelled: outcome.cancelled,
        }
    }
}

type ProgressStream = UnboundedReceiverStream<Result<Event, axum::Error>>;

#[derive(Serialize)]
struct ProgressPayload<'a> {
    count: usize,
    events: &'a [EventRecord],
}

pub async fn fetch_range(
    State(state): State<AppState>,
    Json(body): Json<RangeBody>,
) -> AppResult<Json<RangeResponse>> {
    let request = RangeRequest::from(body);

    // Dropping the handler (client gone) cancels the run.
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();

    let outcome = state
        .orchestrator
        .run(
            &request,
            |events| tracing::debug!(collected = events.len(), "range fetch progress"),
            &token,
        )
        .await?;

    if outcome.status() != FetchStatus::Complete {
        tracing::warn!(
            events = outcome.events.len(),
            errors = outcome.errors.len(),
            "range fetch finished with per-day errors"
        );
    }

    Ok(Json(outcome.into()))
}

pub async fn stream_range(
    State(state): State<AppState>,
    Json(body): Json<RangeBody>,
) -> AppResult<Sse<KeepAliveStream<ProgressStream>>> {
    let request = RangeRequest::from(body);

    // Reject bad input with a status code before the stream opens.
    if request.group_filter.trim().is_empty() {
        return Err(AppError::Range(RangeError::Invalid(
            "group filter is required".into(),
        )));
    }
    range::expand(&request.start_date, request.end_date.as_deref())?;

    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, axum::Error>>();
    let token = CancellationToken::new();

    {
        let tx = tx.clone();
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tx.closed() => token.cancel(),
                _ = token.cancelled() => {}
            }
        });
    }

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let progress_tx = tx.clone();
        let result = orchestrator
            .run(
                &request,
                move |events| {
                    let _ = progress_tx.send(Event::default().event("progress").json_data(
                        ProgressPayload {
                            count: events.len(),
                            events,
                        },
                    ));
                },
                &token,
            )
            .await;

        let last = match result {
            Ok(outcome) => Event::default()
                .event("done")
                .json_data(RangeResponse::from(outcome)),
            Err(e) => Event::default()
                .event("error")
                .json_data(serde_json::json!({ "error": e.to_string() })),
        };
        let _ = tx.send(last);
        // Releases the disconnect watcher's sender so the stream can end.
        token.cancel();
    });

    Ok(Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

pub async fn cancel_range(State(state): State<AppState>) -> StatusCode {
    state.orchestrator.cancel_in_flight().await;
    tracing::info!("range fetch cancel requested");
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_body_deserialize() {
        let body: RangeBody = serde_json::from_str(
            r#"{"startDate": "2025-01-01", "endDate": "2025-01-07", "groupFilter": "Youth"}"#,
        )
        .unwrap();
        assert_eq!(body.start_date, "2025-01-01");
        assert_eq!(body.end_date.as_deref(), Some("2025-01-07"));
        assert_eq!(body.group_filter, "Youth");
    }

    #[test]
    fn test_range_body_optional_end() {
        let body: RangeBody =
            serde_json::from_str(r#"{"startDate": "2025-01-01", "groupFilter": "Youth"}"#)
                .unwrap();
        assert!(body.end_date.is_none());
    }

    #[test]
    fn test_range_response_status() {
        let response = RangeResponse::from(FetchOutcome {
            events: vec![],
            errors: vec![PerDateError {
                date: chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                message: "down".into(),
            }],
            cancelled: false,
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["errors"][0]["date"], "2025-01-01");
    }
}
