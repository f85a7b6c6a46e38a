use std::sync::Arc;

use chrono::NaiveDate;
use opentelemetry::KeyValue;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::model::EventRecord;
use super::range::{self, RangeError};
use super::source::{DayFetchError, EventSource};
use crate::telemetry::metrics::{
    EVENTS_COLLECTED, FETCH_DAY_FAILURES, FETCH_DAYS, FETCH_RUNS_CANCELLED,
};

#[derive(Debug, Clone)]
pub struct RangeRequest {
    pub start_date: String,
    pub end_date: Option<String>,
    pub group_filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerDateError {
    pub date: NaiveDate,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// No day failed.
    Complete,
    /// Some days produced events, some failed.
    Partial,
    /// Nothing was collected and at least one day failed.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub events: Vec<EventRecord>,
    pub errors: Vec<PerDateError>,
    pub cancelled: bool,
}

impl FetchOutcome {
    pub fn status(&self) -> FetchStatus {
        match (self.events.is_empty(), self.errors.is_empty()) {
            (_, true) => FetchStatus::Complete,
            (true, false) => FetchStatus::Failed,
            (false, false) => FetchStatus::Partial,
        }
    }
}

/// State of a single run. Never shared: each call to `run` builds its own.
#[derive(Debug)]
struct FetchJob {
    id: Uuid,
    dates: Vec<NaiveDate>,
    group_filter: String,
    collected_events: Vec<EventRecord>,
    per_date_errors: Vec<PerDateError>,
    cancelled: bool,
}

impl FetchJob {
    fn into_outcome(self) -> FetchOutcome {
        FetchOutcome {
            events: self.collected_events,
            errors: self.per_date_errors,
            cancelled: self.cancelled,
        }
    }
}

/// Walks a date range one day at a time against an [`EventSource`].
///
/// Only one run is active per orchestrator: starting a run cancels the token
/// of whichever run was in flight before it.
pub struct RangeFetchOrchestrator {
    source: Arc<dyn EventSource>,
    in_flight: Mutex<Option<(Uuid, CancellationToken)>>,
}

impl RangeFetchOrchestrator {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self {
            source,
            in_flight: Mutex::new(None),
        }
    }

    /// Cancels the run currently in flight, if any.
    pub async fn cancel_in_flight(&self) {
        if let Some((_, token)) = self.in_flight.lock().await.take() {
            token.cancel();
        }
    }

    /// Fetches every day in the range, ascending, strictly one at a time.
    ///
    /// `on_progress` receives the full accumulated list after each successful
    /// day. Cancellation (through `cancel`, or a newer run on this
    /// orchestrator) stops the loop and returns what was collected so far
    /// with `cancelled` set; it is not an error.
    pub async fn run<F>(
        &self,
        request: &RangeRequest,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, RangeError>
    where
        F: FnMut(&[EventRecord]) + Send,
    {
        if request.group_filter.trim().is_empty() {
            return Err(RangeError::Invalid("group filter is required".into()));
        }
        let range = range::expand(&request.start_date, request.end_date.as_deref())?;

        let run_id = Uuid::new_v4();
        let token = cancel.child_token();
        {
            let mut slot = self.in_flight.lock().await;
            if let Some((previous_id, previous)) = slot.replace((run_id, token.clone())) {
                tracing::info!(run.id = %previous_id, "cancelling superseded range fetch");
                previous.cancel();
            }
        }

        let mut job = FetchJob {
            id: run_id,
            dates: range.days,
            group_filter: request.group_filter.clone(),
            collected_events: Vec::new(),
            per_date_errors: Vec::new(),
            cancelled: false,
        };

        let span = tracing::info_span!(
            "events.range_fetch",
            run.id = %job.id,
            range.start = %range.start,
            range.end = %range.end,
            range.days = job.dates.len(),
            group.filter = %job.group_filter,
            events.count = tracing::field::Empty,
            errors.count = tracing::field::Empty,
            run.cancelled = tracing::field::Empty,
        );

        self.drive(&mut job, &mut on_progress, &token)
            .instrument(span.clone())
            .await;

        {
            let mut slot = self.in_flight.lock().await;
            if slot.as_ref().is_some_and(|(id, _)| *id == run_id) {
                slot.take();
            }
        }

        span.record("events.count", job.collected_events.len());
        span.record("errors.count", job.per_date_errors.len());
        span.record("run.cancelled", job.cancelled);

        EVENTS_COLLECTED.record(job.collected_events.len() as f64, &[]);
        if job.cancelled {
            FETCH_RUNS_CANCELLED.add(1, &[]);
        }

        Ok(job.into_outcome())
    }

    async fn drive<F>(&self, job: &mut FetchJob, on_progress: &mut F, token: &CancellationToken)
    where
        F: FnMut(&[EventRecord]) + Send,
    {
        let dates = job.dates.clone();
        let total = dates.len();

        for (i, date) in dates.into_iter().enumerate() {
            if token.is_cancelled() {
                tracing::info!(completed = i, total, "range fetch cancelled");
                job.cancelled = true;
                return;
            }

            let result = self
                .source
                .fetch_day(date, &job.group_filter, token)
                .instrument(tracing::debug_span!("events.fetch_day", %date))
                .await;

            match result {
                Ok(events) => {
                    FETCH_DAYS.add(1, &[KeyValue::new("outcome", "ok")]);
                    tracing::debug!(%date, count = events.len(), "day fetched");
                    job.collected_events.extend(events);
                    on_progress(&job.collected_events);
                }
                Err(DayFetchError::Aborted) => {
                    tracing::info!(%date, completed = i, total, "range fetch aborted in flight");
                    job.cancelled = true;
                    return;
                }
                Err(DayFetchError::Upstream(message)) => {
                    FETCH_DAYS.add(1, &[KeyValue::new("outcome", "error")]);
                    FETCH_DAY_FAILURES.add(1, &[]);
                    tracing::warn!(%date, error = %message, "day fetch failed, continuing");
                    job.per_date_errors.push(PerDateError { date, message });
                }
            }
        }
    }
}
