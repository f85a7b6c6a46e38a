pub mod model;
pub mod orchestrator;
pub mod range;
pub mod source;

pub use model::{Attendee, EventRecord};
pub use orchestrator::{FetchOutcome, FetchStatus, PerDateError, RangeFetchOrchestrator, RangeRequest};
pub use source::{DayFetchError, EventSource, HttpEventSource};
