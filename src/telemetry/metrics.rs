use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("event-explorer"));

// --- Provider metrics ---

pub static GEN_AI_TOKEN_USAGE: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("gen_ai.client.token.usage")
        .with_description("Number of tokens used per provider call")
        .with_unit("{token}")
        .build()
});

pub static GEN_AI_OPERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("gen_ai.client.operation.duration")
        .with_description("Duration of a single provider attempt in seconds")
        .with_unit("s")
        .build()
});

pub static GEN_AI_ERROR_COUNT: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("gen_ai.client.error.count")
        .with_description("Number of provider attempts that ended in a hard error")
        .with_unit("{error}")
        .build()
});

pub static GEN_AI_RATE_LIMITED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("gen_ai.client.rate_limited.count")
        .with_description("Number of provider attempts rejected as rate limited")
        .with_unit("{attempt}")
        .build()
});

pub static GEN_AI_FALLBACK_COUNT: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("gen_ai.client.fallback.count")
        .with_description("Number of times a later provider was tried after an earlier one failed")
        .with_unit("{fallback}")
        .build()
});

// --- Range fetch metrics ---

pub static FETCH_DAYS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("events.fetch.days")
        .with_description("Per-day fetches completed, by outcome")
        .with_unit("{day}")
        .build()
});

pub static FETCH_DAY_FAILURES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("events.fetch.day_failures")
        .with_description("Per-day fetches that failed and were recorded as errors")
        .with_unit("{day}")
        .build()
});

pub static FETCH_RUNS_CANCELLED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("events.fetch.cancelled")
        .with_description("Range fetch runs stopped by cancellation")
        .with_unit("{run}")
        .build()
});

pub static EVENTS_COLLECTED: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("events.fetch.collected")
        .with_description("Number of event records collected per range fetch run")
        .with_unit("{event}")
        .build()
});

// --- HTTP Metrics ---

pub static HTTP_REQUESTS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("http.requests.total")
        .with_description("Total number of HTTP requests")
        .with_unit("{request}")
        .build()
});

pub static HTTP_REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("http.request.duration")
        .with_description("HTTP request duration in milliseconds")
        .with_unit("ms")
        .with_boundaries(vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
        ])
        .build()
});
