use chrono::{DateTime, NaiveDate};

use crate::events::{Attendee, EventRecord};

/// Instruction scaffold placed ahead of every synthesis request.
///
/// Section order matters: the model fills a consistent structure far more
/// reliably than an open-ended request, and every heading here maps to a
/// field the event blocks below always present in the same place.
pub const PROMPT_SCAFFOLD: &str = "\
You are an experienced ministry coordinator reviewing the event reports that small-group \
leaders submitted after their meetings. Your job is to turn the raw reports below into a \
clear briefing for the pastoral team.

Structure your response using exactly these sections, in this order, as Markdown headings:

1. Overview - how many events took place, how many did not meet, and the overall picture \
of the period.
2. Attendance & Participation - head counts, attendance patterns, and anyone repeatedly \
marked absent or in another non-present status.
3. Discussion Topics & Themes - the topics covered and recurring themes across groups.
4. Prayer Requests & Care Needs - prayer requests grouped by theme, noting any that appear \
urgent or recurring.
5. Notable Quotes - short passages taken from the notes or prayer requests.
6. Suggested Follow-ups - concrete next steps for leaders or pastoral staff.

Tone:
- Warm, pastoral, and concise.
- Plain language; no jargon or filler.
- Refer to people by the names given in the reports.

Accuracy rules:
- Only use information contained in the event reports.
- Every quotation must be copied verbatim from the reports. Never paraphrase inside quotation \
marks and never invent a quotation.
- Do not fabricate names, numbers, dates, or events.
- If a section has no supporting information, write \"Nothing recorded for this period.\"";

/// Renders one event as a labelled text block for the synthesis prompt.
///
/// `index` is zero-based; the label is one-based.
pub fn format_event(record: &EventRecord, index: usize) -> String {
    let mut lines = vec![
        format!("Event {}", index + 1),
        format!("Title: {}", record.title),
        format!("Date: {}", long_date(&record.date)),
        format!(
            "Status: {}",
            if record.did_not_meet {
                "Did not meet"
            } else {
                "Met"
            }
        ),
    ];

    if let Some(count) = record.head_count {
        lines.push(format!("Head Count: {count}"));
    }

    if !record.attendees.is_empty() {
        let names: Vec<String> = record.attendees.iter().map(attendee_label).collect();
        lines.push(format!(
            "Attendees Recorded ({}): {}",
            record.attendees.len(),
            names.join(", ")
        ));
    }

    for (label, value) in [
        ("Topic", &record.topic),
        ("Notes", &record.notes),
        ("Prayer Requests", &record.prayer_requests),
    ] {
        if let Some(text) = value.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            lines.push(String::new());
            lines.push(format!("{label}:"));
            lines.push(text.to_string());
        }
    }

    lines.join("\n")
}

/// Builds the full synthesis prompt. Pure: identical input, identical output.
pub fn build_prompt(
    records: &[EventRecord],
    start_date: &str,
    end_date: Option<&str>,
    group_filter: &str,
) -> String {
    let blocks: Vec<String> = records
        .iter()
        .enumerate()
        .map(|(i, r)| format_event(r, i))
        .collect();

    format!(
        "{PROMPT_SCAFFOLD}\n\n\
        Date range: {}\n\
        Group: {}\n\
        Total event reports: {}\n\n\
        EVENT REPORTS:\n\n{}",
        range_label(start_date, end_date),
        group_label(group_filter),
        records.len(),
        blocks.join("\n\n\n")
    )
}

pub fn range_label(start_date: &str, end_date: Option<&str>) -> String {
    match end_date.map(str::trim).filter(|e| !e.is_empty()) {
        Some(end) if end != start_date.trim() => format!("{} to {}", start_date.trim(), end),
        _ => start_date.trim().to_string(),
    }
}

pub fn group_label(group_filter: &str) -> &str {
    let trimmed = group_filter.trim();
    if trimmed.is_empty() {
        "All Groups"
    } else {
        trimmed
    }
}

fn long_date(raw: &str) -> String {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .map(|d| d.format("%A, %B %-d, %Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn attendee_label(attendee: &Attendee) -> String {
    let name = attendee
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Unknown");

    match attendee
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("present"))
    {
        Some(status) => format!("{name} ({status})"),
        None => name.to_string(),
    }
}
