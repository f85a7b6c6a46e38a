use chrono::NaiveDate;
use thiserror::Error;

/// Upper bound on the number of calendar days a single run may cover.
pub const MAX_RANGE_DAYS: usize = 90;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid range: {0}")]
    Invalid(String),

    #[error("Range too large: {days} days requested, at most {MAX_RANGE_DAYS} allowed")]
    TooLarge { days: usize },
}

/// Validated, inclusive list of days to fetch, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<NaiveDate>,
}

impl DateRange {
    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Parses YYYY-MM-DD as a calendar date.
///
/// Dates are handled as plain calendar days (midnight, no offset), so every
/// boundary lands on the same day no matter which timezone the caller is in.
pub fn parse_day(raw: &str) -> Result<NaiveDate, RangeError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        RangeError::Invalid(format!("invalid date '{raw}', expected YYYY-MM-DD"))
    })
}

/// Expands `start..=end` into individual days.
///
/// An absent or empty `end` means a single-day range. The size check happens
/// before anything is allocated per day, so an oversized request does no work.
pub fn expand(start: &str, end: Option<&str>) -> Result<DateRange, RangeError> {
    if start.trim().is_empty() {
        return Err(RangeError::Invalid("start date is required".into()));
    }
    let start_day = parse_day(start)?;
    let end_day = match end.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_day(raw)?,
        None => start_day,
    };

    if end_day < start_day {
        return Err(RangeError::Invalid(format!(
            "end date {end_day} is before start date {start_day}"
        )));
    }

    let span = (end_day - start_day).num_days() as usize + 1;
    if span > MAX_RANGE_DAYS {
        return Err(RangeError::TooLarge { days: span });
    }

    let days = start_day.iter_days().take(span).collect();

    Ok(DateRange {
        start: start_day,
        end: end_day,
        days,
    })
}
