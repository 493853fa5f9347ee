use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A calendar month in `YYYY-MM` form. Orders lexicographically, which for
/// this format is also chronological.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Month(String);

impl Month {
    pub fn from_date(date: NaiveDate) -> Self {
        Month(date.format("%Y-%m").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Inclusive on both ends; an open start accepts anything up to `end`.
    pub fn contains(self, date: NaiveDate) -> bool {
        if date > self.end {
            return false;
        }
        match self.start {
            Some(start) => date >= start,
            None => true,
        }
    }
}

/// Parse a date string as it appears in source data: ISO dates, ISO
/// datetimes, and a handful of common slash/dash variants.
pub fn parse_date_loose(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }

    // Datetime forms: keep the date prefix. `get` rather than slicing so a
    // multibyte tenth character cannot panic.
    if s.len() > 10 {
        if let Some(prefix) = s.get(..10) {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }

    for fmt in &["%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    None
}

/// Parse `first`, falling back to `second` when `first` is missing or
/// unparseable.
pub fn date_with_fallback(first: Option<&str>, second: Option<&str>) -> Option<NaiveDate> {
    first
        .and_then(parse_date_loose)
        .or_else(|| second.and_then(parse_date_loose))
}
