//! Date ranges and the range splitter
//!
//! A requested export window is an inclusive [`DateRange`]. The splitter cuts
//! it into [`Batch`]es that are contiguous, non-overlapping and ordered
//! chronologically, so that each batch can be queried on its own:
//!
//! - [`split_by_days`]: fixed-size windows, the last one truncated at `end`
//! - [`split_by_month`]: calendar-month windows, clipped to the range

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};

/// Date format accepted on the command line and used in batch labels
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive calendar date interval with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = ExportError;

    fn try_from(raw: RawDateRange) -> Result<Self> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    /// Create a validated date range
    ///
    /// # Arguments
    /// * `start` - First day of the range
    /// * `end` - Last day of the range (inclusive)
    ///
    /// # Returns
    /// * `Result<Self>` - Range, or `InvalidRange` when `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ExportError::InvalidRange(format!(
                "start {} is after end {}",
                start.format(DATE_FORMAT),
                end.format(DATE_FORMAT)
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a range from two `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, counting both ends
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Whether `date` falls inside the range
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

/// Parse a single `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| ExportError::InvalidRange(format!("cannot parse date '{s}': {e}")))
}

/// One bounded sub-range of an export window
///
/// Only the splitter constructs batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Batch {
    range: DateRange,
}

impl Batch {
    fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            range: DateRange { start, end },
        }
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn start(&self) -> NaiveDate {
        self.range.start
    }

    pub fn end(&self) -> NaiveDate {
        self.range.end
    }

    pub fn days(&self) -> i64 {
        self.range.days()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.range.fmt(f)
    }
}

/// Split a range into consecutive windows of `batch_days` days
///
/// # Arguments
/// * `range` - Range to cover
/// * `batch_days` - Maximum days per batch, at least 1
///
/// # Returns
/// * `Result<Vec<Batch>>` - Batches in chronological order, or `InvalidRange`
pub fn split_by_days(range: DateRange, batch_days: u32) -> Result<Vec<Batch>> {
    if batch_days == 0 {
        return Err(ExportError::InvalidRange(
            "batch_days must be at least 1".to_string(),
        ));
    }

    let step = Duration::days(i64::from(batch_days) - 1);
    let mut batches = Vec::with_capacity((range.days() as usize).div_ceil(batch_days as usize));
    let mut current = range.start;

    loop {
        let batch_end = current
            .checked_add_signed(step)
            .map_or(range.end, |d| d.min(range.end));
        batches.push(Batch::new(current, batch_end));

        match batch_end.succ_opt() {
            Some(next) if batch_end < range.end => current = next,
            _ => break,
        }
    }

    Ok(batches)
}

/// Split a range along calendar month boundaries
///
/// The first batch may start mid-month and the last may end mid-month.
pub fn split_by_month(range: DateRange) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current = range.start;

    loop {
        let month_end = last_day_of_month(current).min(range.end);
        batches.push(Batch::new(current, month_end));

        match month_end.succ_opt() {
            Some(next) if month_end < range.end => current = next,
            _ => break,
        }
    }

    batches
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}
