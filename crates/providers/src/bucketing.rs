//! Strategies adapters use to turn requested days into upstream fetch windows.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::types::DateRange;

/// Strips time-of-day and collapses duplicates
pub fn normalize_days(instants: &[DateTime<Utc>]) -> BTreeSet<NaiveDate> {
    instants.iter().map(|instant| instant.date_naive()).collect()
}

/// One range per calendar month touched by `days`, each spanning the whole month
pub fn by_month(days: &BTreeSet<NaiveDate>) -> Vec<DateRange> {
    let months: BTreeSet<(i32, u32)> = days.iter().map(|d| (d.year(), d.month())).collect();

    months
        .into_iter()
        .filter_map(|(year, month)| month_range(year, month))
        .collect()
}

/// A single range from the earliest to the latest requested day
pub fn single_span(days: &BTreeSet<NaiveDate>) -> Vec<DateRange> {
    match (days.first(), days.last()) {
        (Some(first), Some(last)) => vec![DateRange::new(*first, *last)],
        _ => Vec::new(),
    }
}

/// First to last day of the given month
pub fn month_range(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(DateRange::new(start, next.pred_opt()?))
}

/// First day of the month containing `day`
pub fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}
