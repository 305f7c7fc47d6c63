//! Expansion of recurring bill definitions into dated occurrences.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

use crate::models::{BillFrequency, Occurrence, RecurringBill};

/// Hard cap on occurrences a single bill may contribute to one expansion.
/// A weekly bill over the widest range the API accepts stays far below this;
/// the cap exists so corrupt date maths can never produce an unbounded list.
const MAX_OCCURRENCES_PER_BILL: usize = 1024;

/// Anchor month for fortnightly/quarterly/yearly bills that carry no start
/// date. Fixing the phase to an epoch keeps the generated lattice a property
/// of the bill alone rather than of whichever range happens to be queried.
const EPOCH_ANCHOR: (i32, u32) = (1970, 1);

/// A bill row the generator cannot expand. These are data-integrity
/// problems, not calendar edge cases, and are surfaced rather than skipped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScheduleError {
    #[error("bill {bill_id} has unknown frequency {value:?}")]
    UnknownFrequency { bill_id: Uuid, value: String },
    #[error("bill {bill_id} has due day {due_day}, expected 1-31")]
    DueDayOutOfRange { bill_id: Uuid, due_day: i32 },
}

/// Expand every bill over `[range_start, range_end]` into a single ordered,
/// deduplicated occurrence list.
///
/// Output is sorted by due date ascending, ties broken by bill id. The whole
/// batch fails on the first malformed bill; callers that want per-bill
/// tolerance (the reconciliation pass does) call [`expand_bill`] per row and
/// decide what to do with the error themselves.
pub fn generate(
    bills: &[RecurringBill],
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Result<Vec<Occurrence>, ScheduleError> {
    let mut by_key: BTreeMap<(NaiveDate, Uuid), Occurrence> = BTreeMap::new();
    for bill in bills {
        for occurrence in expand_bill(bill, range_start, range_end)? {
            by_key.insert((occurrence.due_date, occurrence.bill_id), occurrence);
        }
    }
    Ok(by_key.into_values().collect())
}

/// Expand one bill over `[range_start, range_end]`.
///
/// Inactive bills, inverted ranges, and ranges that miss the bill's active
/// window all produce an empty list; absent data is a valid steady state,
/// not a failure.
pub fn expand_bill(
    bill: &RecurringBill,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Result<Vec<Occurrence>, ScheduleError> {
    if !bill.is_active || range_end < range_start {
        return Ok(Vec::new());
    }
    let frequency = bill
        .frequency()
        .ok_or_else(|| ScheduleError::UnknownFrequency {
            bill_id: bill.bill_id,
            value: bill.frequency.clone(),
        })?;
    if !(1..=31).contains(&bill.due_day) {
        return Err(ScheduleError::DueDayOutOfRange {
            bill_id: bill.bill_id,
            due_day: bill.due_day,
        });
    }
    let due_day = bill.due_day as u32;

    // Clip the requested range to the bill's active window. The window only
    // filters which dates survive; anchoring below never depends on it.
    let start = match bill.start_date {
        Some(window_start) if window_start > range_start => window_start,
        _ => range_start,
    };
    let end = match bill.end_date {
        Some(window_end) if window_end < range_end => window_end,
        _ => range_end,
    };
    if end < start {
        return Ok(Vec::new());
    }

    let dates = match frequency {
        BillFrequency::Monthly => monthly_dates(due_day, start, end),
        BillFrequency::Weekly => weekly_dates(bill.due_day, start, end),
        BillFrequency::Fortnightly => fortnightly_dates(bill, due_day, start, end),
        BillFrequency::Quarterly => quarterly_dates(bill, due_day, start, end),
        BillFrequency::Yearly => yearly_dates(bill, due_day, start, end),
    };

    Ok(dates
        .into_iter()
        .take(MAX_OCCURRENCES_PER_BILL)
        .map(|due_date| Occurrence {
            bill_id: bill.bill_id,
            bill_name: bill.name.clone(),
            due_date,
            expected_amount: bill.amount,
        })
        .collect())
}

/// Clamp a 1-31 due day into a real date in the given month: day 31 in
/// February lands on Feb 28/29, never on an invalid date.
fn clamped_due_date(year: i32, month: u32, due_day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, due_day).or_else(|| {
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1).and_then(|first| first.pred_opt())
    })
}

/// Iterate the (year, month) pairs of every calendar month intersecting the
/// range, in order.
fn months_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = (i32, u32)> {
    let mut current = (start.year(), start.month());
    let last = (end.year(), end.month());
    std::iter::from_fn(move || {
        if current > last {
            return None;
        }
        let item = current;
        current = if current.1 == 12 {
            (current.0 + 1, 1)
        } else {
            (current.0, current.1 + 1)
        };
        Some(item)
    })
}

fn monthly_dates(due_day: u32, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for (year, month) in months_between(start, end) {
        if let Some(date) = clamped_due_date(year, month, due_day) {
            if date >= start && date <= end {
                dates.push(date);
            }
        }
    }
    dates
}

/// Weekly bills reuse the due-day column as a day-of-week, interpreted
/// modulo 7 with 0 = Sunday. The walk visits every day in the range so no
/// alignment to month or week boundaries is assumed.
fn weekly_dates(due_day: i32, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let target = due_day.rem_euclid(7) as u32;
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        if current.weekday().num_days_from_sunday() == target {
            dates.push(current);
        }
        current = match current.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    dates
}

/// Reference month for anchored frequencies: the start-date month when the
/// bill has one, the epoch otherwise.
fn anchor_month(bill: &RecurringBill) -> (i32, u32) {
    bill.start_date
        .map(|date| (date.year(), date.month()))
        .unwrap_or(EPOCH_ANCHOR)
}

/// Fortnightly occurrences live on a fixed 14-day lattice through the
/// anchor date. Walking the lattice, rather than re-deriving a date per
/// month, is what prevents drift across month boundaries.
fn fortnightly_dates(
    bill: &RecurringBill,
    due_day: u32,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<NaiveDate> {
    let (anchor_year, anchor_mon) = anchor_month(bill);
    let Some(anchor) = clamped_due_date(anchor_year, anchor_mon, due_day) else {
        return Vec::new();
    };
    let offset = (start - anchor).num_days();
    // First lattice point at or after `start`; euclidean division keeps
    // this correct when the anchor is ahead of the range.
    let first_step = (offset + 13).div_euclid(14);
    let mut current = anchor + Duration::days(first_step * 14);
    let mut dates = Vec::new();
    while current <= end {
        dates.push(current);
        current += Duration::days(14);
    }
    dates
}

fn month_index(year: i32, month: u32) -> i64 {
    i64::from(year) * 12 + i64::from(month) - 1
}

/// Quarterly bills fall due only in months a whole number of quarters away
/// from the anchor month, clamped within each qualifying month.
fn quarterly_dates(
    bill: &RecurringBill,
    due_day: u32,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<NaiveDate> {
    let (anchor_year, anchor_mon) = anchor_month(bill);
    let anchor_index = month_index(anchor_year, anchor_mon);
    let mut dates = Vec::new();
    for (year, month) in months_between(start, end) {
        if (month_index(year, month) - anchor_index).rem_euclid(3) != 0 {
            continue;
        }
        if let Some(date) = clamped_due_date(year, month, due_day) {
            if date >= start && date <= end {
                dates.push(date);
            }
        }
    }
    dates
}

/// Yearly bills fall due once per year, in the anchor month.
fn yearly_dates(
    bill: &RecurringBill,
    due_day: u32,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<NaiveDate> {
    let (_, anchor_mon) = anchor_month(bill);
    let mut dates = Vec::new();
    for (year, month) in months_between(start, end) {
        if month != anchor_mon {
            continue;
        }
        if let Some(date) = clamped_due_date(year, month, due_day) {
            if date >= start && date <= end {
                dates.push(date);
            }
        }
    }
    dates
}
