//! Occurrence identity, computed occurrences, and persisted overrides.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Fixed-width date suffix in the encoded occurrence id (`YYYY-MM-DD`).
const DATE_SUFFIX_LEN: usize = 10;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Composite identity of one occurrence: the pair (bill id, due date).
///
/// Occurrences are derived rather than stored, so this pair is both the
/// identity and the join key to the override table. The canonical string
/// encoding is `"{bill_id}-{YYYY-MM-DD}"`; the date suffix is always
/// exactly ten characters, which is what makes the encoding reversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OccurrenceId {
    pub bill_id: Uuid,
    pub due_date: NaiveDate,
}

impl OccurrenceId {
    pub fn new(bill_id: Uuid, due_date: NaiveDate) -> Self {
        Self { bill_id, due_date }
    }
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.bill_id, self.due_date.format(DATE_FORMAT))
    }
}

/// Rejected encoded occurrence id. Malformed ids are client or data errors
/// and must never be silently coerced into some fallback occurrence.
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed occurrence id {0:?}: expected \"<bill-uuid>-YYYY-MM-DD\"")]
pub struct ParseOccurrenceIdError(String);

impl FromStr for OccurrenceId {
    type Err = ParseOccurrenceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseOccurrenceIdError(s.to_string());
        // Shortest valid form is a uuid, a separator, and the date suffix.
        if !s.is_ascii() || s.len() < DATE_SUFFIX_LEN + 2 {
            return Err(malformed());
        }
        let (head, date_part) = s.split_at(s.len() - DATE_SUFFIX_LEN);
        let bill_part = head.strip_suffix('-').ok_or_else(malformed)?;
        let due_date =
            NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|_| malformed())?;
        // parse_from_str tolerates unpadded components; the canonical
        // encoding does not.
        if due_date.format(DATE_FORMAT).to_string() != date_part {
            return Err(malformed());
        }
        let bill_id = Uuid::try_parse(bill_part).map_err(|_| malformed())?;
        Ok(Self { bill_id, due_date })
    }
}

/// Resolved status of a merged occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    Due,
    Paid,
    Skipped,
    Overdue,
}

impl OccurrenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceStatus::Due => "due",
            OccurrenceStatus::Paid => "paid",
            OccurrenceStatus::Skipped => "skipped",
            OccurrenceStatus::Overdue => "overdue",
        }
    }

    /// Whether a transaction can still be matched against this occurrence.
    pub fn is_open(&self) -> bool {
        matches!(self, OccurrenceStatus::Due | OccurrenceStatus::Overdue)
    }
}

/// Status an override row may carry. `due` and `overdue` are computed, never
/// stored, so the persisted set is narrower than [`OccurrenceStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideStatus {
    Paid,
    Skipped,
}

impl OverrideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideStatus::Paid => "paid",
            OverrideStatus::Skipped => "skipped",
        }
    }

    /// Unknown values are a data-integrity problem; no default arm.
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(OverrideStatus::Paid),
            "skipped" => Some(OverrideStatus::Skipped),
            _ => None,
        }
    }
}

impl From<OverrideStatus> for OccurrenceStatus {
    fn from(s: OverrideStatus) -> Self {
        match s {
            OverrideStatus::Paid => OccurrenceStatus::Paid,
            OverrideStatus::Skipped => OccurrenceStatus::Skipped,
        }
    }
}

/// One computed occurrence of a recurring bill. Derived on every query and
/// never persisted; an override row exists only once a status is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub bill_id: Uuid,
    pub bill_name: String,
    pub due_date: NaiveDate,
    pub expected_amount: Decimal,
}

impl Occurrence {
    pub fn id(&self) -> OccurrenceId {
        OccurrenceId::new(self.bill_id, self.due_date)
    }
}

/// Sparse per-occurrence status record, keyed by (user, bill id, due date).
/// At most one row exists per key; writes go through upsert-on-conflict.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OccurrenceOverride {
    pub user_id: Uuid,
    pub bill_id: Uuid,
    pub due_date: NaiveDate,
    pub status: String,
    pub paid_transaction_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub match_confidence: Option<f64>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl OccurrenceOverride {
    pub fn key(&self) -> OccurrenceId {
        OccurrenceId::new(self.bill_id, self.due_date)
    }

    pub fn status(&self) -> Option<OverrideStatus> {
        OverrideStatus::from_string(&self.status)
    }
}

/// Authoritative occurrence after layering overrides onto the computed
/// schedule and classifying open items against the current date.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedOccurrence {
    pub id: OccurrenceId,
    pub bill_name: String,
    pub expected_amount: Decimal,
    pub status: OccurrenceStatus,
    pub paid_transaction_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub match_confidence: Option<f64>,
}
