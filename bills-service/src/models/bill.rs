//! Recurring bill model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How often a bill falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillFrequency {
    Weekly,
    Fortnightly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BillFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillFrequency::Weekly => "weekly",
            BillFrequency::Fortnightly => "fortnightly",
            BillFrequency::Monthly => "monthly",
            BillFrequency::Quarterly => "quarterly",
            BillFrequency::Yearly => "yearly",
        }
    }

    /// Unknown values are a data-integrity problem, so there is no default
    /// arm here; callers decide whether to skip the bill or reject the batch.
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "weekly" => Some(BillFrequency::Weekly),
            "fortnightly" => Some(BillFrequency::Fortnightly),
            "monthly" => Some(BillFrequency::Monthly),
            "quarterly" => Some(BillFrequency::Quarterly),
            "yearly" => Some(BillFrequency::Yearly),
            _ => None,
        }
    }
}

/// Recurring bill definition, owned by the bill-management screens.
///
/// The scheduling core treats rows as read-only input: it expands them into
/// dated occurrences but never writes back to this table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecurringBill {
    pub bill_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub frequency: String,
    pub due_day: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl RecurringBill {
    pub fn frequency(&self) -> Option<BillFrequency> {
        BillFrequency::from_string(&self.frequency)
    }
}
