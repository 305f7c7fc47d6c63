//! Bank transaction model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Settled or pending bank transaction imported from account feeds.
///
/// `bill_id` is the durable bill-link: once a transaction has been matched
/// to a bill occurrence (automatically or by hand) it points at that bill
/// and is excluded from future matching. `amount` keeps the feed's sign
/// convention, so debits on spending accounts come through negative and
/// comparisons against expected bill amounts happen on absolute values.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub merchant: Option<String>,
    pub amount: Decimal,
    pub bill_id: Option<Uuid>,
    pub is_pending: bool,
    pub created_utc: DateTime<Utc>,
}
