//! Request and response payloads for the HTTP API.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matching::{ConfidenceTier, MatchDecision};
use crate::models::{MergedOccurrence, OccurrenceStatus};
use crate::services::ReconcilePass;

/// Query string for the calendar view: both bounds inclusive.
#[derive(Debug, Deserialize)]
pub struct OccurrenceRangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Body of a pay request. Everything is optional: `{}` marks the
/// occurrence paid by hand, a transaction id additionally links the
/// settling transaction, and `paid_at` backdates the payment.
#[derive(Debug, Default, Deserialize)]
pub struct PayOccurrenceRequest {
    pub transaction_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Body of a reconcile request: the date window to match over.
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// One merged occurrence as the API reports it.
#[derive(Debug, Serialize)]
pub struct OccurrenceResponse {
    pub id: String,
    pub bill_id: Uuid,
    pub bill_name: String,
    pub due_date: NaiveDate,
    pub expected_amount: Decimal,
    pub status: OccurrenceStatus,
    pub paid_transaction_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub match_confidence: Option<f64>,
}

impl From<MergedOccurrence> for OccurrenceResponse {
    fn from(merged: MergedOccurrence) -> Self {
        Self {
            id: merged.id.to_string(),
            bill_id: merged.id.bill_id,
            bill_name: merged.bill_name,
            due_date: merged.id.due_date,
            expected_amount: merged.expected_amount,
            status: merged.status,
            paid_transaction_id: merged.paid_transaction_id,
            paid_at: merged.paid_at,
            match_confidence: merged.match_confidence,
        }
    }
}

/// One retained match, auto-applied or queued for review.
#[derive(Debug, Serialize)]
pub struct MatchDecisionResponse {
    pub occurrence_id: String,
    pub transaction_id: Uuid,
    pub score: u32,
    pub tier: ConfidenceTier,
    pub reasons: Vec<String>,
}

impl From<MatchDecision> for MatchDecisionResponse {
    fn from(decision: MatchDecision) -> Self {
        Self {
            occurrence_id: decision.occurrence_id.to_string(),
            transaction_id: decision.transaction_id,
            score: decision.score,
            tier: decision.tier,
            reasons: decision.reasons,
        }
    }
}

/// Outcome of one reconcile pass.
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub auto_applied: Vec<MatchDecisionResponse>,
    pub for_review: Vec<MatchDecisionResponse>,
    pub occurrences_considered: usize,
    pub transactions_considered: usize,
    pub bills_skipped: usize,
    pub writes_failed: usize,
}

impl From<ReconcilePass> for ReconcileResponse {
    fn from(pass: ReconcilePass) -> Self {
        Self {
            auto_applied: pass.auto_applied.into_iter().map(Into::into).collect(),
            for_review: pass.for_review.into_iter().map(Into::into).collect(),
            occurrences_considered: pass.occurrences_considered,
            transactions_considered: pass.transactions_considered,
            bills_skipped: pass.bills_skipped,
            writes_failed: pass.writes_failed,
        }
    }
}
