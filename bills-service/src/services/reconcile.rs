//! Reconciliation coordinator.
//!
//! The only module that both reads and writes: it feeds storage rows
//! through the pure scheduling and matching cores, persists the results,
//! and keeps the calendar view cache honest. Status writes always re-read
//! the override row first; the row in storage, not anything a handler
//! computed earlier, decides whether a transition is legal.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use service_core::error::AppError;

use crate::matching::{match_transactions, MatchDecision};
use crate::models::{
    MergedOccurrence, Occurrence, OccurrenceId, OccurrenceOverride, OverrideStatus, RecurringBill,
};
use crate::schedule::{expand_bill, merge_occurrences, merge_single};
use crate::services::metrics::{
    record_error, record_occurrences_generated, record_reconcile_operation,
    record_transaction_match,
};
use crate::services::store::{LedgerStore, OverrideUpsert};
use crate::services::views::ViewCache;

/// Summary of one reconcile pass over a date range.
#[derive(Debug, Clone)]
pub struct ReconcilePass {
    pub auto_applied: Vec<MatchDecision>,
    pub for_review: Vec<MatchDecision>,
    pub occurrences_considered: usize,
    pub transactions_considered: usize,
    pub bills_skipped: usize,
    pub writes_failed: usize,
}

pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    views: Arc<ViewCache>,
    max_range_days: i64,
}

impl Reconciler {
    pub fn new(store: Arc<dyn LedgerStore>, views: Arc<ViewCache>, max_range_days: i64) -> Self {
        Self {
            store,
            views,
            max_range_days,
        }
    }

    /// Merged occurrence list for `[start, end]`, served from the view
    /// cache when nothing has changed since it was computed.
    ///
    /// Reads fail closed: if bills or overrides cannot be fetched the whole
    /// request errors rather than showing unpaid bills as due.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_occurrences(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MergedOccurrence>, AppError> {
        self.check_range(start, end)?;
        let today = Utc::now().date_naive();

        if let Some(view) = self.views.get(user_id, start, end, today) {
            return Ok(view);
        }

        let bills = self.store.fetch_active_bills(user_id).await?;
        let (computed, _skipped) = expand_tolerant(&bills, start, end);
        record_occurrences_generated(computed.len());

        let overrides = self.store.fetch_overrides(user_id, start, end).await?;
        note_malformed_overrides(&overrides);

        let merged = merge_occurrences(&computed, &overrides, today);
        self.views.put(user_id, start, end, today, merged.clone());
        Ok(merged)
    }

    /// Look up a single occurrence by composite id.
    ///
    /// The occurrence is reconstructed from the bill row, so ids stay
    /// resolvable whether or not any range query ever produced them, and
    /// for inactive bills whose history still holds overrides.
    #[instrument(skip(self), fields(user_id = %user_id, occurrence_id = %id))]
    pub async fn resolve(
        &self,
        user_id: Uuid,
        id: OccurrenceId,
    ) -> Result<MergedOccurrence, AppError> {
        let today = Utc::now().date_naive();
        let bill = self.require_bill(user_id, id.bill_id).await?;
        let override_row = self.store.fetch_override(user_id, id).await?;
        if let Some(row) = &override_row {
            if row.status().is_none() {
                record_error("malformed_override");
                warn!(occurrence_id = %id, status = %row.status, "Override status did not parse");
            }
        }
        let occurrence = synthetic_occurrence(&bill, id.due_date);
        Ok(merge_single(&occurrence, override_row.as_ref(), today))
    }

    /// Mark an occurrence paid, optionally linking the settling transaction.
    ///
    /// Re-marking an already paid occurrence is an idempotent upsert that
    /// keeps an existing transaction link and paid timestamp unless the
    /// request replaces them. A skipped occurrence must be reset first.
    #[instrument(skip(self), fields(user_id = %user_id, occurrence_id = %id))]
    pub async fn mark_paid(
        &self,
        user_id: Uuid,
        id: OccurrenceId,
        transaction_id: Option<Uuid>,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<MergedOccurrence, AppError> {
        let today = Utc::now().date_naive();
        let bill = self.require_bill(user_id, id.bill_id).await?;
        let existing = self.store.fetch_override(user_id, id).await?;

        if existing.as_ref().and_then(|row| row.status()) == Some(OverrideStatus::Skipped) {
            record_reconcile_operation("mark_paid", "conflict");
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Occurrence {} is skipped; reset it before marking paid",
                id
            )));
        }

        let previous_link = existing.as_ref().and_then(|row| row.paid_transaction_id);
        if let Some(new_link) = transaction_id {
            self.store
                .fetch_transaction(user_id, new_link)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Transaction {} not found", new_link))
                })?;
            // Replacing the link: release the old transaction before the
            // override stops referencing it.
            if let Some(old_link) = previous_link {
                if old_link != new_link {
                    self.store
                        .set_transaction_bill_link(user_id, old_link, None)
                        .await?;
                }
            }
        }

        let link = transaction_id.or(previous_link);
        let match_confidence = if transaction_id.is_some() {
            None
        } else {
            existing.as_ref().and_then(|row| row.match_confidence)
        };
        let resolved_paid_at = paid_at
            .or_else(|| existing.as_ref().and_then(|row| row.paid_at))
            .unwrap_or_else(Utc::now);

        let row = self
            .store
            .upsert_override(OverrideUpsert {
                user_id,
                key: id,
                status: OverrideStatus::Paid.as_str().to_string(),
                paid_transaction_id: link,
                paid_at: Some(resolved_paid_at),
                match_confidence,
            })
            .await?;
        if let Some(txn_id) = link {
            self.store
                .set_transaction_bill_link(user_id, txn_id, Some(id.bill_id))
                .await?;
        }

        self.views.invalidate(user_id);
        record_reconcile_operation("mark_paid", "success");

        let occurrence = synthetic_occurrence(&bill, id.due_date);
        Ok(merge_single(&occurrence, Some(&row), today))
    }

    /// Mark an occurrence skipped. A paid occurrence must be reset first.
    #[instrument(skip(self), fields(user_id = %user_id, occurrence_id = %id))]
    pub async fn mark_skipped(
        &self,
        user_id: Uuid,
        id: OccurrenceId,
    ) -> Result<MergedOccurrence, AppError> {
        let today = Utc::now().date_naive();
        let bill = self.require_bill(user_id, id.bill_id).await?;
        let existing = self.store.fetch_override(user_id, id).await?;

        if existing.as_ref().and_then(|row| row.status()) == Some(OverrideStatus::Paid) {
            record_reconcile_operation("mark_skipped", "conflict");
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Occurrence {} is paid; reset it before marking skipped",
                id
            )));
        }

        let row = self
            .store
            .upsert_override(OverrideUpsert {
                user_id,
                key: id,
                status: OverrideStatus::Skipped.as_str().to_string(),
                paid_transaction_id: None,
                paid_at: None,
                match_confidence: None,
            })
            .await?;

        self.views.invalidate(user_id);
        record_reconcile_operation("mark_skipped", "success");

        let occurrence = synthetic_occurrence(&bill, id.due_date);
        Ok(merge_single(&occurrence, Some(&row), today))
    }

    /// Delete the override, returning the occurrence to its calendar
    /// classification. Resetting an occurrence that has no override is a
    /// no-op, not an error.
    ///
    /// The transaction bill-link is cleared before the override row goes
    /// away, so a crash in between leaves a row that still explains the
    /// link rather than a transaction pointing at nothing.
    #[instrument(skip(self), fields(user_id = %user_id, occurrence_id = %id))]
    pub async fn reset(
        &self,
        user_id: Uuid,
        id: OccurrenceId,
    ) -> Result<MergedOccurrence, AppError> {
        let today = Utc::now().date_naive();
        let bill = self.require_bill(user_id, id.bill_id).await?;

        if let Some(row) = self.store.fetch_override(user_id, id).await? {
            if let Some(txn_id) = row.paid_transaction_id {
                self.store
                    .set_transaction_bill_link(user_id, txn_id, None)
                    .await?;
            }
            self.store.delete_override(user_id, id).await?;
            self.views.invalidate(user_id);
        }
        record_reconcile_operation("reset", "success");

        let occurrence = synthetic_occurrence(&bill, id.due_date);
        Ok(merge_single(&occurrence, None, today))
    }

    /// Run one reconcile pass over `[start, end]`: expand, merge, match,
    /// then persist the high-confidence matches as paid overrides.
    ///
    /// Persistence is per-item tolerant. One failed write is logged and
    /// counted but never aborts the rest of the batch, so a flaky row
    /// cannot hold every other match hostage.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn run_pass(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ReconcilePass, AppError> {
        self.check_range(start, end)?;
        let today = Utc::now().date_naive();

        let bills = self.store.fetch_active_bills(user_id).await?;
        let (computed, bills_skipped) = expand_tolerant(&bills, start, end);
        record_occurrences_generated(computed.len());

        let overrides = self.store.fetch_overrides(user_id, start, end).await?;
        note_malformed_overrides(&overrides);
        let transactions = self.store.fetch_transactions(user_id, start, end).await?;

        // Transactions already claimed by an override stay claimed even if
        // their bill_id column was lost mid-write; the override is the
        // authority.
        let already_linked: HashSet<Uuid> = overrides
            .iter()
            .filter_map(|row| row.paid_transaction_id)
            .collect();

        let merged = merge_occurrences(&computed, &overrides, today);
        let outcome = match_transactions(&merged, &transactions, &already_linked);
        for decision in outcome.auto_apply.iter().chain(&outcome.for_review) {
            record_transaction_match(decision.tier.as_str());
        }

        let mut writes_failed = 0usize;
        for decision in &outcome.auto_apply {
            if let Err(e) = self.apply_match(user_id, decision).await {
                writes_failed += 1;
                record_error("auto_apply_write");
                warn!(
                    occurrence_id = %decision.occurrence_id,
                    transaction_id = %decision.transaction_id,
                    "Failed to persist match: {}",
                    e
                );
            }
        }
        if !outcome.auto_apply.is_empty() {
            self.views.invalidate(user_id);
        }

        let status = if writes_failed == 0 { "success" } else { "partial" };
        record_reconcile_operation("pass", status);
        info!(
            auto_applied = outcome.auto_apply.len(),
            for_review = outcome.for_review.len(),
            occurrences = merged.len(),
            transactions = transactions.len(),
            bills_skipped = bills_skipped,
            writes_failed = writes_failed,
            "Reconcile pass complete"
        );

        Ok(ReconcilePass {
            auto_applied: outcome.auto_apply,
            for_review: outcome.for_review,
            occurrences_considered: merged.len(),
            transactions_considered: transactions.len(),
            bills_skipped,
            writes_failed,
        })
    }

    async fn apply_match(&self, user_id: Uuid, decision: &MatchDecision) -> Result<(), AppError> {
        self.store
            .upsert_override(OverrideUpsert {
                user_id,
                key: decision.occurrence_id,
                status: OverrideStatus::Paid.as_str().to_string(),
                paid_transaction_id: Some(decision.transaction_id),
                paid_at: Some(Utc::now()),
                match_confidence: Some(f64::from(decision.score)),
            })
            .await?;
        self.store
            .set_transaction_bill_link(
                user_id,
                decision.transaction_id,
                Some(decision.occurrence_id.bill_id),
            )
            .await?;
        Ok(())
    }

    async fn require_bill(&self, user_id: Uuid, bill_id: Uuid) -> Result<RecurringBill, AppError> {
        self.store
            .fetch_bill(user_id, bill_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bill {} not found", bill_id)))
    }

    fn check_range(&self, start: NaiveDate, end: NaiveDate) -> Result<(), AppError> {
        if end < start {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Range end {} is before start {}",
                end,
                start
            )));
        }
        if (end - start).num_days() > self.max_range_days {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Range exceeds the {} day maximum",
                self.max_range_days
            )));
        }
        Ok(())
    }
}

fn synthetic_occurrence(bill: &RecurringBill, due_date: NaiveDate) -> Occurrence {
    Occurrence {
        bill_id: bill.bill_id,
        bill_name: bill.name.clone(),
        due_date,
        expected_amount: bill.amount,
    }
}

/// Expand bills one by one, excluding rows the generator rejects. A
/// malformed bill is that bill's problem; the rest of the batch goes on.
fn expand_tolerant(
    bills: &[RecurringBill],
    start: NaiveDate,
    end: NaiveDate,
) -> (Vec<Occurrence>, usize) {
    let mut by_key: BTreeMap<(NaiveDate, Uuid), Occurrence> = BTreeMap::new();
    let mut skipped = 0usize;
    for bill in bills {
        match expand_bill(bill, start, end) {
            Ok(occurrences) => {
                for occurrence in occurrences {
                    by_key.insert((occurrence.due_date, occurrence.bill_id), occurrence);
                }
            }
            Err(e) => {
                skipped += 1;
                record_error("malformed_bill");
                warn!(bill_id = %bill.bill_id, "Excluding bill from expansion: {}", e);
            }
        }
    }
    (by_key.into_values().collect(), skipped)
}

fn note_malformed_overrides(overrides: &[OccurrenceOverride]) {
    for row in overrides {
        if row.status().is_none() {
            record_error("malformed_override");
            warn!(occurrence_id = %row.key(), status = %row.status, "Override status did not parse");
        }
    }
}
