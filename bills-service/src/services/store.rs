//! Storage abstraction for bills, overrides, and account transactions.
//!
//! The rest of the service only ever sees [`LedgerStore`]; the Postgres
//! implementation lives in [`super::database`] and [`MemoryLedger`] backs
//! the integration tests. Overrides behave as a key-value table keyed by
//! (user, bill id, due date).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{OccurrenceId, OccurrenceOverride, RecurringBill, Transaction};

/// Upsert input for an override row; the store fills in timestamps.
#[derive(Debug, Clone)]
pub struct OverrideUpsert {
    pub user_id: Uuid,
    pub key: OccurrenceId,
    pub status: String,
    pub paid_transaction_id: Option<Uuid>,
    pub paid_at: Option<chrono::DateTime<Utc>>,
    pub match_confidence: Option<f64>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn fetch_active_bills(&self, user_id: Uuid) -> Result<Vec<RecurringBill>, AppError>;

    async fn fetch_bill(
        &self,
        user_id: Uuid,
        bill_id: Uuid,
    ) -> Result<Option<RecurringBill>, AppError>;

    /// Overrides whose due date falls inside `[start, end]`, ordered by
    /// due date then bill id.
    async fn fetch_overrides(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OccurrenceOverride>, AppError>;

    async fn fetch_override(
        &self,
        user_id: Uuid,
        key: OccurrenceId,
    ) -> Result<Option<OccurrenceOverride>, AppError>;

    /// Insert-or-update on the (user, bill, due date) key; last writer wins.
    async fn upsert_override(
        &self,
        upsert: OverrideUpsert,
    ) -> Result<OccurrenceOverride, AppError>;

    async fn delete_override(&self, user_id: Uuid, key: OccurrenceId) -> Result<(), AppError>;

    /// Settled and pending transactions dated inside `[start, end]`,
    /// ordered by date then id.
    async fn fetch_transactions(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError>;

    async fn fetch_transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError>;

    /// Point the transaction's bill link at `bill_id`, or clear it with
    /// `None`. Missing rows are a no-op; callers that care fetch first.
    async fn set_transaction_bill_link(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        bill_id: Option<Uuid>,
    ) -> Result<(), AppError>;
}

/// In-memory [`LedgerStore`] used by the integration tests.
///
/// Mirrors the Postgres semantics that matter to callers: user scoping,
/// upsert-on-conflict, ordered range fetches. `fail_reads` and
/// `fail_writes` simulate a storage outage so the fail-closed read path
/// and the per-item write tolerance of the reconcile pass can both be
/// exercised.
#[derive(Default)]
pub struct MemoryLedger {
    bills: DashMap<Uuid, RecurringBill>,
    overrides: DashMap<(Uuid, Uuid, NaiveDate), OccurrenceOverride>,
    transactions: DashMap<Uuid, Transaction>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bill(&self, bill: RecurringBill) {
        self.bills.insert(bill.bill_id, bill);
    }

    pub fn insert_transaction(&self, txn: Transaction) {
        self.transactions.insert(txn.transaction_id, txn);
    }

    /// Make every read return a storage error until switched back off.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write return a storage error until switched back off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn guard_reads(&self) -> Result<(), AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "simulated storage outage"
            )));
        }
        Ok(())
    }

    fn guard_writes(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "simulated storage outage"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn health_check(&self) -> Result<(), AppError> {
        self.guard_reads()
    }

    async fn fetch_active_bills(&self, user_id: Uuid) -> Result<Vec<RecurringBill>, AppError> {
        self.guard_reads()?;
        let mut bills: Vec<RecurringBill> = self
            .bills
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.is_active)
            .map(|entry| entry.value().clone())
            .collect();
        bills.sort_by(|a, b| a.name.cmp(&b.name).then(a.bill_id.cmp(&b.bill_id)));
        Ok(bills)
    }

    async fn fetch_bill(
        &self,
        user_id: Uuid,
        bill_id: Uuid,
    ) -> Result<Option<RecurringBill>, AppError> {
        self.guard_reads()?;
        Ok(self
            .bills
            .get(&bill_id)
            .filter(|bill| bill.user_id == user_id)
            .map(|bill| bill.value().clone()))
    }

    async fn fetch_overrides(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OccurrenceOverride>, AppError> {
        self.guard_reads()?;
        let mut rows: Vec<OccurrenceOverride> = self
            .overrides
            .iter()
            .filter(|entry| {
                entry.user_id == user_id && entry.due_date >= start && entry.due_date <= end
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.bill_id.cmp(&b.bill_id)));
        Ok(rows)
    }

    async fn fetch_override(
        &self,
        user_id: Uuid,
        key: OccurrenceId,
    ) -> Result<Option<OccurrenceOverride>, AppError> {
        self.guard_reads()?;
        Ok(self
            .overrides
            .get(&(user_id, key.bill_id, key.due_date))
            .map(|row| row.value().clone()))
    }

    async fn upsert_override(
        &self,
        upsert: OverrideUpsert,
    ) -> Result<OccurrenceOverride, AppError> {
        self.guard_writes()?;
        let now = Utc::now();
        let map_key = (upsert.user_id, upsert.key.bill_id, upsert.key.due_date);
        let created_utc = self
            .overrides
            .get(&map_key)
            .map(|existing| existing.created_utc)
            .unwrap_or(now);
        let row = OccurrenceOverride {
            user_id: upsert.user_id,
            bill_id: upsert.key.bill_id,
            due_date: upsert.key.due_date,
            status: upsert.status,
            paid_transaction_id: upsert.paid_transaction_id,
            paid_at: upsert.paid_at,
            match_confidence: upsert.match_confidence,
            created_utc,
            updated_utc: now,
        };
        self.overrides.insert(map_key, row.clone());
        Ok(row)
    }

    async fn delete_override(&self, user_id: Uuid, key: OccurrenceId) -> Result<(), AppError> {
        self.guard_writes()?;
        self.overrides.remove(&(user_id, key.bill_id, key.due_date));
        Ok(())
    }

    async fn fetch_transactions(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        self.guard_reads()?;
        let mut rows: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| {
                entry.user_id == user_id
                    && entry.transaction_date >= start
                    && entry.transaction_date <= end
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| {
            a.transaction_date
                .cmp(&b.transaction_date)
                .then(a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(rows)
    }

    async fn fetch_transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        self.guard_reads()?;
        Ok(self
            .transactions
            .get(&transaction_id)
            .filter(|txn| txn.user_id == user_id)
            .map(|txn| txn.value().clone()))
    }

    async fn set_transaction_bill_link(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        bill_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        self.guard_writes()?;
        if let Some(mut txn) = self.transactions.get_mut(&transaction_id) {
            if txn.user_id == user_id {
                txn.bill_id = bill_id;
            }
        }
        Ok(())
    }
}
