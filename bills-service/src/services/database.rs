//! Postgres-backed [`LedgerStore`] for bills-service.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{OccurrenceId, OccurrenceOverride, RecurringBill, Transaction};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{LedgerStore, OverrideUpsert};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "bills-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch_active_bills(&self, user_id: Uuid) -> Result<Vec<RecurringBill>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_active_bills"])
            .start_timer();

        let bills = sqlx::query_as::<_, RecurringBill>(
            r#"
            SELECT bill_id, user_id, name, amount, frequency, due_day, start_date, end_date, is_active, created_utc, updated_utc
            FROM bills
            WHERE user_id = $1 AND is_active = TRUE
            ORDER BY name, bill_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch bills: {}", e)))?;

        timer.observe_duration();

        Ok(bills)
    }

    #[instrument(skip(self), fields(user_id = %user_id, bill_id = %bill_id))]
    async fn fetch_bill(
        &self,
        user_id: Uuid,
        bill_id: Uuid,
    ) -> Result<Option<RecurringBill>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, RecurringBill>(
            r#"
            SELECT bill_id, user_id, name, amount, frequency, due_day, start_date, end_date, is_active, created_utc, updated_utc
            FROM bills
            WHERE user_id = $1 AND bill_id = $2
            "#,
        )
        .bind(user_id)
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch bill: {}", e)))?;

        timer.observe_duration();

        Ok(bill)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch_overrides(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OccurrenceOverride>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_overrides"])
            .start_timer();

        let overrides = sqlx::query_as::<_, OccurrenceOverride>(
            r#"
            SELECT user_id, bill_id, due_date, status, paid_transaction_id, paid_at, match_confidence, created_utc, updated_utc
            FROM bill_occurrence_overrides
            WHERE user_id = $1 AND due_date >= $2 AND due_date <= $3
            ORDER BY due_date, bill_id
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch overrides: {}", e)))?;

        timer.observe_duration();

        Ok(overrides)
    }

    #[instrument(skip(self), fields(user_id = %user_id, occurrence_id = %key))]
    async fn fetch_override(
        &self,
        user_id: Uuid,
        key: OccurrenceId,
    ) -> Result<Option<OccurrenceOverride>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_override"])
            .start_timer();

        let row = sqlx::query_as::<_, OccurrenceOverride>(
            r#"
            SELECT user_id, bill_id, due_date, status, paid_transaction_id, paid_at, match_confidence, created_utc, updated_utc
            FROM bill_occurrence_overrides
            WHERE user_id = $1 AND bill_id = $2 AND due_date = $3
            "#,
        )
        .bind(user_id)
        .bind(key.bill_id)
        .bind(key.due_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch override: {}", e)))?;

        timer.observe_duration();

        Ok(row)
    }

    #[instrument(skip(self, upsert), fields(user_id = %upsert.user_id, occurrence_id = %upsert.key))]
    async fn upsert_override(
        &self,
        upsert: OverrideUpsert,
    ) -> Result<OccurrenceOverride, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_override"])
            .start_timer();

        let row = sqlx::query_as::<_, OccurrenceOverride>(
            r#"
            INSERT INTO bill_occurrence_overrides (user_id, bill_id, due_date, status, paid_transaction_id, paid_at, match_confidence)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, bill_id, due_date)
            DO UPDATE SET
                status = EXCLUDED.status,
                paid_transaction_id = EXCLUDED.paid_transaction_id,
                paid_at = EXCLUDED.paid_at,
                match_confidence = EXCLUDED.match_confidence,
                updated_utc = NOW()
            RETURNING user_id, bill_id, due_date, status, paid_transaction_id, paid_at, match_confidence, created_utc, updated_utc
            "#,
        )
        .bind(upsert.user_id)
        .bind(upsert.key.bill_id)
        .bind(upsert.key.due_date)
        .bind(&upsert.status)
        .bind(upsert.paid_transaction_id)
        .bind(upsert.paid_at)
        .bind(upsert.match_confidence)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert override: {}", e)))?;

        timer.observe_duration();
        info!(status = %row.status, "Occurrence override upserted");

        Ok(row)
    }

    #[instrument(skip(self), fields(user_id = %user_id, occurrence_id = %key))]
    async fn delete_override(&self, user_id: Uuid, key: OccurrenceId) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_override"])
            .start_timer();

        sqlx::query(
            r#"
            DELETE FROM bill_occurrence_overrides
            WHERE user_id = $1 AND bill_id = $2 AND due_date = $3
            "#,
        )
        .bind(user_id)
        .bind(key.bill_id)
        .bind(key.due_date)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete override: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch_transactions(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_transactions"])
            .start_timer();

        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT transaction_id, user_id, account_id, transaction_date, description, merchant, amount, bill_id, is_pending, created_utc
            FROM account_transactions
            WHERE user_id = $1 AND transaction_date >= $2 AND transaction_date <= $3
            ORDER BY transaction_date, transaction_id
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch transactions: {}", e))
        })?;

        timer.observe_duration();

        Ok(transactions)
    }

    #[instrument(skip(self), fields(user_id = %user_id, transaction_id = %transaction_id))]
    async fn fetch_transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_transaction"])
            .start_timer();

        let txn = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT transaction_id, user_id, account_id, transaction_date, description, merchant, amount, bill_id, is_pending, created_utc
            FROM account_transactions
            WHERE user_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(user_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(txn)
    }

    #[instrument(skip(self), fields(user_id = %user_id, transaction_id = %transaction_id))]
    async fn set_transaction_bill_link(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        bill_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_transaction_bill_link"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE account_transactions
            SET bill_id = $3
            WHERE user_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(user_id)
        .bind(transaction_id)
        .bind(bill_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update bill link: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }
}
