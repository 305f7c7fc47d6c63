//! Shared test harness for bills-service integration tests.
//!
//! Tests run the full HTTP stack over [`MemoryLedger`], so they exercise
//! routing, extractors, and the reconciler without needing Postgres.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use bills_service::config::{BillsConfig, DatabaseConfig, ReconcileConfig};
use bills_service::models::{RecurringBill, Transaction};
use bills_service::services::MemoryLedger;
use bills_service::startup::Application;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::config::Config as CoreConfig;
use uuid::Uuid;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("warn,bills_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config() -> BillsConfig {
    BillsConfig {
        common: CoreConfig { port: 0 }, // Random port
        service_name: "bills-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            // Unused: the app is built over MemoryLedger.
            url: String::new(),
            max_connections: 5,
            min_connections: 1,
        },
        reconcile: ReconcileConfig { max_range_days: 400 },
    }
}

/// A running bills-service instance plus handles to seed and inspect its
/// in-memory store.
pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub client: reqwest::Client,
    pub user_id: Uuid,
    pub store: Arc<MemoryLedger>,
}

impl TestApp {
    pub async fn spawn() -> TestApp {
        init_tracing();

        let store = Arc::new(MemoryLedger::new());
        let app = Application::build_with_store(test_config(), store.clone())
            .await
            .expect("Failed to build test application");
        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept connections.
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            http_port,
            client,
            user_id: Uuid::new_v4(),
            store,
        }
    }

    /// GET `path` as the test user.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.http_address, path))
            .header("X-User-ID", self.user_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// POST a JSON body to `path` as the test user.
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.http_address, path))
            .header("X-User-ID", self.user_id.to_string())
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Seed a monthly bill owned by the test user and return its id.
    pub fn seed_monthly_bill(&self, name: &str, amount: Decimal, due_day: i32) -> Uuid {
        let bill = monthly_bill(self.user_id, name, amount, due_day);
        let bill_id = bill.bill_id;
        self.store.insert_bill(bill);
        bill_id
    }

    /// Seed a settled transaction on the test user's account and return its id.
    pub fn seed_transaction(
        &self,
        transaction_date: NaiveDate,
        amount: Decimal,
        description: &str,
    ) -> Uuid {
        let txn = transaction(self.user_id, transaction_date, amount, description);
        let txn_id = txn.transaction_id;
        self.store.insert_transaction(txn);
        txn_id
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

pub fn monthly_bill(user_id: Uuid, name: &str, amount: Decimal, due_day: i32) -> RecurringBill {
    bill_with_frequency(user_id, name, "monthly", amount, due_day)
}

pub fn bill_with_frequency(
    user_id: Uuid,
    name: &str,
    frequency: &str,
    amount: Decimal,
    due_day: i32,
) -> RecurringBill {
    RecurringBill {
        bill_id: Uuid::new_v4(),
        user_id,
        name: name.to_string(),
        amount,
        frequency: frequency.to_string(),
        due_day,
        start_date: None,
        end_date: None,
        is_active: true,
        created_utc: Utc::now(),
        updated_utc: Utc::now(),
    }
}

pub fn transaction(
    user_id: Uuid,
    transaction_date: NaiveDate,
    amount: Decimal,
    description: &str,
) -> Transaction {
    Transaction {
        transaction_id: Uuid::new_v4(),
        user_id,
        account_id: Uuid::new_v4(),
        transaction_date,
        description: description.to_string(),
        merchant: None,
        amount,
        bill_id: None,
        is_pending: false,
        created_utc: Utc::now(),
    }
}

/// Encoded occurrence id for a bill due on the given date.
pub fn occurrence_id(bill_id: Uuid, due_date: NaiveDate) -> String {
    format!("{}-{}", bill_id, due_date.format("%Y-%m-%d"))
}
