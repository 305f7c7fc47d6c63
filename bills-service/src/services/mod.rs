//! Services module for bills-service.

pub mod database;
pub mod metrics;
pub mod reconcile;
pub mod store;
pub mod views;

pub use database::Database;
pub use metrics::{
    get_metrics, init_metrics, record_error, record_occurrences_generated,
    record_reconcile_operation, record_transaction_match, record_view_cache,
};
pub use reconcile::{ReconcilePass, Reconciler};
pub use store::{LedgerStore, MemoryLedger};
pub use views::ViewCache;
