//! Recurring bill occurrence scheduling and transaction reconciliation.
//!
//! The pure cores live in [`schedule`] (expand recurring bills into dated
//! occurrences, merge persisted status overrides) and [`matching`] (score
//! and greedily assign bank transactions to open occurrences). The
//! [`services::Reconciler`] coordinates them against a [`services::LedgerStore`]
//! and everything above that is HTTP plumbing.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod matching;
pub mod middleware;
pub mod models;
pub mod schedule;
pub mod services;
pub mod startup;

pub use startup::AppState;
