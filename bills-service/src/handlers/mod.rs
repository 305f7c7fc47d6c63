//! HTTP handlers for bills-service.

pub mod occurrences;
pub mod reconcile;
