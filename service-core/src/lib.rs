//! service-core: Shared infrastructure for the bills platform services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
