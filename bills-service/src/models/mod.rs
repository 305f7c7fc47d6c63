//! Domain models for bills-service.

mod bill;
mod occurrence;
mod transaction;

pub use bill::{BillFrequency, RecurringBill};
pub use occurrence::{
    MergedOccurrence, Occurrence, OccurrenceId, OccurrenceOverride, OccurrenceStatus,
    OverrideStatus, ParseOccurrenceIdError,
};
pub use transaction::Transaction;
