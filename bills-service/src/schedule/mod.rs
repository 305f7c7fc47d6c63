//! Pure scheduling core: occurrence generation and override merging.
//!
//! Nothing in this module performs I/O. The coordinator in
//! `services::reconcile` feeds it rows fetched from storage and writes the
//! results back; the functions here are safe to call concurrently.

mod generator;
mod merge;

pub use generator::{expand_bill, generate, ScheduleError};
pub use merge::{classify_open, merge_occurrences, merge_single};
