//! Transaction-to-occurrence matching.
//!
//! `score` holds the signal bands and the tunable constants a test suite
//! pins down; `matcher` runs the greedy assignment over one reconciliation
//! pass. Both are pure: storage writes for auto-applied matches happen in
//! `services::reconcile`.

mod matcher;
mod score;

pub use matcher::{match_transactions, ConfidenceTier, MatchDecision, MatchOutcome};
pub use score::{
    score_candidate, SignalScore, AUTO_APPLY_THRESHOLD, REVIEW_THRESHOLD,
};
