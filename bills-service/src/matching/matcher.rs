//! Greedy assignment of candidate transactions to open occurrences.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MergedOccurrence, OccurrenceId, Transaction};

use super::score::{score_candidate, SignalScore, AUTO_APPLY_THRESHOLD, REVIEW_THRESHOLD};

/// Confidence tier of a retained candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Review,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Review => "review",
        }
    }
}

/// One retained (occurrence, transaction) pairing. Ephemeral: either
/// promoted to an override by the coordinator or surfaced for a human.
#[derive(Debug, Clone)]
pub struct MatchDecision {
    pub occurrence_id: OccurrenceId,
    pub transaction_id: Uuid,
    pub score: u32,
    pub tier: ConfidenceTier,
    pub reasons: Vec<String>,
}

/// Output of one matching pass, split by tier.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub auto_apply: Vec<MatchDecision>,
    pub for_review: Vec<MatchDecision>,
}

/// Run one matching pass.
///
/// Occurrences are processed in due-date order (ties by bill id) and each
/// consumes at most one transaction: once a transaction is retained for an
/// occurrence, later occurrences no longer see it. Transactions that are
/// pending, already carry a bill link, or appear in `already_linked` are
/// never candidates, so an existing link is kept even when a better-scoring
/// transaction shows up.
pub fn match_transactions(
    occurrences: &[MergedOccurrence],
    transactions: &[Transaction],
    already_linked: &HashSet<Uuid>,
) -> MatchOutcome {
    let mut ordered: Vec<&MergedOccurrence> =
        occurrences.iter().filter(|o| o.status.is_open()).collect();
    ordered.sort_by(|a, b| {
        a.id.due_date
            .cmp(&b.id.due_date)
            .then_with(|| a.id.bill_id.cmp(&b.id.bill_id))
    });

    let mut consumed: HashSet<Uuid> = HashSet::new();
    let mut outcome = MatchOutcome::default();

    for occurrence in ordered {
        let mut best: Option<(SignalScore, &Transaction)> = None;
        for txn in transactions {
            if txn.is_pending
                || txn.bill_id.is_some()
                || already_linked.contains(&txn.transaction_id)
                || consumed.contains(&txn.transaction_id)
            {
                continue;
            }
            let score = score_candidate(occurrence, txn);
            if score.points < REVIEW_THRESHOLD {
                continue;
            }
            let replace = match &best {
                None => true,
                Some((best_score, best_txn)) => {
                    prefer(occurrence, &score, txn, best_score, best_txn) == Ordering::Greater
                }
            };
            if replace {
                best = Some((score, txn));
            }
        }

        if let Some((score, txn)) = best {
            consumed.insert(txn.transaction_id);
            let tier = if score.points >= AUTO_APPLY_THRESHOLD {
                ConfidenceTier::High
            } else {
                ConfidenceTier::Review
            };
            let decision = MatchDecision {
                occurrence_id: occurrence.id,
                transaction_id: txn.transaction_id,
                score: score.points,
                tier,
                reasons: score.reasons,
            };
            match tier {
                ConfidenceTier::High => outcome.auto_apply.push(decision),
                ConfidenceTier::Review => outcome.for_review.push(decision),
            }
        }
    }

    outcome
}

/// Rank candidate `a` against the best so far: score first, then smaller
/// date distance, then transaction id, so the pass is deterministic for
/// identical inputs.
fn prefer(
    occurrence: &MergedOccurrence,
    a_score: &SignalScore,
    a_txn: &Transaction,
    b_score: &SignalScore,
    b_txn: &Transaction,
) -> Ordering {
    let due = occurrence.id.due_date;
    let a_distance = (a_txn.transaction_date - due).num_days().abs();
    let b_distance = (b_txn.transaction_date - due).num_days().abs();
    a_score
        .points
        .cmp(&b_score.points)
        .then_with(|| b_distance.cmp(&a_distance))
        .then_with(|| b_txn.transaction_id.cmp(&a_txn.transaction_id))
}
