//! Match signals and scoring constants.

use rust_decimal::Decimal;

use crate::models::{MergedOccurrence, Transaction};

/// Total score at or above which a match is applied without review.
pub const AUTO_APPLY_THRESHOLD: u32 = 85;
/// Total score at or above which a match is surfaced for review. Below
/// this no candidate is emitted at all.
pub const REVIEW_THRESHOLD: u32 = 45;

pub const AMOUNT_EXACT_POINTS: u32 = 40;
pub const AMOUNT_CLOSE_POINTS: u32 = 25;
pub const AMOUNT_NEAR_POINTS: u32 = 10;
pub const DATE_EXACT_POINTS: u32 = 30;
pub const DATE_ADJACENT_POINTS: u32 = 22;
pub const DATE_NEARBY_POINTS: u32 = 10;
pub const NAME_SUBSTRING_POINTS: u32 = 30;
pub const NAME_TOKEN_POINTS: u32 = 15;

/// Rounding slack for an "exact" amount match: 0.01.
const AMOUNT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
/// Close band: within 1.00 of the expected amount.
const AMOUNT_CLOSE_TOLERANCE: Decimal = Decimal::from_parts(100, 0, 0, false, 2);
/// Near band: within 5.00 of the expected amount.
const AMOUNT_NEAR_TOLERANCE: Decimal = Decimal::from_parts(500, 0, 0, false, 2);

const DATE_ADJACENT_DAYS: i64 = 1;
const DATE_NEARBY_DAYS: i64 = 7;

/// Tokens shorter than this carry no signal ("of", "DD", card suffixes).
const MIN_TOKEN_LEN: usize = 3;

/// Score plus the human-readable trail that justifies it in a review queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalScore {
    pub points: u32,
    pub reasons: Vec<String>,
}

impl SignalScore {
    fn add(&mut self, points: u32, reason: &str) {
        self.points += points;
        self.reasons.push(reason.to_string());
    }
}

/// Score one (occurrence, transaction) pair.
///
/// Signals are additive and independent, so a transaction missing one
/// signal degrades instead of zeroing out. Each signal contributes its
/// single best band.
pub fn score_candidate(occurrence: &MergedOccurrence, txn: &Transaction) -> SignalScore {
    let mut score = SignalScore::default();

    // Bank feeds record outflows as negatives; compare magnitudes.
    let amount_delta = (txn.amount.abs() - occurrence.expected_amount.abs()).abs();
    if amount_delta <= AMOUNT_EPSILON {
        score.add(AMOUNT_EXACT_POINTS, "amount matches exactly");
    } else if amount_delta <= AMOUNT_CLOSE_TOLERANCE {
        score.add(AMOUNT_CLOSE_POINTS, "amount within 1.00");
    } else if amount_delta <= AMOUNT_NEAR_TOLERANCE {
        score.add(AMOUNT_NEAR_POINTS, "amount within 5.00");
    }

    let day_delta = (txn.transaction_date - occurrence.id.due_date).num_days().abs();
    if day_delta == 0 {
        score.add(DATE_EXACT_POINTS, "transaction on the due date");
    } else if day_delta <= DATE_ADJACENT_DAYS {
        score.add(DATE_ADJACENT_POINTS, "transaction within 1 day of due date");
    } else if day_delta <= DATE_NEARBY_DAYS {
        score.add(DATE_NEARBY_POINTS, "transaction within 7 days of due date");
    }

    let name = normalize(&occurrence.bill_name);
    let text = match &txn.merchant {
        Some(merchant) => normalize(&format!("{} {}", txn.description, merchant)),
        None => normalize(&txn.description),
    };
    if !name.is_empty() && !text.is_empty() {
        if text.contains(&name) || name.contains(&text) {
            score.add(NAME_SUBSTRING_POINTS, "bill name appears in description");
        } else if shares_token(&name, &text) {
            score.add(NAME_TOKEN_POINTS, "bill name shares a word with description");
        }
    }

    score
}

/// Lowercase with runs of whitespace collapsed to single spaces, so that
/// "ACME  Energy" and "acme energy" compare equal.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn shares_token(name: &str, text: &str) -> bool {
    name.split_whitespace()
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .any(|token| text.split_whitespace().any(|other| other == token))
}
