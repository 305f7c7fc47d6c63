//! Merge computed occurrences with persisted status overrides.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{
    MergedOccurrence, Occurrence, OccurrenceId, OccurrenceOverride, OccurrenceStatus,
};

/// Layer override rows onto the computed schedule and classify what is left
/// open against `today`.
///
/// Pure and deterministic: the same inputs always produce the same output,
/// which is what lets sync jobs re-run a merge idempotently. Output order
/// follows `computed`. Override rows with no computed counterpart are
/// ignored here (they stay reachable through resolve-by-id); rows whose
/// status column does not parse are treated as absent, and the coordinator
/// is expected to have logged them as data errors before calling in.
pub fn merge_occurrences(
    computed: &[Occurrence],
    overrides: &[OccurrenceOverride],
    today: NaiveDate,
) -> Vec<MergedOccurrence> {
    let by_key: HashMap<OccurrenceId, &OccurrenceOverride> =
        overrides.iter().map(|row| (row.key(), row)).collect();
    computed
        .iter()
        .map(|occurrence| merge_single(occurrence, by_key.get(&occurrence.id()).copied(), today))
        .collect()
}

/// Merge one occurrence with its override-if-present.
///
/// An override's status, transaction link, paid timestamp, and confidence
/// are adopted verbatim; without one the occurrence is classified due or
/// overdue from the calendar alone.
pub fn merge_single(
    occurrence: &Occurrence,
    override_row: Option<&OccurrenceOverride>,
    today: NaiveDate,
) -> MergedOccurrence {
    let parsed = override_row.and_then(|row| row.status().map(|status| (row, status)));
    match parsed {
        Some((row, status)) => MergedOccurrence {
            id: occurrence.id(),
            bill_name: occurrence.bill_name.clone(),
            expected_amount: occurrence.expected_amount,
            status: status.into(),
            paid_transaction_id: row.paid_transaction_id,
            paid_at: row.paid_at,
            match_confidence: row.match_confidence,
        },
        None => MergedOccurrence {
            id: occurrence.id(),
            bill_name: occurrence.bill_name.clone(),
            expected_amount: occurrence.expected_amount,
            status: classify_open(occurrence.due_date, today),
            paid_transaction_id: None,
            paid_at: None,
            match_confidence: None,
        },
    }
}

/// Date-only classification of an occurrence with no override: overdue
/// strictly after the due date passes, still due on the due date itself.
pub fn classify_open(due_date: NaiveDate, today: NaiveDate) -> OccurrenceStatus {
    if due_date < today {
        OccurrenceStatus::Overdue
    } else {
        OccurrenceStatus::Due
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn occurrence(bill_id: Uuid, due: NaiveDate) -> Occurrence {
        Occurrence {
            bill_id,
            bill_name: "Water".to_string(),
            due_date: due,
            expected_amount: Decimal::new(3250, 2),
        }
    }

    fn paid_override(bill_id: Uuid, due: NaiveDate) -> OccurrenceOverride {
        OccurrenceOverride {
            user_id: Uuid::new_v4(),
            bill_id,
            due_date: due,
            status: "paid".to_string(),
            paid_transaction_id: Some(Uuid::new_v4()),
            paid_at: Some(Utc::now()),
            match_confidence: Some(92.0),
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn open_occurrences_classify_by_date() {
        let today = date(2025, 3, 10);
        assert_eq!(classify_open(date(2025, 3, 9), today), OccurrenceStatus::Overdue);
        assert_eq!(classify_open(date(2025, 3, 10), today), OccurrenceStatus::Due);
        assert_eq!(classify_open(date(2025, 3, 11), today), OccurrenceStatus::Due);
    }

    #[test]
    fn override_is_adopted_verbatim() {
        let bill_id = Uuid::new_v4();
        let due = date(2025, 3, 1);
        let row = paid_override(bill_id, due);
        let merged = merge_occurrences(&[occurrence(bill_id, due)], &[row.clone()], date(2025, 3, 10));

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, OccurrenceStatus::Paid);
        assert_eq!(merged[0].paid_transaction_id, row.paid_transaction_id);
        assert_eq!(merged[0].paid_at, row.paid_at);
        assert_eq!(merged[0].match_confidence, row.match_confidence);
    }

    #[test]
    fn override_for_other_occurrence_does_not_leak() {
        let bill_id = Uuid::new_v4();
        let row = paid_override(bill_id, date(2025, 2, 1));
        let merged =
            merge_occurrences(&[occurrence(bill_id, date(2025, 3, 1))], &[row], date(2025, 3, 10));
        assert_eq!(merged[0].status, OccurrenceStatus::Overdue);
        assert_eq!(merged[0].paid_transaction_id, None);
    }

    #[test]
    fn unparsable_override_status_falls_back_to_calendar() {
        let bill_id = Uuid::new_v4();
        let due = date(2025, 3, 20);
        let mut row = paid_override(bill_id, due);
        row.status = "settled".to_string();
        let merged = merge_occurrences(&[occurrence(bill_id, due)], &[row], date(2025, 3, 10));
        assert_eq!(merged[0].status, OccurrenceStatus::Due);
    }

    #[test]
    fn merge_is_idempotent() {
        let bill_id = Uuid::new_v4();
        let computed = vec![
            occurrence(bill_id, date(2025, 3, 1)),
            occurrence(bill_id, date(2025, 4, 1)),
        ];
        let overrides = vec![paid_override(bill_id, date(2025, 3, 1))];
        let today = date(2025, 3, 10);

        let first = merge_occurrences(&computed, &overrides, today);
        let second = merge_occurrences(&computed, &overrides, today);
        assert_eq!(first, second);
    }

    #[test]
    fn merge_preserves_computed_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let computed = vec![
            occurrence(a, date(2025, 3, 1)),
            occurrence(b, date(2025, 3, 5)),
            occurrence(a, date(2025, 4, 1)),
        ];
        let merged = merge_occurrences(&computed, &[], date(2025, 3, 10));
        let ids: Vec<OccurrenceId> = merged.iter().map(|m| m.id).collect();
        let expected: Vec<OccurrenceId> = computed.iter().map(|o| o.id()).collect();
        assert_eq!(ids, expected);
    }
}
