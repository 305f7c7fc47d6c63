//! Occurrence listing and lifecycle integration tests.

mod common;

use bills_service::services::LedgerStore;
use chrono::{Duration, NaiveDate, Utc};
use common::{date, monthly_bill, occurrence_id, TestApp};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn listing_expands_bills_in_due_date_order() {
    let app = TestApp::spawn().await;
    let energy = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let water = app.seed_monthly_bill("Water Co", Decimal::new(3250, 2), 1);

    let response = app
        .get("/api/occurrences?start=2024-06-01&end=2024-07-31")
        .await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let items = body.as_array().expect("expected an array");
    assert_eq!(items.len(), 4);

    let ids: Vec<&str> = items.iter().map(|i| i["id"].as_str().unwrap()).collect();
    assert_eq!(
        ids,
        vec![
            occurrence_id(water, date(2024, 6, 1)),
            occurrence_id(energy, date(2024, 6, 15)),
            occurrence_id(water, date(2024, 7, 1)),
            occurrence_id(energy, date(2024, 7, 15)),
        ]
    );
    assert_eq!(items[1]["bill_name"], "Acme Energy");
    assert_eq!(items[1]["expected_amount"], "50.00");
    assert_eq!(items[0]["expected_amount"], "32.50");
}

#[tokio::test]
async fn listing_classifies_past_and_future_occurrences() {
    let app = TestApp::spawn().await;
    app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);

    let today = Utc::now().date_naive();
    let start = today - Duration::days(40);
    let end = today + Duration::days(40);
    let response = app
        .get(&format!("/api/occurrences?start={}&end={}", start, end))
        .await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let items = body.as_array().expect("expected an array");
    assert!(!items.is_empty());

    let mut saw_overdue = false;
    let mut saw_due = false;
    for item in items {
        let due_date: NaiveDate = item["due_date"].as_str().unwrap().parse().unwrap();
        // Skip the boundary day; the server may observe a later "today"
        // than the test did.
        if due_date < today {
            assert_eq!(item["status"], "overdue");
            saw_overdue = true;
        } else if due_date > today {
            assert_eq!(item["status"], "due");
            saw_due = true;
        }
    }
    assert!(saw_overdue);
    assert!(saw_due);
}

#[tokio::test]
async fn paying_is_reflected_in_the_next_listing() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    // Prime the view cache, then write through the pay endpoint.
    let first = app
        .get("/api/occurrences?start=2024-06-01&end=2024-06-30")
        .await;
    assert!(first.status().is_success());

    let paid = app
        .post_json(&format!("/api/occurrences/{}/pay", id), &json!({}))
        .await;
    assert!(paid.status().is_success());

    let second = app
        .get("/api/occurrences?start=2024-06-01&end=2024-06-30")
        .await;
    let body: serde_json::Value = second.json().await.expect("Failed to parse JSON");
    let items = body.as_array().expect("expected an array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["status"], "paid");
}

#[tokio::test]
async fn listing_rejects_inverted_range() {
    let app = TestApp::spawn().await;

    let response = app
        .get("/api/occurrences?start=2024-07-01&end=2024-06-01")
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert!(body["error"].as_str().unwrap().contains("before start"));
}

#[tokio::test]
async fn listing_rejects_oversized_range() {
    let app = TestApp::spawn().await;

    let response = app
        .get("/api/occurrences?start=2024-01-01&end=2026-01-01")
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert!(body["error"].as_str().unwrap().contains("day maximum"));
}

#[tokio::test]
async fn listing_fails_closed_when_storage_is_unavailable() {
    let app = TestApp::spawn().await;
    app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    app.store.set_fail_reads(true);

    let response = app
        .get("/api/occurrences?start=2024-06-01&end=2024-06-30")
        .await;
    assert_eq!(response.status().as_u16(), 500);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["error"], "Database error");
}

#[tokio::test]
async fn requests_without_user_header_are_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!(
            "{}/api/occurrences?start=2024-06-01&end=2024-06-30",
            app.http_address
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn requests_with_malformed_user_header_are_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!(
            "{}/api/occurrences?start=2024-06-01&end=2024-06-30",
            app.http_address
        ))
        .header("X-User-ID", "not-a-uuid")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn resolving_an_occurrence_by_id_works() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let response = app.get(&format!("/api/occurrences/{}", id)).await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["bill_id"], bill_id.to_string().as_str());
    assert_eq!(body["bill_name"], "Acme Energy");
    assert_eq!(body["due_date"], "2024-06-15");
    assert_eq!(body["status"], "overdue");
    assert!(body["paid_transaction_id"].is_null());
}

#[tokio::test]
async fn resolving_with_malformed_id_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/occurrences/not-an-occurrence-id").await;
    assert_eq!(response.status().as_u16(), 400);

    // Unpadded date suffixes are not the canonical encoding.
    let uuid = Uuid::new_v4();
    let response = app.get(&format!("/api/occurrences/{}-2024-6-15", uuid)).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn resolving_unknown_bill_returns_not_found() {
    let app = TestApp::spawn().await;

    let id = occurrence_id(Uuid::new_v4(), date(2024, 6, 15));
    let response = app.get(&format!("/api/occurrences/{}", id)).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn occurrences_of_other_users_are_invisible() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let response = app
        .client
        .get(format!("{}/api/occurrences/{}", app.http_address, id))
        .header("X-User-ID", Uuid::new_v4().to_string())
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn inactive_bills_resolve_but_do_not_list() {
    let app = TestApp::spawn().await;
    let mut bill = monthly_bill(app.user_id, "Old Gym", Decimal::new(2999, 2), 10);
    bill.is_active = false;
    let bill_id = bill.bill_id;
    app.store.insert_bill(bill);

    let listing = app
        .get("/api/occurrences?start=2024-06-01&end=2024-06-30")
        .await;
    let body: serde_json::Value = listing.json().await.expect("Failed to parse JSON");
    assert_eq!(body.as_array().expect("expected an array").len(), 0);

    let id = occurrence_id(bill_id, date(2024, 6, 10));
    let response = app.get(&format!("/api/occurrences/{}", id)).await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["bill_name"], "Old Gym");
}

#[tokio::test]
async fn paying_an_occurrence_records_a_paid_override() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let response = app
        .post_json(&format!("/api/occurrences/{}/pay", id), &json!({}))
        .await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "paid");
    assert!(body["paid_at"].is_string());
    assert!(body["paid_transaction_id"].is_null());
    assert!(body["match_confidence"].is_null());
}

#[tokio::test]
async fn paying_with_a_transaction_links_it() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let txn_id = app.seed_transaction(date(2024, 6, 16), Decimal::new(-5000, 2), "ACME ENERGY DD");
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let response = app
        .post_json(
            &format!("/api/occurrences/{}/pay", id),
            &json!({ "transaction_id": txn_id }),
        )
        .await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "paid");
    assert_eq!(body["paid_transaction_id"], txn_id.to_string().as_str());

    // The transaction now carries the bill link.
    let txn = app
        .store
        .fetch_transaction(app.user_id, txn_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(txn.bill_id, Some(bill_id));
}

#[tokio::test]
async fn paying_with_unknown_transaction_returns_not_found() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let response = app
        .post_json(
            &format!("/api/occurrences/{}/pay", id),
            &json!({ "transaction_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn repaying_keeps_the_existing_link_and_timestamp() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let txn_id = app.seed_transaction(date(2024, 6, 16), Decimal::new(-5000, 2), "ACME ENERGY DD");
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let first = app
        .post_json(
            &format!("/api/occurrences/{}/pay", id),
            &json!({ "transaction_id": txn_id }),
        )
        .await;
    let first_body: serde_json::Value = first.json().await.expect("Failed to parse JSON");

    let second = app
        .post_json(&format!("/api/occurrences/{}/pay", id), &json!({}))
        .await;
    assert!(second.status().is_success());

    let second_body: serde_json::Value = second.json().await.expect("Failed to parse JSON");
    assert_eq!(second_body["status"], "paid");
    assert_eq!(second_body["paid_transaction_id"], first_body["paid_transaction_id"]);
    assert_eq!(second_body["paid_at"], first_body["paid_at"]);
}

#[tokio::test]
async fn paying_a_skipped_occurrence_conflicts() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let skipped = app
        .post_json(&format!("/api/occurrences/{}/skip", id), &json!({}))
        .await;
    assert!(skipped.status().is_success());

    let response = app
        .post_json(&format!("/api/occurrences/{}/pay", id), &json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 409);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert!(body["error"].as_str().unwrap().contains("reset"));
}

#[tokio::test]
async fn skipping_a_paid_occurrence_conflicts() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let paid = app
        .post_json(&format!("/api/occurrences/{}/pay", id), &json!({}))
        .await;
    assert!(paid.status().is_success());

    let response = app
        .post_json(&format!("/api/occurrences/{}/skip", id), &json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn skipping_twice_is_idempotent() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    for _ in 0..2 {
        let response = app
            .post_json(&format!("/api/occurrences/{}/skip", id), &json!({}))
            .await;
        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "skipped");
    }
}

#[tokio::test]
async fn resetting_clears_override_and_transaction_link() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let txn_id = app.seed_transaction(date(2024, 6, 16), Decimal::new(-5000, 2), "ACME ENERGY DD");
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let paid = app
        .post_json(
            &format!("/api/occurrences/{}/pay", id),
            &json!({ "transaction_id": txn_id }),
        )
        .await;
    assert!(paid.status().is_success());

    let response = app
        .post_json(&format!("/api/occurrences/{}/reset", id), &json!({}))
        .await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "overdue");
    assert!(body["paid_transaction_id"].is_null());

    let txn = app
        .store
        .fetch_transaction(app.user_id, txn_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(txn.bill_id, None);
}

#[tokio::test]
async fn resetting_without_an_override_is_a_no_op() {
    let app = TestApp::spawn().await;
    let bill_id = app.seed_monthly_bill("Acme Energy", Decimal::new(5000, 2), 15);
    let id = occurrence_id(bill_id, date(2024, 6, 15));

    let response = app
        .post_json(&format!("/api/occurrences/{}/reset", id), &json!({}))
        .await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "overdue");
}
