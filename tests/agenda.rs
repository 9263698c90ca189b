//! Agenda slot integration tests.

mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use serde_json::json;
use serial_test::serial;

fn future_slot(days: i64) -> String {
    (Utc::now().naive_utc() + Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

#[tokio::test]
#[serial]
async fn psychologist_publishes_slot() {
    let app = TestApp::spawn().await;
    let psychologist = app.register_psychologist().await;

    let response = app
        .post(
            "/agenda/slots",
            &psychologist.access_token,
            json!({ "starts_at": future_slot(1) }),
        )
        .await;

    assert_status!(response, 201);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert!(body["patient_id"].is_null());
}

#[tokio::test]
#[serial]
async fn duplicate_slot_time_returns_409() {
    let app = TestApp::spawn().await;
    let psychologist = app.register_psychologist().await;
    let starts_at = future_slot(2);

    let first = app
        .post(
            "/agenda/slots",
            &psychologist.access_token,
            json!({ "starts_at": starts_at }),
        )
        .await;
    assert_status!(first, 201);

    let second = app
        .post(
            "/agenda/slots",
            &psychologist.access_token,
            json!({ "starts_at": starts_at }),
        )
        .await;
    assert_status!(second, 409);

    let body: serde_json::Value = second.json().await.expect("Failed to parse response");
    assert_eq!(
        body["detail"].as_str().unwrap(),
        "Já existe um horário nesse momento."
    );
}

#[tokio::test]
#[serial]
async fn two_psychologists_can_share_a_time() {
    let app = TestApp::spawn().await;
    let first = app.register_psychologist().await;
    let second = app.register_psychologist().await;
    let starts_at = future_slot(3);

    let resp_a = app
        .post(
            "/agenda/slots",
            &first.access_token,
            json!({ "starts_at": starts_at }),
        )
        .await;
    assert_status!(resp_a, 201);

    let resp_b = app
        .post(
            "/agenda/slots",
            &second.access_token,
            json!({ "starts_at": starts_at }),
        )
        .await;
    assert_status!(resp_b, 201);
}

#[tokio::test]
#[serial]
async fn patient_cannot_publish_slots() {
    let app = TestApp::spawn().await;
    let patient = app.register_patient().await;

    let response = app
        .post(
            "/agenda/slots",
            &patient.access_token,
            json!({ "starts_at": future_slot(1) }),
        )
        .await;

    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn patient_sees_only_free_future_slots_in_order() {
    let app = TestApp::spawn().await;
    let psychologist = app.register_psychologist().await;
    let patient = app.linked_patient(&psychologist).await;

    // Publish out of order; the later one gets reserved.
    let late = app
        .post(
            "/agenda/slots",
            &psychologist.access_token,
            json!({ "starts_at": future_slot(5) }),
        )
        .await;
    assert_status!(late, 201);
    let late_body: serde_json::Value = late.json().await.expect("Failed to parse response");

    let early = app
        .post(
            "/agenda/slots",
            &psychologist.access_token,
            json!({ "starts_at": future_slot(4) }),
        )
        .await;
    assert_status!(early, 201);

    let reserve = app
        .put_empty(
            &format!("/agenda/slots/{}/reserve", late_body["id"].as_str().unwrap()),
            &patient.access_token,
        )
        .await;
    assert_status!(reserve, 200);

    let listing = app
        .get(
            &format!("/agenda/psychologist/{}", psychologist.id),
            &patient.access_token,
        )
        .await;
    assert_status!(listing, 200);

    let slots: serde_json::Value = listing.json().await.expect("Failed to parse response");
    let slots = slots.as_array().expect("Slots should be an array");
    assert_eq!(slots.len(), 1, "Reserved slot should be hidden");

    // The owner still sees both.
    let own_listing = app
        .get(
            &format!("/agenda/psychologist/{}", psychologist.id),
            &psychologist.access_token,
        )
        .await;
    assert_status!(own_listing, 200);
    let own: serde_json::Value = own_listing.json().await.expect("Failed to parse response");
    let own = own.as_array().expect("Slots should be an array");
    assert_eq!(own.len(), 2);
    assert!(own[0]["starts_at"].as_str().unwrap() < own[1]["starts_at"].as_str().unwrap());
}

#[tokio::test]
#[serial]
async fn free_slot_listing_is_idempotent() {
    let app = TestApp::spawn().await;
    let psychologist = app.register_psychologist().await;
    let patient = app.register_patient().await;

    for days in [11, 12] {
        let response = app
            .post(
                "/agenda/slots",
                &psychologist.access_token,
                json!({ "starts_at": future_slot(days) }),
            )
            .await;
        assert_status!(response, 201);
    }

    let first = app
        .get(
            &format!("/agenda/psychologist/{}", psychologist.id),
            &patient.access_token,
        )
        .await;
    assert_status!(first, 200);
    let first: serde_json::Value = first.json().await.expect("Failed to parse response");

    let second = app
        .get(
            &format!("/agenda/psychologist/{}", psychologist.id),
            &patient.access_token,
        )
        .await;
    assert_status!(second, 200);
    let second: serde_json::Value = second.json().await.expect("Failed to parse response");

    assert_eq!(first.as_array().unwrap().len(), 2);
    assert_eq!(first, second, "Repeated reads must not change the listing");
}

#[tokio::test]
#[serial]
async fn reserve_assigns_the_calling_patient() {
    let app = TestApp::spawn().await;
    let psychologist = app.register_psychologist().await;
    let patient = app.linked_patient(&psychologist).await;

    let slot = app
        .post(
            "/agenda/slots",
            &psychologist.access_token,
            json!({ "starts_at": future_slot(6) }),
        )
        .await;
    let slot: serde_json::Value = slot.json().await.expect("Failed to parse response");

    let response = app
        .put_empty(
            &format!("/agenda/slots/{}/reserve", slot["id"].as_str().unwrap()),
            &patient.access_token,
        )
        .await;

    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(
        body["patient_id"].as_str().unwrap(),
        patient.id.to_string()
    );
}

#[tokio::test]
#[serial]
async fn reserving_a_taken_slot_returns_409() {
    let app = TestApp::spawn().await;
    let psychologist = app.register_psychologist().await;
    let first = app.linked_patient(&psychologist).await;
    let second = app.register_patient().await;

    let slot = app
        .post(
            "/agenda/slots",
            &psychologist.access_token,
            json!({ "starts_at": future_slot(7) }),
        )
        .await;
    let slot: serde_json::Value = slot.json().await.expect("Failed to parse response");
    let slot_id = slot["id"].as_str().unwrap();

    let taken = app
        .put_empty(
            &format!("/agenda/slots/{}/reserve", slot_id),
            &first.access_token,
        )
        .await;
    assert_status!(taken, 200);

    let response = app
        .put_empty(
            &format!("/agenda/slots/{}/reserve", slot_id),
            &second.access_token,
        )
        .await;
    assert_status!(response, 409);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(
        body["detail"].as_str().unwrap(),
        "Horário não está mais disponível."
    );
}

#[tokio::test]
#[serial]
async fn concurrent_reservations_book_exactly_one_patient() {
    let app = TestApp::spawn().await;
    let psychologist = app.register_psychologist().await;
    let first = app.register_patient().await;
    let second = app.register_patient().await;

    let slot = app
        .post(
            "/agenda/slots",
            &psychologist.access_token,
            json!({ "starts_at": future_slot(8) }),
        )
        .await;
    let slot: serde_json::Value = slot.json().await.expect("Failed to parse response");
    let slot_id = slot["id"].as_str().unwrap().to_string();

    let path_a = format!("/agenda/slots/{}/reserve", slot_id);
    let path_b = format!("/agenda/slots/{}/reserve", slot_id);
    let req_a = app.put_empty(&path_a, &first.access_token);
    let req_b = app.put_empty(&path_b, &second.access_token);

    let (resp_a, resp_b) = tokio::join!(req_a, req_b);

    let statuses = [resp_a.status().as_u16(), resp_b.status().as_u16()];
    assert_eq!(
        statuses.iter().filter(|&&s| s == 200).count(),
        1,
        "Exactly one reservation should win, got {:?}",
        statuses
    );
}

#[tokio::test]
#[serial]
async fn reserving_unknown_slot_returns_404() {
    let app = TestApp::spawn().await;
    let psychologist = app.register_psychologist().await;
    let patient = app.linked_patient(&psychologist).await;

    let response = app
        .put_empty(
            &format!("/agenda/slots/{}/reserve", uuid::Uuid::new_v4()),
            &patient.access_token,
        )
        .await;

    assert_status!(response, 404);
}

#[tokio::test]
#[serial]
async fn psychologist_deletes_own_slot() {
    let app = TestApp::spawn().await;
    let psychologist = app.register_psychologist().await;

    let slot = app
        .post(
            "/agenda/slots",
            &psychologist.access_token,
            json!({ "starts_at": future_slot(9) }),
        )
        .await;
    let slot: serde_json::Value = slot.json().await.expect("Failed to parse response");

    let response = app
        .delete(
            &format!("/agenda/slots/{}", slot["id"].as_str().unwrap()),
            &psychologist.access_token,
        )
        .await;

    assert_status!(response, 204);
}

#[tokio::test]
#[serial]
async fn psychologist_cannot_delete_anothers_slot() {
    let app = TestApp::spawn().await;
    let owner = app.register_psychologist().await;
    let other = app.register_psychologist().await;

    let slot = app
        .post(
            "/agenda/slots",
            &owner.access_token,
            json!({ "starts_at": future_slot(10) }),
        )
        .await;
    let slot: serde_json::Value = slot.json().await.expect("Failed to parse response");

    let response = app
        .delete(
            &format!("/agenda/slots/{}", slot["id"].as_str().unwrap()),
            &other.access_token,
        )
        .await;

    assert_status!(response, 404);
}
