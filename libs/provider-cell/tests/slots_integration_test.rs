// libs/provider-cell/tests/slots_integration_test.rs
//
// Slot computation against a mocked store: schedule lookup, booked
// appointments, and unavailability periods.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use provider_cell::models::VisitType;
use provider_cell::services::slots::SlotCalculatorService;
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockStoreResponses, TestConfig};

struct TestSetup {
    calculator: SlotCalculatorService,
    mock_server: MockServer,
    provider_id: Uuid,
    office_id: Uuid,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;

        let mut config = TestConfig::default().to_app_config();
        config.supabase_url = mock_server.uri();

        let calculator = SlotCalculatorService::new(Arc::new(SupabaseClient::new(&config)));

        Self {
            calculator,
            mock_server,
            provider_id: Uuid::new_v4(),
            office_id: Uuid::new_v4(),
        }
    }

    /// A Monday at least a week out, so lead-time marking never fires.
    fn future_monday() -> NaiveDate {
        let mut date = Utc::now().date_naive() + Duration::days(7);
        while date.weekday() != Weekday::Mon {
            date += Duration::days(1);
        }
        date
    }

    async fn mock_schedule(&self, start: &str, end: &str, slot_minutes: i32) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/weekly_schedules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockStoreResponses::weekly_schedule_response(
                    &self.provider_id.to_string(),
                    &self.office_id.to_string(),
                    1,
                    start,
                    end,
                    slot_minutes,
                )
            ])))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_appointments(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_unavailability(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/unavailability_periods"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.mock_server)
            .await;
    }
}

#[tokio::test]
async fn open_monday_yields_the_full_slot_grid() {
    let setup = TestSetup::new().await;
    setup.mock_schedule("09:00:00", "12:00:00", 30).await;
    setup.mock_appointments(json!([])).await;
    setup.mock_unavailability(json!([])).await;

    let slots = setup
        .calculator
        .compute_available_slots(
            setup.provider_id,
            setup.office_id,
            TestSetup::future_monday(),
            VisitType::FollowUp,
            "test_token",
        )
        .await
        .unwrap();

    let starts: Vec<NaiveTime> = slots.iter().map(|s| s.start_time).collect();
    assert_eq!(
        starts,
        vec![
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        ]
    );
}

#[tokio::test]
async fn booked_appointment_blocks_only_overlapping_slots() {
    let setup = TestSetup::new().await;
    setup.mock_schedule("09:00:00", "12:00:00", 30).await;
    // One confirmed appointment 10:00-10:30.
    setup
        .mock_appointments(json!([
            { "start_time": "10:00:00", "end_time": "10:30:00" }
        ]))
        .await;
    setup.mock_unavailability(json!([])).await;

    let slots = setup
        .calculator
        .compute_available_slots(
            setup.provider_id,
            setup.office_id,
            TestSetup::future_monday(),
            VisitType::FollowUp,
            "test_token",
        )
        .await
        .unwrap();

    // The 09:30 slot ends exactly at 10:00; touching endpoints do not
    // conflict, so it survives.
    let starts: Vec<NaiveTime> = slots.iter().map(|s| s.start_time).collect();
    assert_eq!(
        starts,
        vec![
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        ]
    );
}

#[tokio::test]
async fn closed_day_returns_no_slots() {
    let setup = TestSetup::new().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_schedules"))
        .and(query_param("is_active", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&setup.mock_server)
        .await;

    let slots = setup
        .calculator
        .compute_available_slots(
            setup.provider_id,
            setup.office_id,
            TestSetup::future_monday(),
            VisitType::Routine,
            "test_token",
        )
        .await
        .unwrap();

    assert!(slots.is_empty());
}

#[tokio::test]
async fn unavailability_period_blots_out_its_window() {
    let setup = TestSetup::new().await;
    setup.mock_schedule("09:00:00", "12:00:00", 30).await;
    setup.mock_appointments(json!([])).await;

    let date = TestSetup::future_monday();
    let period_start = date.and_hms_opt(9, 0, 0).unwrap().and_utc();
    let period_end = date.and_hms_opt(10, 0, 0).unwrap().and_utc();
    // Office scope null: applies everywhere.
    setup
        .mock_unavailability(json!([{
            "id": Uuid::new_v4(),
            "provider_id": setup.provider_id,
            "office_id": null,
            "start_time": period_start.to_rfc3339(),
            "end_time": period_end.to_rfc3339(),
            "reason": "vacation",
            "created_at": Utc::now().to_rfc3339(),
        }]))
        .await;

    let slots = setup
        .calculator
        .compute_available_slots(
            setup.provider_id,
            setup.office_id,
            date,
            VisitType::FollowUp,
            "test_token",
        )
        .await
        .unwrap();

    let starts: Vec<NaiveTime> = slots.iter().map(|s| s.start_time).collect();
    assert_eq!(
        starts,
        vec![
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        ]
    );
}

#[tokio::test]
async fn office_scoped_unavailability_ignores_other_offices() {
    let setup = TestSetup::new().await;
    setup.mock_schedule("09:00:00", "12:00:00", 30).await;
    setup.mock_appointments(json!([])).await;

    let date = TestSetup::future_monday();
    let other_office = Uuid::new_v4();
    setup
        .mock_unavailability(json!([{
            "id": Uuid::new_v4(),
            "provider_id": setup.provider_id,
            "office_id": other_office,
            "start_time": date.and_hms_opt(9, 0, 0).unwrap().and_utc().to_rfc3339(),
            "end_time": date.and_hms_opt(12, 0, 0).unwrap().and_utc().to_rfc3339(),
            "reason": null,
            "created_at": Utc::now().to_rfc3339(),
        }]))
        .await;

    let slots = setup
        .calculator
        .compute_available_slots(
            setup.provider_id,
            setup.office_id,
            date,
            VisitType::FollowUp,
            "test_token",
        )
        .await
        .unwrap();

    assert_eq!(slots.len(), 6);
}
