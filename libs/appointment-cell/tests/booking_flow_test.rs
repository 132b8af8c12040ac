// libs/appointment-cell/tests/booking_flow_test.rs
//
// Booking flows against a mocked store: request, respond, cancel, and
// the guards around them.

use assert_matches::assert_matches;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentAction, AppointmentError, AppointmentStatus, CancelAppointmentRequest,
    RequestAppointmentRequest, RespondToAppointmentRequest, VisitType,
};
use appointment_cell::services::booking::AppointmentBookingService;
use shared_utils::test_utils::TestConfig;

struct TestSetup {
    service: AppointmentBookingService,
    mock_server: MockServer,
    patient_id: Uuid,
    provider_id: Uuid,
    office_id: Uuid,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;

        let mut config = TestConfig::default().to_app_config();
        config.supabase_url = mock_server.uri();

        let service = AppointmentBookingService::new(&config);

        let setup = Self {
            service,
            mock_server,
            patient_id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            office_id: Uuid::new_v4(),
        };

        // Notification inserts are fire-and-forget; accept them all.
        Mock::given(method("POST"))
            .and(path("/rest/v1/notifications"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .mount(&setup.mock_server)
            .await;

        setup
    }

    fn future_monday() -> NaiveDate {
        let mut date = Utc::now().date_naive() + Duration::days(7);
        while date.weekday() != Weekday::Mon {
            date += Duration::days(1);
        }
        date
    }

    fn appointment_row(&self, id: Uuid, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "patient_id": self.patient_id,
            "provider_id": self.provider_id,
            "office_id": self.office_id,
            "confirmed_office_id": if status == "confirmed" { json!(self.office_id) } else { json!(null) },
            "appointment_date": Self::future_monday(),
            "start_time": "09:00:00",
            "end_time": "09:30:00",
            "status": status,
            "visit_type": "follow_up",
            "patient_notes": null,
            "provider_notes": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
        })
    }

    async fn mock_office(&self, is_active: bool, owner: Uuid) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/offices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": self.office_id,
                "provider_id": owner,
                "name": "Main Street Practice",
                "address": "12 Main Street",
                "is_active": is_active,
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z",
            }])))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_held_slots(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("provider_id", format!("eq.{}", self.provider_id)))
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

    async fn mock_get_appointment(&self, id: Uuid, status: &str) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", format!("eq.{}", id)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([self.appointment_row(id, status)])),
            )
            .mount(&self.mock_server)
            .await;
    }

    fn request(&self) -> RequestAppointmentRequest {
        RequestAppointmentRequest {
            provider_id: self.provider_id,
            office_id: self.office_id,
            appointment_date: Self::future_monday(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: None,
            visit_type: VisitType::FollowUp,
            patient_notes: Some("First follow-up".to_string()),
        }
    }
}

// ==============================================================================
// REQUEST
// ==============================================================================

#[tokio::test]
async fn request_creates_a_requested_appointment() {
    let setup = TestSetup::new().await;
    setup.mock_office(true, setup.provider_id).await;
    setup.mock_held_slots(json!([])).await;
    setup.mock_unavailability(json!([])).await;

    let created_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([setup.appointment_row(created_id, "requested")])),
        )
        .mount(&setup.mock_server)
        .await;

    let appointment = setup
        .service
        .request_appointment(setup.patient_id, setup.request(), "test_token")
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Requested);
    assert_eq!(appointment.confirmed_office_id, None);
}

#[tokio::test]
async fn request_refuses_office_of_another_provider() {
    let setup = TestSetup::new().await;
    setup.mock_office(true, Uuid::new_v4()).await;

    // Nothing may be written when validation fails.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .service
        .request_appointment(setup.patient_id, setup.request(), "test_token")
        .await;

    assert_matches!(result, Err(AppointmentError::OfficeMismatch));
}

#[tokio::test]
async fn request_against_an_overlapping_slot_is_a_conflict() {
    let setup = TestSetup::new().await;
    setup.mock_office(true, setup.provider_id).await;
    // An existing requested appointment 09:00-09:30 holds the slot.
    setup
        .mock_held_slots(json!([{
            "id": Uuid::new_v4(),
            "start_time": "09:00:00",
            "end_time": "09:30:00",
        }]))
        .await;
    setup.mock_unavailability(json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .service
        .request_appointment(setup.patient_id, setup.request(), "test_token")
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable(_)));
}

#[tokio::test]
async fn request_in_the_past_is_rejected_before_any_reads() {
    let setup = TestSetup::new().await;

    let mut request = setup.request();
    request.appointment_date = Utc::now().date_naive() - Duration::days(1);

    let result = setup
        .service
        .request_appointment(setup.patient_id, request, "test_token")
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidTime(_)));
}

#[tokio::test]
async fn request_with_mismatched_end_time_is_rejected() {
    let setup = TestSetup::new().await;

    let mut request = setup.request();
    // follow_up is 30 minutes; 09:00-10:00 does not match.
    request.end_time = Some(NaiveTime::from_hms_opt(10, 0, 0).unwrap());

    let result = setup
        .service
        .request_appointment(setup.patient_id, request, "test_token")
        .await;

    assert_matches!(result, Err(AppointmentError::ValidationError(_)));
}

// ==============================================================================
// RESPOND
// ==============================================================================

#[tokio::test]
async fn confirm_assigns_the_office_and_re_checks_the_slot() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();
    setup.mock_get_appointment(appointment_id, "requested").await;
    setup.mock_held_slots(json!([])).await;
    setup.mock_unavailability(json!([])).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([setup.appointment_row(appointment_id, "confirmed")])),
        )
        .mount(&setup.mock_server)
        .await;

    let appointment = setup
        .service
        .respond_to_appointment(
            setup.provider_id,
            appointment_id,
            RespondToAppointmentRequest {
                action: AppointmentAction::Confirm,
                new_date: None,
                new_start_time: None,
            },
            "test_token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
    assert_eq!(appointment.confirmed_office_id, Some(setup.office_id));
}

#[tokio::test]
async fn confirm_fails_when_the_slot_was_taken_meanwhile() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();
    setup.mock_get_appointment(appointment_id, "requested").await;
    // Another appointment claimed the same interval since the request.
    setup
        .mock_held_slots(json!([{
            "id": Uuid::new_v4(),
            "start_time": "09:00:00",
            "end_time": "09:30:00",
        }]))
        .await;
    setup.mock_unavailability(json!([])).await;

    let result = setup
        .service
        .respond_to_appointment(
            setup.provider_id,
            appointment_id,
            RespondToAppointmentRequest {
                action: AppointmentAction::Confirm,
                new_date: None,
                new_start_time: None,
            },
            "test_token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable(_)));
}

#[tokio::test]
async fn responding_to_a_confirmed_appointment_is_illegal() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();
    setup.mock_get_appointment(appointment_id, "confirmed").await;

    let result = setup
        .service
        .respond_to_appointment(
            setup.provider_id,
            appointment_id,
            RespondToAppointmentRequest {
                action: AppointmentAction::Reject,
                new_date: None,
                new_start_time: None,
            },
            "test_token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidStatusTransition(_)));
}

#[tokio::test]
async fn reschedule_requires_a_new_slot() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();
    setup.mock_get_appointment(appointment_id, "requested").await;

    let result = setup
        .service
        .respond_to_appointment(
            setup.provider_id,
            appointment_id,
            RespondToAppointmentRequest {
                action: AppointmentAction::Reschedule,
                new_date: None,
                new_start_time: None,
            },
            "test_token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::ValidationError(_)));
}

#[tokio::test]
async fn another_providers_appointment_is_off_limits() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();
    setup.mock_get_appointment(appointment_id, "requested").await;

    let result = setup
        .service
        .respond_to_appointment(
            Uuid::new_v4(),
            appointment_id,
            RespondToAppointmentRequest {
                action: AppointmentAction::Confirm,
                new_date: None,
                new_start_time: None,
            },
            "test_token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized));
}

// ==============================================================================
// CANCEL
// ==============================================================================

#[tokio::test]
async fn patient_cancel_lands_in_the_patient_terminal_status() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();
    setup.mock_get_appointment(appointment_id, "confirmed").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(
                json!([setup.appointment_row(appointment_id, "cancelled_by_patient")]),
            ),
        )
        .mount(&setup.mock_server)
        .await;

    let appointment = setup
        .service
        .cancel_appointment(
            setup.patient_id,
            appointment_id,
            CancelAppointmentRequest {
                reason: "Feeling better".to_string(),
            },
            "test_token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::CancelledByPatient);
}

#[tokio::test]
async fn rejected_appointments_cannot_be_cancelled() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();
    setup.mock_get_appointment(appointment_id, "rejected").await;

    let result = setup
        .service
        .cancel_appointment(
            setup.patient_id,
            appointment_id,
            CancelAppointmentRequest {
                reason: "Too late".to_string(),
            },
            "test_token",
        )
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidStatusTransition(
            AppointmentStatus::Rejected
        ))
    );
}

#[tokio::test]
async fn strangers_cannot_cancel() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();
    setup.mock_get_appointment(appointment_id, "confirmed").await;

    let result = setup
        .service
        .cancel_appointment(
            Uuid::new_v4(),
            appointment_id,
            CancelAppointmentRequest {
                reason: "Not mine".to_string(),
            },
            "test_token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized));
}
