// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use security_cell::services::rate_limit::{client_identifier, RateLimitAction, RateLimiterService};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, CancelAppointmentRequest, RequestAppointmentRequest,
    RespondToAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

fn caller_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid caller identity".to_string()))
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::OfficeNotFound => AppError::NotFound("Office not found".to_string()),
        AppointmentError::SlotNotAvailable(reason) => {
            AppError::Conflict(format!("Appointment slot is not available: {}", reason))
        }
        AppointmentError::OfficeMismatch => {
            AppError::BadRequest("Office does not belong to this provider".to_string())
        }
        AppointmentError::InvalidTime(msg) => AppError::BadRequest(msg),
        AppointmentError::InvalidStatusTransition(status) => AppError::Conflict(format!(
            "Appointment cannot be modified in current status: {}",
            status
        )),
        AppointmentError::Unauthorized => AppError::Auth("Not authorized".to_string()),
        AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// APPOINTMENT LIFECYCLE HANDLERS
// ==============================================================================

/// RequestAppointment: patient-only.
#[axum::debug_handler]
pub async fn request_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<RequestAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_patient() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    let patient_id = caller_uuid(&user)?;

    let limiter = RateLimiterService::new(&state);
    let decision = limiter
        .check(
            &client_identifier(&headers, Some(&user)),
            RateLimitAction::AppointmentRequest,
        )
        .await;
    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        });
    }

    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .request_appointment(patient_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment requested, awaiting provider response"
    })))
}

/// RespondToAppointment: provider-only (confirm / reschedule / reject).
#[axum::debug_handler]
pub async fn respond_to_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RespondToAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    let provider_id = caller_uuid(&user)?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .respond_to_appointment(provider_id, appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

/// CancelAppointment: patient or provider on their own record.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller_id = caller_uuid(&user)?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .cancel_appointment(caller_id, appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

// ==============================================================================
// READ HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    // Only the two parties may see the record.
    let is_patient = appointment.patient_id.to_string() == user.id;
    let is_provider = appointment.provider_id.to_string() == user.id;
    if !is_patient && !is_provider && !user.is_admin() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }

    let view = crate::models::AppointmentView::at(appointment, chrono::Utc::now());
    Ok(Json(json!(view)))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if patient_id.to_string() != user.id && !user.is_admin() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }

    let service = AppointmentBookingService::new(&state);
    let appointments = service
        .list_for_patient(patient_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn get_provider_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if provider_id.to_string() != user.id && !user.is_admin() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }

    let service = AppointmentBookingService::new(&state);
    let appointments = service
        .list_for_provider(provider_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}
