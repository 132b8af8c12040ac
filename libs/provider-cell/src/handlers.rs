// libs/provider-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateOfficeRequest, CreateScheduleRequest, CreateUnavailabilityRequest, ProviderError,
    SlotQuery, UpdateScheduleRequest,
};
use crate::services::{OfficeService, ScheduleService, SlotCalculatorService};

#[derive(Debug, Deserialize)]
pub struct OfficeListQuery {
    pub provider_id: Uuid,
    pub include_inactive: Option<bool>,
}

fn provider_uuid(user: &User) -> Result<Uuid, AppError> {
    if !user.is_provider() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid caller identity".to_string()))
}

fn map_provider_error(e: ProviderError) -> AppError {
    match e {
        ProviderError::OfficeNotFound => AppError::NotFound("Office not found".to_string()),
        ProviderError::ScheduleNotFound => AppError::NotFound("Schedule not found".to_string()),
        ProviderError::PeriodNotFound => {
            AppError::NotFound("Unavailability period not found".to_string())
        }
        ProviderError::ScheduleExists => AppError::Conflict(
            "An active schedule already exists for this office and day".to_string(),
        ),
        ProviderError::ValidationError(msg) => AppError::BadRequest(msg),
        ProviderError::Unauthorized => AppError::Auth("Not authorized".to_string()),
        ProviderError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// OFFICE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_office(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateOfficeRequest>,
) -> Result<Json<Value>, AppError> {
    let provider_id = provider_uuid(&user)?;
    let service = OfficeService::new(Arc::new(SupabaseClient::new(&state)));

    let office = service
        .create_office(provider_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "office": office
    })))
}

#[axum::debug_handler]
pub async fn list_offices(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<OfficeListQuery>,
) -> Result<Json<Value>, AppError> {
    // Inactive offices are a provider-only view of their own records.
    let include_inactive = query.include_inactive.unwrap_or(false)
        && user.is_provider()
        && user.id == query.provider_id.to_string();

    let service = OfficeService::new(Arc::new(SupabaseClient::new(&state)));
    let offices = service
        .list_offices(query.provider_id, include_inactive, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "offices": offices })))
}

#[axum::debug_handler]
pub async fn deactivate_office(
    State(state): State<Arc<AppConfig>>,
    Path(office_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let provider_id = provider_uuid(&user)?;
    let service = OfficeService::new(Arc::new(SupabaseClient::new(&state)));

    let office = service
        .deactivate_office(office_id, provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "office": office
    })))
}

// ==============================================================================
// SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let provider_id = provider_uuid(&user)?;
    let supabase = Arc::new(SupabaseClient::new(&state));

    // The office must exist and belong to the caller.
    let office = OfficeService::new(Arc::clone(&supabase))
        .get_office(request.office_id, auth.token())
        .await
        .map_err(map_provider_error)?;
    if office.provider_id != provider_id {
        return Err(AppError::Auth("Not authorized".to_string()));
    }

    let schedule = ScheduleService::new(supabase)
        .create_schedule(provider_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let provider_id = provider_uuid(&user)?;
    let service = ScheduleService::new(Arc::new(SupabaseClient::new(&state)));

    let schedule = service
        .update_schedule(schedule_id, provider_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

#[axum::debug_handler]
pub async fn deactivate_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let provider_id = provider_uuid(&user)?;
    let service = ScheduleService::new(Arc::new(SupabaseClient::new(&state)));

    let schedule = service
        .deactivate_schedule(schedule_id, provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

#[axum::debug_handler]
pub async fn list_schedules(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let provider_id = provider_uuid(&user)?;
    let service = ScheduleService::new(Arc::new(SupabaseClient::new(&state)));

    let schedules = service
        .list_schedules(provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "schedules": schedules })))
}

// ==============================================================================
// UNAVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_unavailability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateUnavailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let provider_id = provider_uuid(&user)?;
    let service = ScheduleService::new(Arc::new(SupabaseClient::new(&state)));

    let period = service
        .create_unavailability(provider_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "period": period
    })))
}

#[axum::debug_handler]
pub async fn delete_unavailability(
    State(state): State<Arc<AppConfig>>,
    Path(period_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let provider_id = provider_uuid(&user)?;
    let service = ScheduleService::new(Arc::new(SupabaseClient::new(&state)));

    service
        .delete_unavailability(period_id, provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "success": true })))
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

/// ComputeAvailableSlots: the patient-facing view of a provider's free
/// slots for one office, date, and visit type.
#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let service = SlotCalculatorService::new(Arc::new(SupabaseClient::new(&state)));

    let slots = service
        .compute_available_slots(
            query.provider_id,
            query.office_id,
            query.date,
            query.visit_type,
            auth.token(),
        )
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "date": query.date,
        "visit_type": query.visit_type,
        "slots": slots
    })))
}
