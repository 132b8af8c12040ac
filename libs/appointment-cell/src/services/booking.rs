// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use provider_cell::models::Office;
use provider_cell::services::slots::LEAD_TIME_MINUTES;
use shared_config::AppConfig;
use shared_database::notify::{Notification, NotificationClient, NotificationKind};
use shared_database::supabase::{DbError, SupabaseClient};

use crate::models::{
    Actor, Appointment, AppointmentAction, AppointmentError, AppointmentStatus, AppointmentView,
    CancelAppointmentRequest, RequestAppointmentRequest, RespondToAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    notifications: NotificationClient,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            notifications: NotificationClient::new(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// RequestAppointment: patient asks for a slot. The conflict check
    /// here is advisory (fast feedback); the store's unique constraint
    /// on slot-holding rows settles races, and confirmation re-checks.
    pub async fn request_appointment(
        &self,
        patient_id: Uuid,
        request: RequestAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Appointment request from patient {} to provider {} on {}",
            patient_id, request.provider_id, request.appointment_date
        );

        let now = Utc::now();
        let duration = Duration::minutes(request.visit_type.duration_minutes());
        let end_time = request.start_time + duration;

        // Validation before any state reads.
        if let Some(given_end) = request.end_time {
            if given_end != end_time {
                return Err(AppointmentError::ValidationError(
                    "End time does not match the visit type duration".to_string(),
                ));
            }
        }
        if end_time <= request.start_time {
            return Err(AppointmentError::InvalidTime(
                "Visit must not cross midnight".to_string(),
            ));
        }

        let start_at = request
            .appointment_date
            .and_time(request.start_time)
            .and_utc();
        if start_at < now {
            return Err(AppointmentError::InvalidTime(
                "Appointment must be scheduled for a future time".to_string(),
            ));
        }
        if start_at < now + Duration::minutes(LEAD_TIME_MINUTES) {
            return Err(AppointmentError::InvalidTime(format!(
                "Appointments require at least {} minutes lead time",
                LEAD_TIME_MINUTES
            )));
        }

        // The requested office must exist, be active, and belong to the
        // requested provider.
        let office = self.get_office(request.office_id, auth_token).await?;
        if office.provider_id != request.provider_id {
            return Err(AppointmentError::OfficeMismatch);
        }
        if !office.is_active {
            return Err(AppointmentError::ValidationError(
                "Office is no longer active".to_string(),
            ));
        }

        // Advisory conflict check.
        let check = self
            .conflict_service
            .check_slot(
                request.provider_id,
                request.office_id,
                request.appointment_date,
                request.start_time,
                end_time,
                None,
                auth_token,
            )
            .await?;
        if let Some(reason) = check.reason {
            return Err(AppointmentError::SlotNotAvailable(reason));
        }

        let appointment_data = json!({
            "patient_id": patient_id,
            "provider_id": request.provider_id,
            "office_id": request.office_id,
            "confirmed_office_id": null,
            "appointment_date": request.appointment_date,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": end_time.format("%H:%M:%S").to_string(),
            "status": AppointmentStatus::Requested,
            "visit_type": request.visit_type,
            "patient_notes": request.patient_notes,
            "provider_notes": null,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(representation_headers()),
            )
            .await
            .map_err(map_write_error)?;

        let appointment = parse_single_appointment(result).ok_or_else(|| {
            AppointmentError::DatabaseError("Failed to create appointment".to_string())
        })?;

        self.notifications.send(
            Notification {
                recipient_id: appointment.provider_id,
                kind: NotificationKind::AppointmentRequested,
                reference_id: Some(appointment.id),
                body: format!(
                    "New {} request for {} at {}",
                    appointment.visit_type, appointment.appointment_date, appointment.start_time
                ),
            },
            auth_token,
        );

        Ok(appointment)
    }

    /// RespondToAppointment: provider confirms, reschedules, or rejects
    /// a requested appointment. Conflicts are re-checked here because
    /// time has passed since the request - this check is authoritative.
    pub async fn respond_to_appointment(
        &self,
        provider_id: Uuid,
        appointment_id: Uuid,
        request: RespondToAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if appointment.provider_id != provider_id {
            return Err(AppointmentError::Unauthorized);
        }

        let next_status = self
            .lifecycle_service
            .respond_transition(&appointment.status, &request.action)?;

        info!(
            "Provider {} responding {} to appointment {}",
            provider_id, request.action, appointment_id
        );

        let mut update = serde_json::Map::new();
        update.insert("status".to_string(), json!(next_status));
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        match request.action {
            AppointmentAction::Confirm => {
                // Date and time stay; the office becomes binding.
                let check = self
                    .conflict_service
                    .check_slot(
                        appointment.provider_id,
                        appointment.office_id,
                        appointment.appointment_date,
                        appointment.start_time,
                        appointment.end_time,
                        Some(appointment.id),
                        auth_token,
                    )
                    .await?;
                if let Some(reason) = check.reason {
                    return Err(AppointmentError::SlotNotAvailable(reason));
                }

                update.insert(
                    "confirmed_office_id".to_string(),
                    json!(appointment.office_id),
                );
            }
            AppointmentAction::Reschedule => {
                let new_date = request.new_date.ok_or_else(|| {
                    AppointmentError::ValidationError(
                        "Reschedule requires a new date".to_string(),
                    )
                })?;
                let new_start = request.new_start_time.ok_or_else(|| {
                    AppointmentError::ValidationError(
                        "Reschedule requires a new start time".to_string(),
                    )
                })?;

                let duration = Duration::minutes(appointment.visit_type.duration_minutes());
                let new_end = new_start + duration;
                if new_end <= new_start {
                    return Err(AppointmentError::InvalidTime(
                        "Visit must not cross midnight".to_string(),
                    ));
                }
                if new_date.and_time(new_start).and_utc() < Utc::now() {
                    return Err(AppointmentError::InvalidTime(
                        "Appointment must be scheduled for a future time".to_string(),
                    ));
                }

                // Only the new slot is validated; the old one is freed
                // by the same write that claims the new one.
                let check = self
                    .conflict_service
                    .check_slot(
                        appointment.provider_id,
                        appointment.office_id,
                        new_date,
                        new_start,
                        new_end,
                        Some(appointment.id),
                        auth_token,
                    )
                    .await?;
                if let Some(reason) = check.reason {
                    return Err(AppointmentError::SlotNotAvailable(reason));
                }

                update.insert("appointment_date".to_string(), json!(new_date));
                update.insert(
                    "start_time".to_string(),
                    json!(new_start.format("%H:%M:%S").to_string()),
                );
                update.insert(
                    "end_time".to_string(),
                    json!(new_end.format("%H:%M:%S").to_string()),
                );
                update.insert(
                    "confirmed_office_id".to_string(),
                    json!(appointment.office_id),
                );
            }
            AppointmentAction::Reject => {
                // No slot check on the way out.
            }
        }

        // Status-guarded write: if the record left `requested` since we
        // read it, zero rows come back and the transition is refused.
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id,
            AppointmentStatus::Requested
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update)),
                Some(representation_headers()),
            )
            .await
            .map_err(map_write_error)?;

        let updated = parse_single_appointment(result).ok_or_else(|| {
            warn!(
                "Appointment {} changed concurrently during {}",
                appointment_id, request.action
            );
            AppointmentError::InvalidStatusTransition(appointment.status.clone())
        })?;

        let kind = match request.action {
            AppointmentAction::Confirm => NotificationKind::AppointmentConfirmed,
            AppointmentAction::Reschedule => NotificationKind::AppointmentRescheduled,
            AppointmentAction::Reject => NotificationKind::AppointmentRejected,
        };
        self.notifications.send(
            Notification {
                recipient_id: updated.patient_id,
                kind,
                reference_id: Some(updated.id),
                body: format!(
                    "Your appointment on {} at {} was {}",
                    updated.appointment_date, updated.start_time, updated.status
                ),
            },
            auth_token,
        );

        Ok(updated)
    }

    /// CancelAppointment: either party, with the reason recorded in the
    /// acting party's notes field. Terminal records refuse.
    pub async fn cancel_appointment(
        &self,
        caller_id: Uuid,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.reason.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Cancellation reason is required".to_string(),
            ));
        }

        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        let actor = if appointment.patient_id == caller_id {
            Actor::Patient
        } else if appointment.provider_id == caller_id {
            Actor::Provider
        } else {
            return Err(AppointmentError::Unauthorized);
        };

        let next_status = self
            .lifecycle_service
            .cancel_transition(&appointment.status, &actor)?;

        info!(
            "{} cancelling appointment {}",
            match actor {
                Actor::Patient => "Patient",
                Actor::Provider => "Provider",
            },
            appointment_id
        );

        let reason = request.reason.trim();
        let (notes_field, existing_notes) = match actor {
            Actor::Patient => ("patient_notes", appointment.patient_notes.as_deref()),
            Actor::Provider => ("provider_notes", appointment.provider_notes.as_deref()),
        };
        let notes = match existing_notes {
            Some(existing) if !existing.is_empty() => {
                format!("{}\nCancelled: {}", existing, reason)
            }
            _ => format!("Cancelled: {}", reason),
        };

        let update = json!({
            "status": next_status,
            notes_field: notes,
            "updated_at": Utc::now().to_rfc3339(),
        });

        // Guarded against concurrent transitions into a terminal state.
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=in.(requested,confirmed,rescheduled)",
            appointment_id
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update),
                Some(representation_headers()),
            )
            .await
            .map_err(map_write_error)?;

        let updated = parse_single_appointment(result).ok_or_else(|| {
            AppointmentError::InvalidStatusTransition(appointment.status.clone())
        })?;

        let counterparty = match actor {
            Actor::Patient => updated.provider_id,
            Actor::Provider => updated.patient_id,
        };
        self.notifications.send(
            Notification {
                recipient_id: counterparty,
                kind: NotificationKind::AppointmentCancelled,
                reference_id: Some(updated.id),
                body: format!(
                    "Appointment on {} at {} was cancelled: {}",
                    updated.appointment_date, updated.start_time, reason
                ),
            },
            auth_token,
        );

        Ok(updated)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        parse_single_appointment(result).ok_or(AppointmentError::NotFound)
    }

    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        self.list_appointments(&format!("patient_id=eq.{}", patient_id), auth_token)
            .await
    }

    pub async fn list_for_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        self.list_appointments(&format!("provider_id=eq.{}", provider_id), auth_token)
            .await
    }

    async fn list_appointments(
        &self,
        filter: &str,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?{}&order=appointment_date.asc,start_time.asc",
            filter
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let now = Utc::now();
        result
            .into_iter()
            .map(|row| {
                serde_json::from_value::<Appointment>(row)
                    .map(|appointment| AppointmentView::at(appointment, now))
                    .map_err(|e| {
                        AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
                    })
            })
            .collect()
    }

    async fn get_office(
        &self,
        office_id: Uuid,
        auth_token: &str,
    ) -> Result<Office, AppointmentError> {
        let path = format!("/rest/v1/offices?id=eq.{}", office_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .and_then(|office| serde_json::from_value(office).ok())
            .ok_or(AppointmentError::OfficeNotFound)
    }
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

/// 409 from the store means a unique-constraint race on the slot.
fn map_write_error(e: DbError) -> AppointmentError {
    match e {
        DbError::Conflict(_) => {
            AppointmentError::SlotNotAvailable(crate::models::ConflictReason::ExistingAppointment)
        }
        other => AppointmentError::DatabaseError(other.to_string()),
    }
}

fn parse_single_appointment(result: Vec<Value>) -> Option<Appointment> {
    result
        .into_iter()
        .next()
        .and_then(|appointment| serde_json::from_value(appointment).ok())
}
