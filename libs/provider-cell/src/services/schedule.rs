// libs/provider-cell/src/services/schedule.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::{DbError, SupabaseClient};

use crate::models::{
    CreateScheduleRequest, CreateUnavailabilityRequest, ProviderError, UnavailabilityPeriod,
    UpdateScheduleRequest, WeeklyScheduleEntry,
};

pub struct ScheduleService {
    supabase: Arc<SupabaseClient>,
}

impl ScheduleService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn create_schedule(
        &self,
        provider_id: Uuid,
        request: CreateScheduleRequest,
        auth_token: &str,
    ) -> Result<WeeklyScheduleEntry, ProviderError> {
        debug!(
            "Creating schedule for provider {} office {} day {}",
            provider_id, request.office_id, request.day_of_week
        );

        if request.start_time >= request.end_time {
            return Err(ProviderError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }
        if !(0..=6).contains(&request.day_of_week) {
            return Err(ProviderError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if request.slot_minutes <= 0 {
            return Err(ProviderError::ValidationError(
                "Slot granularity must be positive".to_string(),
            ));
        }

        // One active entry per (office, day). Checked here for fast
        // feedback; the store's partial unique index settles races.
        let existing_path = format!(
            "/rest/v1/weekly_schedules?office_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&limit=1",
            request.office_id, request.day_of_week
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &existing_path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(ProviderError::ScheduleExists);
        }

        let schedule_data = json!({
            "provider_id": provider_id,
            "office_id": request.office_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "slot_minutes": request.slot_minutes,
            "is_active": true,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/weekly_schedules",
                Some(auth_token),
                Some(schedule_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => ProviderError::ScheduleExists,
                other => ProviderError::DatabaseError(other.to_string()),
            })?;

        parse_single_schedule(result)
            .ok_or_else(|| ProviderError::DatabaseError("Failed to create schedule".to_string()))
    }

    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        provider_id: Uuid,
        request: UpdateScheduleRequest,
        auth_token: &str,
    ) -> Result<WeeklyScheduleEntry, ProviderError> {
        debug!("Updating schedule {}", schedule_id);

        if let (Some(start), Some(end)) = (request.start_time, request.end_time) {
            if start >= end {
                return Err(ProviderError::ValidationError(
                    "Start time must be before end time".to_string(),
                ));
            }
        }
        if let Some(slot_minutes) = request.slot_minutes {
            if slot_minutes <= 0 {
                return Err(ProviderError::ValidationError(
                    "Slot granularity must be positive".to_string(),
                ));
            }
        }

        let mut update_data = serde_json::Map::new();
        if let Some(start_time) = request.start_time {
            update_data.insert(
                "start_time".to_string(),
                json!(start_time.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(end_time) = request.end_time {
            update_data.insert(
                "end_time".to_string(),
                json!(end_time.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(slot_minutes) = request.slot_minutes {
            update_data.insert("slot_minutes".to_string(), json!(slot_minutes));
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!(
            "/rest/v1/weekly_schedules?id=eq.{}&provider_id=eq.{}",
            schedule_id, provider_id
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => ProviderError::ScheduleExists,
                other => ProviderError::DatabaseError(other.to_string()),
            })?;

        parse_single_schedule(result).ok_or(ProviderError::ScheduleNotFound)
    }

    pub async fn deactivate_schedule(
        &self,
        schedule_id: Uuid,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<WeeklyScheduleEntry, ProviderError> {
        self.update_schedule(
            schedule_id,
            provider_id,
            UpdateScheduleRequest {
                start_time: None,
                end_time: None,
                slot_minutes: None,
                is_active: Some(false),
            },
            auth_token,
        )
        .await
    }

    pub async fn list_schedules(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<WeeklyScheduleEntry>, ProviderError> {
        let path = format!(
            "/rest/v1/weekly_schedules?provider_id=eq.{}&is_active=eq.true&order=day_of_week.asc,start_time.asc",
            provider_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|entry| {
                serde_json::from_value(entry)
                    .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse schedule: {}", e)))
            })
            .collect()
    }

    pub async fn create_unavailability(
        &self,
        provider_id: Uuid,
        request: CreateUnavailabilityRequest,
        auth_token: &str,
    ) -> Result<UnavailabilityPeriod, ProviderError> {
        debug!(
            "Creating unavailability for provider {} from {} to {}",
            provider_id, request.start_time, request.end_time
        );

        if request.start_time >= request.end_time {
            return Err(ProviderError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }

        let period_data = json!({
            "provider_id": provider_id,
            "office_id": request.office_id,
            "start_time": request.start_time.to_rfc3339(),
            "end_time": request.end_time.to_rfc3339(),
            "reason": request.reason,
            "created_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/unavailability_periods",
                Some(auth_token),
                Some(period_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .and_then(|period| serde_json::from_value(period).ok())
            .ok_or_else(|| {
                ProviderError::DatabaseError("Failed to create unavailability period".to_string())
            })
    }

    pub async fn delete_unavailability(
        &self,
        period_id: Uuid,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ProviderError> {
        debug!("Deleting unavailability period {}", period_id);

        let path = format!(
            "/rest/v1/unavailability_periods?id=eq.{}&provider_id=eq.{}",
            period_id, provider_id
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ProviderError::PeriodNotFound);
        }

        Ok(())
    }
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn parse_single_schedule(result: Vec<Value>) -> Option<WeeklyScheduleEntry> {
    result
        .into_iter()
        .next()
        .and_then(|entry| serde_json::from_value(entry).ok())
}
