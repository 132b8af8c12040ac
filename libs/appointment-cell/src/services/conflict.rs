// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use provider_cell::models::UnavailabilityPeriod;
use provider_cell::services::slots::intervals_overlap;
use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentError, ConflictReason, SlotCheck};

/// Row view for overlap checks; only the fields the test needs.
#[derive(Debug, Deserialize)]
struct HeldSlot {
    id: Uuid,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

/// Decides whether a candidate slot is bookable. Run at request time
/// for fast feedback and again at confirm/reschedule time; the later
/// check is the authoritative one because the appointment set changes
/// between the two.
pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// A slot conflicts when its interval overlaps (open boundaries -
    /// touching endpoints are fine) any slot-holding appointment of the
    /// provider that day, or any unavailability period scoped to the
    /// requested office or to no office at all.
    pub async fn check_slot(
        &self,
        provider_id: Uuid,
        office_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<SlotCheck, AppointmentError> {
        debug!(
            "Checking slot for provider {} on {} {}-{}",
            provider_id, date, start_time, end_time
        );

        let held = self
            .get_held_slots(provider_id, date, auth_token)
            .await?;

        let appointment_conflict = held
            .iter()
            .filter(|slot| Some(slot.id) != exclude_appointment_id)
            .any(|slot| intervals_overlap(start_time, end_time, slot.start_time, slot.end_time));

        if appointment_conflict {
            warn!(
                "Slot conflict for provider {} on {}: existing appointment",
                provider_id, date
            );
            return Ok(SlotCheck::blocked(ConflictReason::ExistingAppointment));
        }

        let slot_start = date.and_time(start_time).and_utc();
        let slot_end = date.and_time(end_time).and_utc();

        let unavailable = self
            .get_unavailability(provider_id, date, auth_token)
            .await?
            .iter()
            .filter(|p| p.applies_to_office(office_id))
            .any(|p| intervals_overlap(slot_start, slot_end, p.start_time, p.end_time));

        if unavailable {
            warn!(
                "Slot conflict for provider {} on {}: unavailability period",
                provider_id, date
            );
            return Ok(SlotCheck::blocked(ConflictReason::ProviderUnavailable));
        }

        Ok(SlotCheck::free())
    }

    async fn get_held_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<HeldSlot>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&appointment_date=eq.{}&status=in.(requested,confirmed,rescheduled)&select=id,start_time,end_time&order=start_time.asc",
            provider_id, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
                })
            })
            .collect()
    }

    async fn get_unavailability(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<UnavailabilityPeriod>, AppointmentError> {
        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let day_end = day_start + Duration::days(1);

        let path = format!(
            "/rest/v1/unavailability_periods?provider_id=eq.{}&start_time=lt.{}&end_time=gt.{}",
            provider_id,
            day_end.to_rfc3339(),
            day_start.to_rfc3339()
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse period: {}", e))
                })
            })
            .collect()
    }
}
