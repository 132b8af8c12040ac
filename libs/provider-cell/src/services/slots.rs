// libs/provider-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    BookedInterval, ProviderError, SlotCandidate, UnavailabilityPeriod, VisitType,
    WeeklyScheduleEntry,
};

/// Minimum gap between "now" and a bookable same-day slot.
pub const LEAD_TIME_MINUTES: i64 = 60;

/// The one interval-overlap test shared by slot filtering and booking
/// validation. Open boundaries: touching endpoints do not overlap.
pub fn intervals_overlap<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// Day-of-week index used across the store: 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

/// Generate candidate slots for one schedule entry on one date.
///
/// Candidates step by the schedule's granularity, not the visit
/// duration, so they may overlap each other before conflict filtering.
/// The last candidate is the latest start whose full duration still fits
/// before the schedule's end. Same-day candidates inside the lead-time
/// window are emitted with `too_soon` set instead of being dropped.
///
/// Pure: identical inputs always yield the identical ordered list.
pub fn generate_candidates(
    schedule: &WeeklyScheduleEntry,
    date: NaiveDate,
    visit_type: VisitType,
    now: DateTime<Utc>,
) -> Vec<SlotCandidate> {
    let duration = Duration::minutes(visit_type.duration_minutes());
    let step = Duration::minutes(schedule.slot_minutes.max(1) as i64);

    let window_start = date.and_time(schedule.start_time);
    let window_end = date.and_time(schedule.end_time);
    let lead_cutoff = now + Duration::minutes(LEAD_TIME_MINUTES);
    let is_today = date == now.date_naive();

    let mut candidates = Vec::new();
    let mut current = window_start;

    while current + duration <= window_end {
        let slot_end = current + duration;
        let too_soon = is_today && current.and_utc() < lead_cutoff;

        candidates.push(SlotCandidate {
            start_time: current.time(),
            end_time: slot_end.time(),
            duration_minutes: visit_type.duration_minutes(),
            too_soon,
        });

        current += step;
    }

    candidates
}

/// Computes free slots for a provider's office on a date: candidate
/// generation from the weekly schedule, then filtering against booked
/// appointments and unavailability periods.
pub struct SlotCalculatorService {
    supabase: Arc<SupabaseClient>,
}

impl SlotCalculatorService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Ordered bookable slots for the given date and visit type. An
    /// office with no active schedule entry for the weekday is closed
    /// that day and yields an empty list.
    pub async fn compute_available_slots(
        &self,
        provider_id: Uuid,
        office_id: Uuid,
        date: NaiveDate,
        visit_type: VisitType,
        auth_token: &str,
    ) -> Result<Vec<SlotCandidate>, ProviderError> {
        debug!(
            "Computing {} slots for provider {} office {} on {}",
            visit_type, provider_id, office_id, date
        );

        let schedule = match self
            .get_active_schedule(provider_id, office_id, day_of_week(date), auth_token)
            .await?
        {
            Some(entry) => entry,
            None => {
                debug!("Office {} closed on {}", office_id, date);
                return Ok(vec![]);
            }
        };

        let candidates = generate_candidates(&schedule, date, visit_type, Utc::now());

        let booked = self
            .get_booked_intervals(provider_id, date, auth_token)
            .await?;
        let unavailability = self
            .get_unavailability_for_date(provider_id, date, auth_token)
            .await?;

        let slots = candidates
            .into_iter()
            .filter(|slot| !slot.too_soon)
            .filter(|slot| {
                !booked.iter().any(|b| {
                    intervals_overlap(slot.start_time, slot.end_time, b.start_time, b.end_time)
                })
            })
            .filter(|slot| {
                let slot_start = date.and_time(slot.start_time).and_utc();
                let slot_end = date.and_time(slot.end_time).and_utc();
                !unavailability
                    .iter()
                    .filter(|p| p.applies_to_office(office_id))
                    .any(|p| intervals_overlap(slot_start, slot_end, p.start_time, p.end_time))
            })
            .collect::<Vec<_>>();

        debug!("Found {} bookable slots", slots.len());
        Ok(slots)
    }

    pub async fn get_active_schedule(
        &self,
        provider_id: Uuid,
        office_id: Uuid,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<Option<WeeklyScheduleEntry>, ProviderError> {
        let path = format!(
            "/rest/v1/weekly_schedules?provider_id=eq.{}&office_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&limit=1",
            provider_id, office_id, day_of_week
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .map(|entry| {
                serde_json::from_value(entry)
                    .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse schedule: {}", e)))
            })
            .transpose()
    }

    /// Appointments holding a slot on this date, provider-wide. Only
    /// statuses in the active set block time.
    async fn get_booked_intervals(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedInterval>, ProviderError> {
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&appointment_date=eq.{}&status=in.(requested,confirmed,rescheduled)&select=start_time,end_time&order=start_time.asc",
            provider_id, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse interval: {}", e)))
            })
            .collect()
    }

    /// Unavailability periods intersecting the date, any office scope.
    /// Office applicability is decided by the caller per slot.
    async fn get_unavailability_for_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<UnavailabilityPeriod>, ProviderError> {
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
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse period: {}", e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn monday_schedule(start: (u32, u32), end: (u32, u32), slot_minutes: i32) -> WeeklyScheduleEntry {
        WeeklyScheduleEntry {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            office_id: Uuid::new_v4(),
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            slot_minutes,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // A Monday well in the future relative to the fixed "now" below.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    fn far_before() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn monday_nine_to_noon_yields_six_follow_up_slots() {
        let schedule = monday_schedule((9, 0), (12, 0), 30);
        let slots = generate_candidates(&schedule, monday(), VisitType::FollowUp, far_before());

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
        // 11:30 + 30min lands exactly on the schedule end and still fits.
        assert_eq!(
            slots.last().unwrap().end_time,
            NaiveTime::from_hms_opt(12, 0, 0).unwrap()
        );
        assert!(slots.iter().all(|s| !s.too_soon));
    }

    #[test]
    fn last_slot_must_fit_entirely_inside_the_window() {
        // 60-minute visits in a 09:00-12:00 window stepped by 30 minutes:
        // 11:30 would end at 12:30 and is excluded.
        let schedule = monday_schedule((9, 0), (12, 0), 30);
        let slots = generate_candidates(&schedule, monday(), VisitType::FirstVisit, far_before());

        assert_eq!(slots.len(), 5);
        assert_eq!(
            slots.last().unwrap().start_time,
            NaiveTime::from_hms_opt(11, 0, 0).unwrap()
        );
    }

    #[test]
    fn granularity_finer_than_duration_produces_overlapping_candidates() {
        let schedule = monday_schedule((9, 0), (10, 0), 15);
        let slots = generate_candidates(&schedule, monday(), VisitType::FollowUp, far_before());

        // 09:00, 09:15, 09:30 - candidates overlap before filtering.
        assert_eq!(slots.len(), 3);
        assert!(intervals_overlap(
            slots[0].start_time,
            slots[0].end_time,
            slots[1].start_time,
            slots[1].end_time
        ));
    }

    #[test]
    fn generation_is_deterministic() {
        let schedule = monday_schedule((9, 0), (12, 0), 30);
        let now = far_before();
        let first = generate_candidates(&schedule, monday(), VisitType::Routine, now);
        let second = generate_candidates(&schedule, monday(), VisitType::Routine, now);
        assert_eq!(first, second);
    }

    #[test]
    fn same_day_slots_inside_lead_time_are_marked_not_dropped() {
        let schedule = monday_schedule((9, 0), (12, 0), 30);
        // 09:15 on the target Monday itself: 09:00..10:15 starts are too soon.
        let now = Utc.with_ymd_and_hms(2025, 6, 16, 9, 15, 0).unwrap();
        let slots = generate_candidates(&schedule, monday(), VisitType::FollowUp, now);

        assert_eq!(slots.len(), 6);
        let too_soon: Vec<NaiveTime> = slots
            .iter()
            .filter(|s| s.too_soon)
            .map(|s| s.start_time)
            .collect();
        assert_eq!(
            too_soon,
            vec![
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn lead_time_does_not_apply_to_future_dates() {
        let schedule = monday_schedule((9, 0), (12, 0), 30);
        // The evening before: every slot next day is fine.
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 23, 30, 0).unwrap();
        let slots = generate_candidates(&schedule, monday(), VisitType::FollowUp, now);
        assert!(slots.iter().all(|s| !s.too_soon));
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let nine_thirty = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let ten_thirty = NaiveTime::from_hms_opt(10, 30, 0).unwrap();

        // 09:30-10:00 against a 10:00-10:30 booking: boundary touch only.
        assert!(!intervals_overlap(nine_thirty, ten, ten, ten_thirty));
        // 09:30-10:30 against 10:00-10:30 genuinely overlaps.
        assert!(intervals_overlap(nine_thirty, ten_thirty, ten, ten_thirty));
        // Containment overlaps.
        assert!(intervals_overlap(nine, ten_thirty, nine_thirty, ten));
    }

    #[test]
    fn existing_booking_removes_exactly_the_overlapping_candidates() {
        let schedule = monday_schedule((9, 0), (12, 0), 30);
        let slots = generate_candidates(&schedule, monday(), VisitType::FollowUp, far_before());

        let booked = BookedInterval {
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        };

        let remaining: Vec<NaiveTime> = slots
            .iter()
            .filter(|s| {
                !intervals_overlap(s.start_time, s.end_time, booked.start_time, booked.end_time)
            })
            .map(|s| s.start_time)
            .collect();

        // 09:30 ends at 10:00 (touching boundary) and survives; only the
        // 10:00 candidate itself is removed.
        assert_eq!(
            remaining,
            vec![
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn closed_day_mapping_uses_sunday_zero() {
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()), 0); // Sunday
        assert_eq!(day_of_week(monday()), 1);
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2025, 6, 21).unwrap()), 6); // Saturday
    }

    #[test]
    fn global_unavailability_applies_to_every_office() {
        let office = Uuid::new_v4();
        let other_office = Uuid::new_v4();
        let period = UnavailabilityPeriod {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            office_id: None,
            start_time: Utc.with_ymd_and_hms(2025, 6, 16, 9, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 6, 16, 12, 0, 0).unwrap(),
            reason: Some("vacation".to_string()),
            created_at: Utc::now(),
        };

        assert!(period.applies_to_office(office));
        assert!(period.applies_to_office(other_office));

        let scoped = UnavailabilityPeriod {
            office_id: Some(office),
            ..period
        };
        assert!(scoped.applies_to_office(office));
        assert!(!scoped.applies_to_office(other_office));
    }
}
