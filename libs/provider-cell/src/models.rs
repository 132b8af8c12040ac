// libs/provider-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE PROVIDER MODELS
// ==============================================================================

/// A physical practice location. Offices are soft-deactivated, never
/// deleted, so historical appointments keep a valid reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Office {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub address: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Recurring weekly office hours. At most one active entry exists per
/// (office, day_of_week); day_of_week runs 0 (Sunday) through 6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyScheduleEntry {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub office_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An exception window (vacation, emergency) overriding the weekly
/// schedule. `office_id = None` applies to every office of the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailabilityPeriod {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub office_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UnavailabilityPeriod {
    /// Whether this period applies to the given office.
    pub fn applies_to_office(&self, office_id: Uuid) -> bool {
        match self.office_id {
            None => true,
            Some(scoped) => scoped == office_id,
        }
    }
}

// ==============================================================================
// VISIT TYPES
// ==============================================================================

/// Visit categories with fixed policy durations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    FirstVisit,
    FollowUp,
    Urgent,
    Routine,
}

impl VisitType {
    /// Policy constants, not computed.
    pub fn duration_minutes(&self) -> i64 {
        match self {
            VisitType::FirstVisit => 60,
            VisitType::FollowUp => 30,
            VisitType::Urgent => 20,
            VisitType::Routine => 30,
        }
    }
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitType::FirstVisit => write!(f, "first_visit"),
            VisitType::FollowUp => write!(f, "follow_up"),
            VisitType::Urgent => write!(f, "urgent"),
            VisitType::Routine => write!(f, "routine"),
        }
    }
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// A candidate visit interval before conflict filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotCandidate {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
    /// Set when the slot starts inside the same-day lead-time window.
    /// Marked rather than omitted so callers can tell "closed" from
    /// "too soon"; the default slot listing excludes these.
    pub too_soon: bool,
}

/// Thin store view of an appointment row, only what slot filtering needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedInterval {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOfficeRequest {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub office_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUnavailabilityRequest {
    pub office_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub provider_id: Uuid,
    pub office_id: Uuid,
    pub date: NaiveDate,
    pub visit_type: VisitType,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Office not found")]
    OfficeNotFound,

    #[error("Schedule entry not found")]
    ScheduleNotFound,

    #[error("Unavailability period not found")]
    PeriodNotFound,

    #[error("An active schedule already exists for this office and day")]
    ScheduleExists,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized access to provider resource")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
