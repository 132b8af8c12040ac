// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use provider_cell::models::VisitType;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A clinical visit booking. Mutated only through the state machine;
/// never deleted - cancellation and rejection are terminal statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    /// Office the patient asked for.
    pub office_id: Uuid,
    /// Assigned by the provider at confirmation; null until then.
    pub confirmed_office_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub visit_type: VisitType,
    pub patient_notes: Option<String>,
    pub provider_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn start_at(&self) -> DateTime<Utc> {
        self.appointment_date.and_time(self.start_time).and_utc()
    }

    pub fn end_at(&self) -> DateTime<Utc> {
        self.appointment_date.and_time(self.end_time).and_utc()
    }

    /// Read-time status: a confirmed or rescheduled appointment whose
    /// end has passed reads as `expired` without mutating stored state.
    pub fn display_status(&self, now: DateTime<Utc>) -> DisplayStatus {
        match self.status {
            AppointmentStatus::Confirmed | AppointmentStatus::Rescheduled
                if self.end_at() < now =>
            {
                DisplayStatus::Expired
            }
            AppointmentStatus::Requested => DisplayStatus::Requested,
            AppointmentStatus::Confirmed => DisplayStatus::Confirmed,
            AppointmentStatus::Rescheduled => DisplayStatus::Rescheduled,
            AppointmentStatus::Rejected => DisplayStatus::Rejected,
            AppointmentStatus::CancelledByPatient => DisplayStatus::CancelledByPatient,
            AppointmentStatus::CancelledByDoctor => DisplayStatus::CancelledByDoctor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Requested,
    Confirmed,
    Rescheduled,
    Rejected,
    CancelledByPatient,
    CancelledByDoctor,
}

impl AppointmentStatus {
    /// Statuses that hold a time slot against double-booking.
    pub fn holds_slot(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Requested
                | AppointmentStatus::Confirmed
                | AppointmentStatus::Rescheduled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Rejected
                | AppointmentStatus::CancelledByPatient
                | AppointmentStatus::CancelledByDoctor
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Requested => write!(f, "requested"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
            AppointmentStatus::Rejected => write!(f, "rejected"),
            AppointmentStatus::CancelledByPatient => write!(f, "cancelled_by_patient"),
            AppointmentStatus::CancelledByDoctor => write!(f, "cancelled_by_doctor"),
        }
    }
}

/// Stored statuses plus the derived, never-persisted `expired`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Requested,
    Confirmed,
    Rescheduled,
    Rejected,
    CancelledByPatient,
    CancelledByDoctor,
    Expired,
}

/// Who is driving a transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Patient,
    Provider,
}

/// Provider response to a requested appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentAction {
    Confirm,
    Reschedule,
    Reject,
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentAction::Confirm => write!(f, "confirm"),
            AppointmentAction::Reschedule => write!(f, "reschedule"),
            AppointmentAction::Reject => write!(f, "reject"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAppointmentRequest {
    pub provider_id: Uuid,
    pub office_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    /// Optional; when present it must equal start + visit duration.
    pub end_time: Option<NaiveTime>,
    pub visit_type: VisitType,
    pub patient_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondToAppointmentRequest {
    pub action: AppointmentAction,
    pub new_date: Option<NaiveDate>,
    pub new_start_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

/// Appointment plus its read-time display status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub display_status: DisplayStatus,
}

impl AppointmentView {
    pub fn at(appointment: Appointment, now: DateTime<Utc>) -> Self {
        let display_status = appointment.display_status(now);
        Self {
            appointment,
            display_status,
        }
    }
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotCheck {
    pub bookable: bool,
    pub reason: Option<ConflictReason>,
}

impl SlotCheck {
    pub fn free() -> Self {
        Self {
            bookable: true,
            reason: None,
        }
    }

    pub fn blocked(reason: ConflictReason) -> Self {
        Self {
            bookable: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    ExistingAppointment,
    ProviderUnavailable,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::ExistingAppointment => write!(f, "slot overlaps an existing appointment"),
            ConflictReason::ProviderUnavailable => write!(f, "provider is unavailable at this time"),
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment slot is not available: {0}")]
    SlotNotAvailable(ConflictReason),

    #[error("Office does not belong to this provider")]
    OfficeMismatch,

    #[error("Office not found")]
    OfficeNotFound,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
