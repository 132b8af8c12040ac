// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{Actor, AppointmentAction, AppointmentError, AppointmentStatus};

/// Owns transition legality for a single appointment record. All edges
/// live in the two match tables below; callers never compare statuses
/// ad hoc.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Provider response to a request. Only `requested` records accept
    /// any of the three actions.
    pub fn respond_transition(
        &self,
        current: &AppointmentStatus,
        action: &AppointmentAction,
    ) -> Result<AppointmentStatus, AppointmentError> {
        debug!("Validating {} on appointment in status {}", action, current);

        match (current, action) {
            (AppointmentStatus::Requested, AppointmentAction::Confirm) => {
                Ok(AppointmentStatus::Confirmed)
            }
            (AppointmentStatus::Requested, AppointmentAction::Reschedule) => {
                Ok(AppointmentStatus::Rescheduled)
            }
            (AppointmentStatus::Requested, AppointmentAction::Reject) => {
                Ok(AppointmentStatus::Rejected)
            }
            (status, action) => {
                warn!("Illegal transition attempted: {} on {}", action, status);
                Err(AppointmentError::InvalidStatusTransition(status.clone()))
            }
        }
    }

    /// Cancellation by either party, from any slot-holding status.
    /// Terminal records (rejected, already cancelled) cannot be
    /// cancelled again.
    pub fn cancel_transition(
        &self,
        current: &AppointmentStatus,
        actor: &Actor,
    ) -> Result<AppointmentStatus, AppointmentError> {
        match current {
            AppointmentStatus::Requested
            | AppointmentStatus::Confirmed
            | AppointmentStatus::Rescheduled => Ok(match actor {
                Actor::Patient => AppointmentStatus::CancelledByPatient,
                Actor::Provider => AppointmentStatus::CancelledByDoctor,
            }),
            status => {
                warn!("Cancel attempted on terminal status {}", status);
                Err(AppointmentError::InvalidStatusTransition(status.clone()))
            }
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn requested_accepts_all_three_responses() {
        let lifecycle = AppointmentLifecycleService::new();

        assert_eq!(
            lifecycle
                .respond_transition(&AppointmentStatus::Requested, &AppointmentAction::Confirm)
                .unwrap(),
            AppointmentStatus::Confirmed
        );
        assert_eq!(
            lifecycle
                .respond_transition(&AppointmentStatus::Requested, &AppointmentAction::Reschedule)
                .unwrap(),
            AppointmentStatus::Rescheduled
        );
        assert_eq!(
            lifecycle
                .respond_transition(&AppointmentStatus::Requested, &AppointmentAction::Reject)
                .unwrap(),
            AppointmentStatus::Rejected
        );
    }

    #[test]
    fn responses_on_non_requested_records_fail() {
        let lifecycle = AppointmentLifecycleService::new();

        for status in [
            AppointmentStatus::Confirmed,
            AppointmentStatus::Rescheduled,
            AppointmentStatus::Rejected,
            AppointmentStatus::CancelledByPatient,
            AppointmentStatus::CancelledByDoctor,
        ] {
            for action in [
                AppointmentAction::Confirm,
                AppointmentAction::Reschedule,
                AppointmentAction::Reject,
            ] {
                assert_matches!(
                    lifecycle.respond_transition(&status, &action),
                    Err(AppointmentError::InvalidStatusTransition(_))
                );
            }
        }
    }

    #[test]
    fn cancel_from_requested_is_a_permitted_edge() {
        let lifecycle = AppointmentLifecycleService::new();

        assert_eq!(
            lifecycle
                .cancel_transition(&AppointmentStatus::Requested, &Actor::Patient)
                .unwrap(),
            AppointmentStatus::CancelledByPatient
        );
        assert_eq!(
            lifecycle
                .cancel_transition(&AppointmentStatus::Requested, &Actor::Provider)
                .unwrap(),
            AppointmentStatus::CancelledByDoctor
        );
    }

    #[test]
    fn cancel_maps_actor_to_its_terminal_status() {
        let lifecycle = AppointmentLifecycleService::new();

        assert_eq!(
            lifecycle
                .cancel_transition(&AppointmentStatus::Confirmed, &Actor::Patient)
                .unwrap(),
            AppointmentStatus::CancelledByPatient
        );
        assert_eq!(
            lifecycle
                .cancel_transition(&AppointmentStatus::Rescheduled, &Actor::Provider)
                .unwrap(),
            AppointmentStatus::CancelledByDoctor
        );
    }

    #[test]
    fn rejected_records_cannot_be_cancelled_or_confirmed() {
        let lifecycle = AppointmentLifecycleService::new();

        assert_matches!(
            lifecycle.cancel_transition(&AppointmentStatus::Rejected, &Actor::Patient),
            Err(AppointmentError::InvalidStatusTransition(
                AppointmentStatus::Rejected
            ))
        );
        assert_matches!(
            lifecycle.respond_transition(&AppointmentStatus::Rejected, &AppointmentAction::Confirm),
            Err(AppointmentError::InvalidStatusTransition(
                AppointmentStatus::Rejected
            ))
        );
    }

    #[test]
    fn cancelled_records_stay_cancelled() {
        let lifecycle = AppointmentLifecycleService::new();

        for status in [
            AppointmentStatus::CancelledByPatient,
            AppointmentStatus::CancelledByDoctor,
        ] {
            assert_matches!(
                lifecycle.cancel_transition(&status, &Actor::Provider),
                Err(AppointmentError::InvalidStatusTransition(_))
            );
        }
    }
}
