// libs/security-cell/src/models.rs
use serde::{Deserialize, Serialize};

use shared_config::RateLimitSettings;

/// Gated mutating operations, each with its own window and limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    Registration,
    ConnectionRequest,
    InviteRedemption,
    AppointmentRequest,
}

impl RateLimitAction {
    pub fn key_fragment(&self) -> &'static str {
        match self {
            RateLimitAction::Registration => "registration",
            RateLimitAction::ConnectionRequest => "connection_request",
            RateLimitAction::InviteRedemption => "invite_redemption",
            RateLimitAction::AppointmentRequest => "appointment_request",
        }
    }

    /// (max requests, window seconds) for this action.
    pub fn rule(&self, settings: &RateLimitSettings) -> (u32, u64) {
        match self {
            RateLimitAction::Registration => {
                (settings.registration_max, settings.registration_window_secs)
            }
            RateLimitAction::ConnectionRequest => (
                settings.connection_request_max,
                settings.connection_request_window_secs,
            ),
            RateLimitAction::InviteRedemption => (
                settings.invite_redemption_max,
                settings.invite_redemption_window_secs,
            ),
            RateLimitAction::AppointmentRequest => (
                settings.appointment_request_max,
                settings.appointment_request_window_secs,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Remaining window time when denied; zero when allowed.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_secs: 0,
        }
    }

    pub fn denied(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitCheckRequest {
    /// Admin callers may check on behalf of another identifier.
    pub identifier: Option<String>,
    pub action: RateLimitAction,
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit storage not configured")]
    NotConfigured,

    #[error("Rate limit storage pool error: {0}")]
    Pool(String),

    #[error("Rate limit storage error: {0}")]
    Storage(#[from] redis::RedisError),
}
