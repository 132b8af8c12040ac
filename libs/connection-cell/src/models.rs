// libs/connection-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CONNECTION MODELS
// ==============================================================================

/// The durable patient-provider care relationship, distinct from any
/// single appointment. A patient holds at most one active connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub status: ConnectionStatus,
    pub initiated_by: ConnectionInitiator,
    pub message: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Active,
    Rejected,
    Disconnected,
}

impl ConnectionStatus {
    /// Terminal for this record; the relationship itself may restart
    /// with a fresh pending request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Rejected | ConnectionStatus::Disconnected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Pending => write!(f, "pending"),
            ConnectionStatus::Active => write!(f, "active"),
            ConnectionStatus::Rejected => write!(f, "rejected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionInitiator {
    PatientRequest,
    ProviderInvite,
}

/// Actions driving connection transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionAction {
    Accept,
    Reject,
    Disconnect,
}

impl fmt::Display for ConnectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionAction::Accept => write!(f, "accept"),
            ConnectionAction::Reject => write!(f, "reject"),
            ConnectionAction::Disconnect => write!(f, "disconnect"),
        }
    }
}

// ==============================================================================
// INVITE MODELS
// ==============================================================================

/// A single-use capability a provider hands to a patient, granting a
/// direct active connection without the request/accept cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteToken {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub token: String,
    pub patient_email: Option<String>,
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub status: InviteStatus,
    pub redeemed_by: Option<Uuid>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InviteToken {
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.status == InviteStatus::Active && self.expires_at > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Active,
    Used,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConnectionRequest {
    pub provider_id: Uuid,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondToConnectionRequest {
    pub action: ConnectionAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInviteRequest {
    pub patient_email: Option<String>,
    pub message: Option<String>,
    /// Defaults to one week.
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemInviteRequest {
    pub token: String,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection not found")]
    NotFound,

    #[error("Patient already has an active care connection")]
    AlreadyConnected,

    #[error("A pending request to this provider already exists")]
    DuplicatePending,

    #[error("Invite not found")]
    InviteNotFound,

    #[error("Invite has expired")]
    InviteExpired,

    #[error("Invite has already been used")]
    InviteAlreadyUsed,

    #[error("Invite was issued to a different patient")]
    InviteEmailMismatch,

    #[error("Connection cannot be modified in current status: {0}")]
    InvalidStatusTransition(ConnectionStatus),

    #[error("Unauthorized access to connection")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
