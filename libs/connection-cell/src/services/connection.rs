// libs/connection-cell/src/services/connection.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::notify::{Notification, NotificationClient, NotificationKind};
use shared_database::supabase::{DbError, SupabaseClient};

use crate::models::{
    Connection, ConnectionAction, ConnectionError, ConnectionInitiator, ConnectionStatus,
    RequestConnectionRequest,
};

/// Transition table for the connection state machine. Pending requests
/// resolve exactly once; active connections end only through explicit
/// disconnection; terminal records allow a fresh pending to be created.
pub fn connection_transition(
    current: &ConnectionStatus,
    action: &ConnectionAction,
) -> Result<ConnectionStatus, ConnectionError> {
    match (current, action) {
        (ConnectionStatus::Pending, ConnectionAction::Accept) => Ok(ConnectionStatus::Active),
        (ConnectionStatus::Pending, ConnectionAction::Reject) => Ok(ConnectionStatus::Rejected),
        (ConnectionStatus::Active, ConnectionAction::Disconnect) => {
            Ok(ConnectionStatus::Disconnected)
        }
        (status, action) => {
            warn!("Illegal connection transition: {} on {}", action, status);
            Err(ConnectionError::InvalidStatusTransition(status.clone()))
        }
    }
}

pub struct ConnectionService {
    supabase: Arc<SupabaseClient>,
    notifications: NotificationClient,
}

impl ConnectionService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            notifications: NotificationClient::new(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// RequestConnection: patient names a provider. Refused while the
    /// patient holds an active connection anywhere, or a pending request
    /// to this same provider. Pending requests to *other* providers are
    /// allowed and resolve independently.
    pub async fn request_connection(
        &self,
        patient_id: Uuid,
        request: RequestConnectionRequest,
        auth_token: &str,
    ) -> Result<Connection, ConnectionError> {
        info!(
            "Connection request from patient {} to provider {}",
            patient_id, request.provider_id
        );

        // Advisory reads for fast feedback; the store's constraints
        // settle write-time races.
        if self
            .get_active_for_patient(patient_id, auth_token)
            .await?
            .is_some()
        {
            return Err(ConnectionError::AlreadyConnected);
        }

        let pending_path = format!(
            "/rest/v1/connections?patient_id=eq.{}&provider_id=eq.{}&status=eq.pending&limit=1",
            patient_id, request.provider_id
        );
        let pending: Vec<Value> = self
            .supabase
            .request(Method::GET, &pending_path, Some(auth_token), None)
            .await
            .map_err(|e| ConnectionError::DatabaseError(e.to_string()))?;
        if !pending.is_empty() {
            return Err(ConnectionError::DuplicatePending);
        }

        let now = Utc::now();
        let connection_data = json!({
            "patient_id": patient_id,
            "provider_id": request.provider_id,
            "status": ConnectionStatus::Pending,
            "initiated_by": ConnectionInitiator::PatientRequest,
            "message": request.message,
            "responded_at": null,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/connections",
                Some(auth_token),
                Some(connection_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => ConnectionError::DuplicatePending,
                other => ConnectionError::DatabaseError(other.to_string()),
            })?;

        let connection = parse_single_connection(result).ok_or_else(|| {
            ConnectionError::DatabaseError("Failed to create connection request".to_string())
        })?;

        self.notifications.send(
            Notification {
                recipient_id: connection.provider_id,
                kind: NotificationKind::ConnectionRequested,
                reference_id: Some(connection.id),
                body: "A patient has requested to join your care".to_string(),
            },
            auth_token,
        );

        Ok(connection)
    }

    /// RespondToConnection: provider accepts or rejects one pending
    /// request. Accepting leaves the patient's pending requests to other
    /// providers untouched; they resolve on their own.
    pub async fn respond_to_connection(
        &self,
        provider_id: Uuid,
        connection_id: Uuid,
        action: ConnectionAction,
        auth_token: &str,
    ) -> Result<Connection, ConnectionError> {
        if !matches!(action, ConnectionAction::Accept | ConnectionAction::Reject) {
            return Err(ConnectionError::ValidationError(
                "Response must be accept or reject".to_string(),
            ));
        }

        let connection = self.get_connection(connection_id, auth_token).await?;
        if connection.provider_id != provider_id {
            return Err(ConnectionError::Unauthorized);
        }

        let next_status = connection_transition(&connection.status, &action)?;

        info!(
            "Provider {} responding {} to connection {}",
            provider_id, action, connection_id
        );

        let now = Utc::now();
        let update = json!({
            "status": next_status,
            "responded_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        // Guarded write: only a still-pending row transitions. Accepting
        // can also trip the single-active index if the patient connected
        // elsewhere since our read.
        let path = format!(
            "/rest/v1/connections?id=eq.{}&status=eq.{}",
            connection_id,
            ConnectionStatus::Pending
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
            .map_err(|e| match e {
                DbError::Conflict(_) => ConnectionError::AlreadyConnected,
                other => ConnectionError::DatabaseError(other.to_string()),
            })?;

        let updated = parse_single_connection(result).ok_or_else(|| {
            warn!("Connection {} changed concurrently during respond", connection_id);
            ConnectionError::InvalidStatusTransition(connection.status.clone())
        })?;

        let kind = match action {
            ConnectionAction::Accept => NotificationKind::ConnectionAccepted,
            _ => NotificationKind::ConnectionRejected,
        };
        self.notifications.send(
            Notification {
                recipient_id: updated.patient_id,
                kind,
                reference_id: Some(updated.id),
                body: format!("Your connection request was {}", updated.status),
            },
            auth_token,
        );

        Ok(updated)
    }

    /// Disconnect an active connection; either party may end it. The
    /// relationship can later restart with a fresh pending request.
    pub async fn disconnect(
        &self,
        caller_id: Uuid,
        connection_id: Uuid,
        auth_token: &str,
    ) -> Result<Connection, ConnectionError> {
        let connection = self.get_connection(connection_id, auth_token).await?;

        if connection.patient_id != caller_id && connection.provider_id != caller_id {
            return Err(ConnectionError::Unauthorized);
        }

        let next_status = connection_transition(&connection.status, &ConnectionAction::Disconnect)?;

        let now = Utc::now();
        let update = json!({
            "status": next_status,
            "updated_at": now.to_rfc3339(),
        });

        let path = format!(
            "/rest/v1/connections?id=eq.{}&status=eq.{}",
            connection_id,
            ConnectionStatus::Active
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
            .map_err(|e| ConnectionError::DatabaseError(e.to_string()))?;

        let updated = parse_single_connection(result).ok_or_else(|| {
            ConnectionError::InvalidStatusTransition(connection.status.clone())
        })?;

        let counterparty = if caller_id == updated.patient_id {
            updated.provider_id
        } else {
            updated.patient_id
        };
        self.notifications.send(
            Notification {
                recipient_id: counterparty,
                kind: NotificationKind::ConnectionDisconnected,
                reference_id: Some(updated.id),
                body: "The care connection has ended".to_string(),
            },
            auth_token,
        );

        Ok(updated)
    }

    pub async fn get_connection(
        &self,
        connection_id: Uuid,
        auth_token: &str,
    ) -> Result<Connection, ConnectionError> {
        let path = format!("/rest/v1/connections?id=eq.{}", connection_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ConnectionError::DatabaseError(e.to_string()))?;

        parse_single_connection(result).ok_or(ConnectionError::NotFound)
    }

    pub async fn get_active_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Connection>, ConnectionError> {
        let path = format!(
            "/rest/v1/connections?patient_id=eq.{}&status=eq.active&limit=1",
            patient_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ConnectionError::DatabaseError(e.to_string()))?;

        Ok(parse_single_connection(result))
    }

    pub async fn list_pending_for_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Connection>, ConnectionError> {
        let path = format!(
            "/rest/v1/connections?provider_id=eq.{}&status=eq.pending&order=created_at.asc",
            provider_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ConnectionError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    ConnectionError::DatabaseError(format!("Failed to parse connection: {}", e))
                })
            })
            .collect()
    }

    pub(crate) fn notifications(&self) -> &NotificationClient {
        &self.notifications
    }

    pub(crate) fn client(&self) -> &Arc<SupabaseClient> {
        &self.supabase
    }
}

pub(crate) fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

pub(crate) fn parse_single_connection(result: Vec<Value>) -> Option<Connection> {
    result
        .into_iter()
        .next()
        .and_then(|connection| serde_json::from_value(connection).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pending_resolves_to_active_or_rejected() {
        assert_eq!(
            connection_transition(&ConnectionStatus::Pending, &ConnectionAction::Accept).unwrap(),
            ConnectionStatus::Active
        );
        assert_eq!(
            connection_transition(&ConnectionStatus::Pending, &ConnectionAction::Reject).unwrap(),
            ConnectionStatus::Rejected
        );
    }

    #[test]
    fn active_exits_only_through_disconnect() {
        assert_eq!(
            connection_transition(&ConnectionStatus::Active, &ConnectionAction::Disconnect)
                .unwrap(),
            ConnectionStatus::Disconnected
        );
        assert_matches!(
            connection_transition(&ConnectionStatus::Active, &ConnectionAction::Accept),
            Err(ConnectionError::InvalidStatusTransition(_))
        );
        assert_matches!(
            connection_transition(&ConnectionStatus::Active, &ConnectionAction::Reject),
            Err(ConnectionError::InvalidStatusTransition(_))
        );
    }

    #[test]
    fn terminal_records_accept_nothing() {
        for status in [ConnectionStatus::Rejected, ConnectionStatus::Disconnected] {
            for action in [
                ConnectionAction::Accept,
                ConnectionAction::Reject,
                ConnectionAction::Disconnect,
            ] {
                assert_matches!(
                    connection_transition(&status, &action),
                    Err(ConnectionError::InvalidStatusTransition(_))
                );
            }
        }
    }

    #[test]
    fn pending_cannot_be_disconnected() {
        assert_matches!(
            connection_transition(&ConnectionStatus::Pending, &ConnectionAction::Disconnect),
            Err(ConnectionError::InvalidStatusTransition(ConnectionStatus::Pending))
        );
    }
}
