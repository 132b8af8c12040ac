// libs/connection-cell/src/services/invite.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::notify::{Notification, NotificationKind};
use shared_database::supabase::{DbError, SupabaseClient};

use crate::models::{
    Connection, ConnectionError, ConnectionInitiator, ConnectionStatus, CreateInviteRequest,
    InviteStatus, InviteToken,
};
use crate::services::connection::{
    parse_single_connection, representation_headers, ConnectionService,
};

const TOKEN_LENGTH: usize = 32;
const DEFAULT_EXPIRY_HOURS: i64 = 24 * 7;

pub struct InviteService {
    connections: ConnectionService,
}

impl InviteService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            connections: ConnectionService::new(config),
        }
    }

    fn supabase(&self) -> &Arc<SupabaseClient> {
        self.connections.client()
    }

    /// Mint a single-use invite token, optionally pinned to one patient
    /// email.
    pub async fn create_invite(
        &self,
        provider_id: Uuid,
        request: CreateInviteRequest,
        auth_token: &str,
    ) -> Result<InviteToken, ConnectionError> {
        let expires_in_hours = request.expires_in_hours.unwrap_or(DEFAULT_EXPIRY_HOURS);
        if expires_in_hours <= 0 {
            return Err(ConnectionError::ValidationError(
                "Invite expiry must be in the future".to_string(),
            ));
        }

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        let now = Utc::now();
        let invite_data = json!({
            "provider_id": provider_id,
            "token": token,
            "patient_email": request.patient_email,
            "message": request.message,
            "expires_at": (now + Duration::hours(expires_in_hours)).to_rfc3339(),
            "status": InviteStatus::Active,
            "redeemed_by": null,
            "redeemed_at": null,
            "created_at": now.to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase()
            .request_with_headers(
                Method::POST,
                "/rest/v1/connection_invites",
                Some(auth_token),
                Some(invite_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ConnectionError::DatabaseError(e.to_string()))?;

        let invite = parse_single_invite(result).ok_or_else(|| {
            ConnectionError::DatabaseError("Failed to create invite".to_string())
        })?;

        info!("Provider {} created invite {}", provider_id, invite.id);
        Ok(invite)
    }

    pub async fn list_invites(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<InviteToken>, ConnectionError> {
        let path = format!(
            "/rest/v1/connection_invites?provider_id=eq.{}&order=created_at.desc",
            provider_id
        );

        let result: Vec<Value> = self
            .supabase()
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ConnectionError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    ConnectionError::DatabaseError(format!("Failed to parse invite: {}", e))
                })
            })
            .collect()
    }

    /// RedeemInvite: validate, consume the token exactly once, then
    /// create the active connection directly (no pending stage).
    ///
    /// The consume step is a compare-and-swap on `status = active`; of
    /// two concurrent redemptions exactly one wins and the loser gets a
    /// conflict error, never a silent no-op. If the connection insert
    /// then loses the single-active race, the token is returned to
    /// active before the error surfaces.
    pub async fn redeem_invite(
        &self,
        patient_id: Uuid,
        patient_email: Option<&str>,
        token_value: &str,
        auth_token: &str,
    ) -> Result<Connection, ConnectionError> {
        let invite = self.get_invite_by_token(token_value, auth_token).await?;
        let now = Utc::now();

        if invite.status == InviteStatus::Used {
            return Err(ConnectionError::InviteAlreadyUsed);
        }
        if invite.expires_at <= now {
            return Err(ConnectionError::InviteExpired);
        }
        if let Some(target_email) = invite.patient_email.as_deref() {
            let matches = patient_email
                .map(|email| email.eq_ignore_ascii_case(target_email))
                .unwrap_or(false);
            if !matches {
                return Err(ConnectionError::InviteEmailMismatch);
            }
        }

        // Advisory single-active check before consuming the token.
        if self
            .connections
            .get_active_for_patient(patient_id, auth_token)
            .await?
            .is_some()
        {
            return Err(ConnectionError::AlreadyConnected);
        }

        self.consume_invite(&invite, patient_id, now, auth_token)
            .await?;

        let connection_data = json!({
            "patient_id": patient_id,
            "provider_id": invite.provider_id,
            "status": ConnectionStatus::Active,
            "initiated_by": ConnectionInitiator::ProviderInvite,
            "message": invite.message,
            "responded_at": now.to_rfc3339(),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let insert_result: Result<Vec<Value>, DbError> = self
            .supabase()
            .request_with_headers(
                Method::POST,
                "/rest/v1/connections",
                Some(auth_token),
                Some(connection_data),
                Some(representation_headers()),
            )
            .await;

        let connection = match insert_result {
            Ok(result) => parse_single_connection(result).ok_or_else(|| {
                ConnectionError::DatabaseError("Failed to create connection".to_string())
            })?,
            Err(e) => {
                // The patient connected elsewhere between our check and
                // this insert; put the token back before reporting.
                self.restore_invite(&invite, auth_token).await;
                return Err(match e {
                    DbError::Conflict(_) => ConnectionError::AlreadyConnected,
                    other => ConnectionError::DatabaseError(other.to_string()),
                });
            }
        };

        info!(
            "Invite {} redeemed by patient {} for provider {}",
            invite.id, patient_id, invite.provider_id
        );

        self.connections.notifications().send(
            Notification {
                recipient_id: invite.provider_id,
                kind: NotificationKind::InviteRedeemed,
                reference_id: Some(connection.id),
                body: "Your invite was redeemed; the care connection is active".to_string(),
            },
            auth_token,
        );

        Ok(connection)
    }

    async fn get_invite_by_token(
        &self,
        token_value: &str,
        auth_token: &str,
    ) -> Result<InviteToken, ConnectionError> {
        let path = format!("/rest/v1/connection_invites?token=eq.{}&limit=1", token_value);

        let result: Vec<Value> = self
            .supabase()
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ConnectionError::DatabaseError(e.to_string()))?;

        parse_single_invite(result).ok_or(ConnectionError::InviteNotFound)
    }

    /// CAS on `status = active`; zero rows back means another redemption
    /// got there first.
    async fn consume_invite(
        &self,
        invite: &InviteToken,
        patient_id: Uuid,
        now: chrono::DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), ConnectionError> {
        let path = format!(
            "/rest/v1/connection_invites?id=eq.{}&status=eq.active",
            invite.id
        );
        let update = json!({
            "status": InviteStatus::Used,
            "redeemed_by": patient_id,
            "redeemed_at": now.to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase()
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ConnectionError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            debug!("Invite {} lost the redemption race", invite.id);
            return Err(ConnectionError::InviteAlreadyUsed);
        }

        Ok(())
    }

    /// Best-effort compensation when the connection insert fails after
    /// the token was consumed.
    async fn restore_invite(&self, invite: &InviteToken, auth_token: &str) {
        let path = format!("/rest/v1/connection_invites?id=eq.{}", invite.id);
        let update = json!({
            "status": InviteStatus::Active,
            "redeemed_by": null,
            "redeemed_at": null,
        });

        if let Err(e) = self
            .supabase()
            .request::<Vec<Value>>(Method::PATCH, &path, Some(auth_token), Some(update))
            .await
        {
            warn!("Failed to restore invite {} after rollback: {}", invite.id, e);
        }
    }
}

fn parse_single_invite(result: Vec<Value>) -> Option<InviteToken> {
    result
        .into_iter()
        .next()
        .and_then(|invite| serde_json::from_value(invite).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(status: InviteStatus, expires_in_hours: i64) -> InviteToken {
        InviteToken {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            token: "t".repeat(TOKEN_LENGTH),
            patient_email: None,
            message: None,
            expires_at: Utc::now() + Duration::hours(expires_in_hours),
            status,
            redeemed_by: None,
            redeemed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn active_unexpired_invite_is_redeemable() {
        assert!(invite(InviteStatus::Active, 1).is_redeemable(Utc::now()));
    }

    #[test]
    fn used_invite_is_not_redeemable() {
        assert!(!invite(InviteStatus::Used, 1).is_redeemable(Utc::now()));
    }

    #[test]
    fn expired_invite_is_not_redeemable() {
        assert!(!invite(InviteStatus::Active, -1).is_redeemable(Utc::now()));
    }
}
