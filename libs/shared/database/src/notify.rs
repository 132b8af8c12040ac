use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::supabase::SupabaseClient;

/// Outbound notifications are best-effort: a failed send is logged and
/// swallowed, never rolling back the state change that triggered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub reference_id: Option<Uuid>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentRequested,
    AppointmentConfirmed,
    AppointmentRescheduled,
    AppointmentRejected,
    AppointmentCancelled,
    ConnectionRequested,
    ConnectionAccepted,
    ConnectionRejected,
    ConnectionDisconnected,
    InviteRedeemed,
}

pub struct NotificationClient {
    supabase: Arc<SupabaseClient>,
}

impl NotificationClient {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Fire-and-forget delivery: the insert runs on its own task so the
    /// caller's response never waits on it.
    pub fn send(&self, notification: Notification, auth_token: &str) {
        let supabase = Arc::clone(&self.supabase);
        let token = auth_token.to_string();

        tokio::spawn(async move {
            let payload = json!({
                "recipient_id": notification.recipient_id,
                "kind": notification.kind,
                "reference_id": notification.reference_id,
                "body": notification.body,
                "created_at": chrono::Utc::now().to_rfc3339(),
            });

            match supabase
                .request::<Vec<Value>>(
                    Method::POST,
                    "/rest/v1/notifications",
                    Some(&token),
                    Some(payload),
                )
                .await
            {
                Ok(_) => debug!(
                    "Notification {:?} delivered to {}",
                    notification.kind, notification.recipient_id
                ),
                Err(e) => warn!(
                    "Notification {:?} to {} failed (ignored): {}",
                    notification.kind, notification.recipient_id, e
                ),
            }
        });
    }
}
