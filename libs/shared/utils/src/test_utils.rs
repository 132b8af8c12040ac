use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, RateLimitSettings};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub redis_url: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            redis_url: None,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            redis_url: self.redis_url.clone(),
            rate_limits: RateLimitSettings::default(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn provider(email: &str) -> Self {
        Self::new(email, "provider")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockStoreResponses;

impl MockStoreResponses {
    pub fn office_response(office_id: &str, provider_id: &str) -> serde_json::Value {
        json!({
            "id": office_id,
            "provider_id": provider_id,
            "name": "Main Street Practice",
            "address": "12 Main Street",
            "is_active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn weekly_schedule_response(
        provider_id: &str,
        office_id: &str,
        day_of_week: i32,
        start: &str,
        end: &str,
        slot_minutes: i32,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "office_id": office_id,
            "day_of_week": day_of_week,
            "start_time": start,
            "end_time": end,
            "slot_minutes": slot_minutes,
            "is_active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        patient_id: &str,
        provider_id: &str,
        office_id: &str,
        date: &str,
        start: &str,
        end: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "patient_id": patient_id,
            "provider_id": provider_id,
            "office_id": office_id,
            "confirmed_office_id": null,
            "appointment_date": date,
            "start_time": start,
            "end_time": end,
            "status": status,
            "visit_type": "follow_up",
            "patient_notes": null,
            "provider_notes": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn connection_response(
        connection_id: &str,
        patient_id: &str,
        provider_id: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": connection_id,
            "patient_id": patient_id,
            "provider_id": provider_id,
            "status": status,
            "initiated_by": "patient_request",
            "message": null,
            "responded_at": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn invite_response(
        invite_id: &str,
        provider_id: &str,
        token: &str,
        status: &str,
        expires_at: &str,
    ) -> serde_json::Value {
        json!({
            "id": invite_id,
            "provider_id": provider_id,
            "token": token,
            "patient_email": null,
            "message": null,
            "expires_at": expires_at,
            "status": status,
            "redeemed_by": null,
            "redeemed_at": null,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }
}
