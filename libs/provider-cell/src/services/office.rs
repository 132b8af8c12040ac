// libs/provider-cell/src/services/office.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{CreateOfficeRequest, Office, ProviderError};

pub struct OfficeService {
    supabase: Arc<SupabaseClient>,
}

impl OfficeService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn create_office(
        &self,
        provider_id: Uuid,
        request: CreateOfficeRequest,
        auth_token: &str,
    ) -> Result<Office, ProviderError> {
        debug!("Creating office for provider {}", provider_id);

        if request.name.trim().is_empty() {
            return Err(ProviderError::ValidationError(
                "Office name is required".to_string(),
            ));
        }
        if request.address.trim().is_empty() {
            return Err(ProviderError::ValidationError(
                "Office address is required".to_string(),
            ));
        }

        let office_data = json!({
            "provider_id": provider_id,
            "name": request.name.trim(),
            "address": request.address.trim(),
            "is_active": true,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/offices",
                Some(auth_token),
                Some(office_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        parse_single_office(result).ok_or_else(|| {
            ProviderError::DatabaseError("Failed to create office".to_string())
        })
    }

    pub async fn list_offices(
        &self,
        provider_id: Uuid,
        include_inactive: bool,
        auth_token: &str,
    ) -> Result<Vec<Office>, ProviderError> {
        let mut path = format!("/rest/v1/offices?provider_id=eq.{}&order=name.asc", provider_id);
        if !include_inactive {
            path.push_str("&is_active=eq.true");
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|office| {
                serde_json::from_value(office)
                    .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse office: {}", e)))
            })
            .collect()
    }

    pub async fn get_office(
        &self,
        office_id: Uuid,
        auth_token: &str,
    ) -> Result<Office, ProviderError> {
        let path = format!("/rest/v1/offices?id=eq.{}", office_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        parse_single_office(result).ok_or(ProviderError::OfficeNotFound)
    }

    /// Soft-deactivation; offices are never hard-deleted so historic
    /// appointments keep their reference. The provider filter doubles as
    /// the ownership check: zero rows back means not yours or not there.
    pub async fn deactivate_office(
        &self,
        office_id: Uuid,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Office, ProviderError> {
        debug!("Deactivating office {} for provider {}", office_id, provider_id);

        let path = format!(
            "/rest/v1/offices?id=eq.{}&provider_id=eq.{}",
            office_id, provider_id
        );
        let update = json!({
            "is_active": false,
            "updated_at": Utc::now().to_rfc3339(),
        });

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
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        parse_single_office(result).ok_or(ProviderError::OfficeNotFound)
    }
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn parse_single_office(result: Vec<Value>) -> Option<Office> {
    result
        .into_iter()
        .next()
        .and_then(|office| serde_json::from_value(office).ok())
}
