// libs/connection-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use security_cell::services::rate_limit::{client_identifier, RateLimitAction, RateLimiterService};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    ConnectionError, CreateInviteRequest, RedeemInviteRequest, RequestConnectionRequest,
    RespondToConnectionRequest,
};
use crate::services::connection::ConnectionService;
use crate::services::invite::InviteService;

fn caller_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid caller identity".to_string()))
}

fn map_connection_error(e: ConnectionError) -> AppError {
    match e {
        ConnectionError::NotFound => AppError::NotFound("Connection not found".to_string()),
        ConnectionError::AlreadyConnected => {
            AppError::Conflict("Patient already has an active care connection".to_string())
        }
        ConnectionError::DuplicatePending => {
            AppError::Conflict("A pending request to this provider already exists".to_string())
        }
        ConnectionError::InviteNotFound => AppError::NotFound("Invite not found".to_string()),
        ConnectionError::InviteExpired => AppError::Conflict("Invite has expired".to_string()),
        ConnectionError::InviteAlreadyUsed => {
            AppError::Conflict("Invite has already been used".to_string())
        }
        ConnectionError::InviteEmailMismatch => {
            AppError::Conflict("Invite was issued to a different patient".to_string())
        }
        ConnectionError::InvalidStatusTransition(status) => AppError::Conflict(format!(
            "Connection cannot be modified in current status: {}",
            status
        )),
        ConnectionError::Unauthorized => AppError::Auth("Not authorized".to_string()),
        ConnectionError::ValidationError(msg) => AppError::BadRequest(msg),
        ConnectionError::DatabaseError(msg) => AppError::Database(msg),
    }
}

async fn enforce_rate_limit(
    state: &AppConfig,
    headers: &HeaderMap,
    user: &User,
    action: RateLimitAction,
) -> Result<(), AppError> {
    let limiter = RateLimiterService::new(state);
    let decision = limiter
        .check(&client_identifier(headers, Some(user)), action)
        .await;
    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        });
    }
    Ok(())
}

// ==============================================================================
// CONNECTION HANDLERS
// ==============================================================================

/// RequestConnection: patient-only, rate limited.
#[axum::debug_handler]
pub async fn request_connection(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<RequestConnectionRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_patient() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    let patient_id = caller_uuid(&user)?;

    enforce_rate_limit(&state, &headers, &user, RateLimitAction::ConnectionRequest).await?;

    let service = ConnectionService::new(&state);
    let connection = service
        .request_connection(patient_id, request, auth.token())
        .await
        .map_err(map_connection_error)?;

    Ok(Json(json!({
        "success": true,
        "connection": connection,
        "message": "Connection requested, awaiting provider response"
    })))
}

/// RespondToConnection: provider-only, on one pending request.
#[axum::debug_handler]
pub async fn respond_to_connection(
    State(state): State<Arc<AppConfig>>,
    Path(connection_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RespondToConnectionRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    let provider_id = caller_uuid(&user)?;

    let service = ConnectionService::new(&state);
    let connection = service
        .respond_to_connection(provider_id, connection_id, request.action, auth.token())
        .await
        .map_err(map_connection_error)?;

    Ok(Json(json!({
        "success": true,
        "connection": connection
    })))
}

/// End an active connection; either party.
#[axum::debug_handler]
pub async fn disconnect_connection(
    State(state): State<Arc<AppConfig>>,
    Path(connection_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller_id = caller_uuid(&user)?;

    let service = ConnectionService::new(&state);
    let connection = service
        .disconnect(caller_id, connection_id, auth.token())
        .await
        .map_err(map_connection_error)?;

    Ok(Json(json!({
        "success": true,
        "connection": connection
    })))
}

/// The patient's current active connection, if any.
#[axum::debug_handler]
pub async fn get_current_connection(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_patient() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    let patient_id = caller_uuid(&user)?;

    let service = ConnectionService::new(&state);
    let connection = service
        .get_active_for_patient(patient_id, auth.token())
        .await
        .map_err(map_connection_error)?;

    Ok(Json(json!({ "connection": connection })))
}

/// Pending requests awaiting this provider's response.
#[axum::debug_handler]
pub async fn list_pending_connections(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    let provider_id = caller_uuid(&user)?;

    let service = ConnectionService::new(&state);
    let connections = service
        .list_pending_for_provider(provider_id, auth.token())
        .await
        .map_err(map_connection_error)?;

    Ok(Json(json!({ "connections": connections })))
}

// ==============================================================================
// INVITE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_invite(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateInviteRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    let provider_id = caller_uuid(&user)?;

    let service = InviteService::new(&state);
    let invite = service
        .create_invite(provider_id, request, auth.token())
        .await
        .map_err(map_connection_error)?;

    Ok(Json(json!({
        "success": true,
        "invite": invite
    })))
}

#[axum::debug_handler]
pub async fn list_invites(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    let provider_id = caller_uuid(&user)?;

    let service = InviteService::new(&state);
    let invites = service
        .list_invites(provider_id, auth.token())
        .await
        .map_err(map_connection_error)?;

    Ok(Json(json!({ "invites": invites })))
}

/// RedeemInvite: patient-only, rate limited. Double redemption is a
/// conflict error, never a silent no-op.
#[axum::debug_handler]
pub async fn redeem_invite(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<RedeemInviteRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_patient() {
        return Err(AppError::Auth("Not authorized".to_string()));
    }
    let patient_id = caller_uuid(&user)?;

    enforce_rate_limit(&state, &headers, &user, RateLimitAction::InviteRedemption).await?;

    let service = InviteService::new(&state);
    let connection = service
        .redeem_invite(patient_id, user.email.as_deref(), &request.token, auth.token())
        .await
        .map_err(map_connection_error)?;

    Ok(Json(json!({
        "success": true,
        "connection": connection,
        "message": "Invite redeemed, care connection is active"
    })))
}
