// libs/security-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::RateLimitCheckRequest;
use crate::services::rate_limit::{client_identifier, RateLimiterService};

/// CheckRateLimit: check-and-increment for the caller (or, for admins,
/// an arbitrary identifier). Returns the decision rather than erroring
/// on deny so gateway callers can shape their own response.
#[axum::debug_handler]
pub async fn check_rate_limit(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<RateLimitCheckRequest>,
) -> Result<Json<Value>, AppError> {
    // Only admins may count against someone else's identifier.
    let identifier = match request.identifier {
        Some(identifier) if user.is_admin() => identifier,
        Some(_) => return Err(AppError::Auth("Not authorized".to_string())),
        None => client_identifier(&headers, Some(&user)),
    };

    let limiter = RateLimiterService::new(&state);
    let decision = limiter.check(&identifier, request.action).await;

    Ok(Json(json!({
        "action": request.action,
        "decision": decision
    })))
}
