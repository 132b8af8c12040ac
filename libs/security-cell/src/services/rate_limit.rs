// libs/security-cell/src/services/rate_limit.rs
use axum::http::HeaderMap;
use chrono::Utc;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::{AppConfig, RateLimitSettings};
use shared_models::auth::User;

pub use crate::models::{RateLimitAction, RateLimitDecision, RateLimitError};

/// Sliding-window limiter keyed by (identifier, action), backed by a
/// Redis sorted set of hit timestamps.
///
/// Storage trouble of any kind fails OPEN: the request is allowed and a
/// warning is logged. The limiter protects against abuse; it must never
/// become the outage itself.
pub struct RateLimiterService {
    pool: Option<Pool>,
    settings: RateLimitSettings,
}

impl RateLimiterService {
    pub fn new(config: &AppConfig) -> Self {
        let pool = config.redis_url.as_ref().and_then(|url| {
            match Config::from_url(url.clone()).create_pool(Some(Runtime::Tokio1)) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Failed to create rate limit pool, operating fail-open: {}", e);
                    None
                }
            }
        });

        if pool.is_none() {
            debug!("Rate limiting storage not configured, all checks fail open");
        }

        Self {
            pool,
            settings: config.rate_limits.clone(),
        }
    }

    /// Check-and-increment for one identifier and action. Never errors:
    /// a storage failure is logged and the request allowed.
    pub async fn check(&self, identifier: &str, action: RateLimitAction) -> RateLimitDecision {
        let (max_requests, window_secs) = action.rule(&self.settings);

        match self
            .try_check(identifier, action, max_requests, window_secs)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    "Rate limit check for {} ({}) failed open: {}",
                    identifier,
                    action.key_fragment(),
                    e
                );
                RateLimitDecision::allowed(max_requests)
            }
        }
    }

    async fn try_check(
        &self,
        identifier: &str,
        action: RateLimitAction,
        max_requests: u32,
        window_secs: u64,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let pool = self.pool.as_ref().ok_or(RateLimitError::NotConfigured)?;
        let mut conn = pool
            .get()
            .await
            .map_err(|e| RateLimitError::Pool(e.to_string()))?;

        let key = format!("rate:{}:{}", action.key_fragment(), identifier);
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = (window_secs as i64) * 1000;
        let window_start = now_ms - window_ms;

        // Trim hits that slid out of the window, then count the rest.
        let (count,): (u32,) = redis::pipe()
            .atomic()
            .zrembyscore(&key, 0, window_start)
            .ignore()
            .zcard(&key)
            .query_async(&mut conn)
            .await?;

        if count >= max_requests {
            // The oldest surviving hit decides when the window frees up.
            let oldest: Vec<(String, i64)> = conn.zrange_withscores(&key, 0, 0).await?;
            let retry_after_secs = oldest
                .first()
                .map(|(_, ts)| ((ts + window_ms - now_ms) / 1000).max(1) as u64)
                .unwrap_or(window_secs);

            debug!(
                "Rate limit hit for {} ({}): {}/{} in window",
                identifier,
                action.key_fragment(),
                count,
                max_requests
            );
            return Ok(RateLimitDecision::denied(retry_after_secs));
        }

        // Record this hit and keep the key from outliving its window.
        let member = format!("{}-{}", now_ms, Uuid::new_v4());
        redis::pipe()
            .atomic()
            .zadd(&key, member, now_ms)
            .ignore()
            .expire(&key, window_secs as i64)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(RateLimitDecision::allowed(max_requests - count - 1))
    }
}

/// The limiter identifier: the authenticated user when present,
/// otherwise the first hop of `x-forwarded-for`.
pub fn client_identifier(headers: &HeaderMap, user: Option<&User>) -> String {
    if let Some(user) = user {
        return format!("user:{}", user.id);
    }

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "ip:unknown".to_string())
}
