use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub redis_url: Option<String>,
    pub rate_limits: RateLimitSettings,
}

/// Per-action sliding-window limits. Windows are in seconds.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub registration_max: u32,
    pub registration_window_secs: u64,
    pub connection_request_max: u32,
    pub connection_request_window_secs: u64,
    pub invite_redemption_max: u32,
    pub invite_redemption_window_secs: u64,
    pub appointment_request_max: u32,
    pub appointment_request_window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            registration_max: 5,
            registration_window_secs: 3600,
            connection_request_max: 10,
            connection_request_window_secs: 3600,
            invite_redemption_max: 10,
            invite_redemption_window_secs: 3600,
            appointment_request_max: 30,
            appointment_request_window_secs: 3600,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok(),
            rate_limits: RateLimitSettings::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_rate_limiting_configured(&self) -> bool {
        self.redis_url.is_some()
    }
}

impl RateLimitSettings {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            registration_max: parse_env("RATE_LIMIT_REGISTRATION_MAX", defaults.registration_max),
            registration_window_secs: parse_env(
                "RATE_LIMIT_REGISTRATION_WINDOW_SECS",
                defaults.registration_window_secs,
            ),
            connection_request_max: parse_env(
                "RATE_LIMIT_CONNECTION_MAX",
                defaults.connection_request_max,
            ),
            connection_request_window_secs: parse_env(
                "RATE_LIMIT_CONNECTION_WINDOW_SECS",
                defaults.connection_request_window_secs,
            ),
            invite_redemption_max: parse_env(
                "RATE_LIMIT_INVITE_MAX",
                defaults.invite_redemption_max,
            ),
            invite_redemption_window_secs: parse_env(
                "RATE_LIMIT_INVITE_WINDOW_SECS",
                defaults.invite_redemption_window_secs,
            ),
            appointment_request_max: parse_env(
                "RATE_LIMIT_APPOINTMENT_MAX",
                defaults.appointment_request_max,
            ),
            appointment_request_window_secs: parse_env(
                "RATE_LIMIT_APPOINTMENT_WINDOW_SECS",
                defaults.appointment_request_window_secs,
            ),
        }
    }
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid number, using default", key);
            default
        }),
        Err(_) => default,
    }
}
