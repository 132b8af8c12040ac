pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{RateLimitAction, RateLimitDecision};
pub use router::security_routes;
pub use services::rate_limit::RateLimiterService;
