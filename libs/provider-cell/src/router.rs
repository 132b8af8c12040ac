// libs/provider-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn provider_routes(state: Arc<AppConfig>) -> Router {
    // All provider operations require authentication
    let protected_routes = Router::new()
        .route("/offices", post(handlers::create_office))
        .route("/offices", get(handlers::list_offices))
        .route("/offices/{office_id}/deactivate", post(handlers::deactivate_office))
        .route("/schedules", post(handlers::create_schedule))
        .route("/schedules", get(handlers::list_schedules))
        .route("/schedules/{schedule_id}", patch(handlers::update_schedule))
        .route("/schedules/{schedule_id}/deactivate", post(handlers::deactivate_schedule))
        .route("/unavailability", post(handlers::create_unavailability))
        .route("/unavailability/{period_id}", delete(handlers::delete_unavailability))
        .route("/slots", get(handlers::get_available_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
