// libs/connection-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn connection_routes(state: Arc<AppConfig>) -> Router {
    // All connection operations require authentication
    let protected_routes = Router::new()
        .route("/request", post(handlers::request_connection))
        .route("/current", get(handlers::get_current_connection))
        .route("/pending", get(handlers::list_pending_connections))
        .route("/{connection_id}/respond", post(handlers::respond_to_connection))
        .route("/{connection_id}/disconnect", post(handlers::disconnect_connection))
        .route("/invites", post(handlers::create_invite))
        .route("/invites", get(handlers::list_invites))
        .route("/invites/redeem", post(handlers::redeem_invite))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
