pub mod auth;
pub mod error;
mod users;
pub mod validation;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::require_identity;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password));

    // Routes that act on the caller's own account
    let user_routes = Router::new()
        .route("/user", get(users::get_user))
        .route("/user/:username", put(users::update_user))
        .route("/userdelete", delete(users::delete_user))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes)
        .merge(user_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
