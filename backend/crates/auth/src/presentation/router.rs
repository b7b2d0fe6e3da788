//! Auth Router

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use std::sync::Arc;

use crate::application::audit::AuditSink;
use crate::application::config::AuthConfig;
use crate::domain::repository::UserRepository;
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::require_bearer_auth;

/// Create the Auth router over any user store and audit sink
pub fn auth_router<R, S>(repo: R, config: AuthConfig, sink: S) -> Router
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    router_with_state(AuthAppState::new(Arc::new(repo), config, Arc::new(sink)))
}

/// Router over prepared state (shared repository, custom role table)
pub fn router_with_state<R, S>(state: AuthAppState<R, S>) -> Router
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let protected = Router::new()
        .route(
            "/me",
            get(handlers::me::<R, S>).patch(handlers::update_me::<R, S>),
        )
        .route("/me/password", post(handlers::change_password::<R, S>))
        .route("/2fa/setup", post(handlers::two_factor_setup::<R, S>))
        .route("/2fa/verify", post(handlers::two_factor_verify::<R, S>))
        .route("/2fa/disable", post(handlers::two_factor_disable::<R, S>))
        .route(
            "/2fa/backup-codes",
            post(handlers::regenerate_backup_codes::<R, S>),
        )
        .route("/users/{id}", delete(handlers::delete_user::<R, S>))
        .route("/users/{id}/role", patch(handlers::update_user_role::<R, S>))
        .route("/users/{id}/status", patch(handlers::update_user_status::<R, S>))
        .route(
            "/users/{id}/permissions",
            patch(handlers::update_user_permissions::<R, S>),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer_auth::<R, S>,
        ));

    Router::new()
        .route("/register", post(handlers::register::<R, S>))
        .route("/login", post(handlers::login::<R, S>))
        .route("/refresh", post(handlers::refresh::<R, S>))
        .route("/logout", post(handlers::logout::<R, S>))
        .merge(protected)
        .with_state(state)
}
