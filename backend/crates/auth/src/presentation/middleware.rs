//! Auth Middleware
//!
//! Bearer authentication for protected routes.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};

use crate::application::audit::AuditSink;
use crate::domain::entity::user::User;
use crate::domain::repository::UserRepository;
use crate::error::AuthError;
use crate::presentation::handlers::AuthAppState;

/// The authenticated caller, freshly loaded for this request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Rejects the request unless it carries a valid access token for an
/// active account; on success the user is available as [`CurrentUser`]
pub async fn require_bearer_auth<R, S>(
    State(state): State<AuthAppState<R, S>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let token = bearer.as_ref().map(|TypedHeader(Authorization(b))| b.token());
    let user = state.gate.require_user(token).await?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
