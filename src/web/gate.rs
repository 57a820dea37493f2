//! Route gates.
//!
//! Each gate middleware resolves the session identity through
//! [`access::restrict_to`](crate::core::access::restrict_to) for its role set, confirms the
//! account still exists and is active, and stores the resulting [`AuthContext`] in the
//! request extensions where the [`Auth`] extractor picks it up.

use super::AppState;
use super::session;
use crate::core::access::{self, AuthContext, Role};
use crate::core::auth;
use crate::entities::User;
use crate::errors::{Error, Result};
use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sea_orm::EntityTrait;
use tower_sessions::Session;
use tracing::{debug, info};

/// Resolves the caller for `allowed`.
///
/// A session whose user was deleted or deactivated is flushed and treated as anonymous. When the
/// user's role changed since login the stored identity is rebuilt from the row, so access always
/// follows the current role.
pub async fn resolve(state: &AppState, session: &Session, allowed: &[Role]) -> Result<AuthContext> {
    let Some(stored) = session::identity(session).await? else {
        return access::restrict_to(None, allowed);
    };
    let user = match User::find_by_id(stored.user_id).one(&state.db).await? {
        Some(user) if user.is_active => user,
        _ => {
            info!("Dropping session of inactive user {}", stored.user_id);
            session::clear(session).await?;
            return Err(Error::Unauthenticated);
        }
    };
    let identity = if user.role_id == stored.role_id {
        stored
    } else {
        let current = auth::session_identity(&state.db, &user).await?;
        info!(
            "Role of user {} changed from {} to {}",
            user.id, stored.role_name, current.role_name
        );
        session::refresh(session, &current).await?;
        current
    };
    access::restrict_to(Some(&identity), allowed)
}

async fn gate(
    state: &AppState,
    session: &Session,
    mut request: Request,
    next: Next,
    allowed: &[Role],
) -> Response {
    match resolve(state, session, allowed).await {
        Ok(ctx) => {
            debug!("{} {} as {} ({})", request.method(), request.uri().path(), ctx.user_id, ctx.role);
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Any logged-in role.
pub async fn signed_in(State(state): State<AppState>, session: Session, request: Request, next: Next) -> Response {
    gate(&state, &session, request, next, &Role::ALL).await
}

/// Admin and Super Admin.
pub async fn admins(State(state): State<AppState>, session: Session, request: Request, next: Next) -> Response {
    gate(&state, &session, request, next, access::ADMINS).await
}

/// Teachers, plus administrators.
pub async fn teachers(State(state): State<AppState>, session: Session, request: Request, next: Next) -> Response {
    gate(&state, &session, request, next, access::TEACHERS).await
}

/// Students only.
pub async fn students(State(state): State<AppState>, session: Session, request: Request, next: Next) -> Response {
    gate(&state, &session, request, next, access::STUDENTS).await
}

/// Finance Officers, plus administrators.
pub async fn finance(State(state): State<AppState>, session: Session, request: Request, next: Next) -> Response {
    gate(&state, &session, request, next, access::FINANCE).await
}

/// The caller's [`AuthContext`].
///
/// Taken from the gate when one ran; otherwise resolved on the spot for any role.
pub struct Auth(pub AuthContext);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(ctx) = parts.extensions.get::<AuthContext>() {
            return Ok(Self(ctx.clone()));
        }
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| Error::Session {
                message: message.to_string(),
            })?;
        resolve(state, &session, &Role::ALL).await.map(Self)
    }
}
