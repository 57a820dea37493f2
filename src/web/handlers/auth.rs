//! Login, registration, logout and password reset.

use crate::core::auth::{self, Authenticated, Registration};
use crate::errors::{Error, Result};
use crate::web::AppState;
use crate::web::respond::{Flow, Payload, View};
use crate::web::session;
use axum::Router;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
        .route("/logout", post(logout))
        .route("/forgot-password", get(forgot_page).post(forgot_password))
        .route("/reset-password/:token", get(reset_page).post(reset_password))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotForm {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetForm {
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
}

fn check_confirmation(password: &str, confirm: Option<&str>) -> Result<()> {
    match confirm {
        Some(confirm) if confirm != password => Err(Error::validation("Passwords do not match")),
        _ => Ok(()),
    }
}

/// First `X-Forwarded-For` hop, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

/// Browsers that are already logged in skip the auth forms.
async fn already_signed_in(view: &View) -> Result<bool> {
    Ok(view.flow() == Flow::Page && session::identity(view.session()).await?.is_some())
}

async fn login_page(view: View) -> Result<Response> {
    if already_signed_in(&view).await? {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    view.page("auth/login", &json!({})).await
}

async fn login(
    State(state): State<AppState>,
    view: View,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Payload(form): Payload<LoginForm>,
) -> Result<Response> {
    let ip = client_ip(&headers, peer);
    let Authenticated { user, identity } =
        auth::authenticate(&state.db, &form.email, &form.password, ip.as_deref()).await?;
    session::establish(view.session(), &identity).await?;
    view.done(
        &format!("Welcome back, {}", user.name),
        "/dashboard",
        &json!({ "user": user, "role": identity.role_name }),
    )
    .await
}

async fn register_page(view: View) -> Result<Response> {
    if already_signed_in(&view).await? {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    view.page("auth/register", &json!({})).await
}

async fn register(
    State(state): State<AppState>,
    view: View,
    Payload(form): Payload<RegisterForm>,
) -> Result<Response> {
    check_confirmation(&form.password, form.confirm_password.as_deref())?;
    let user = auth::register(
        &state.db,
        &state.config.auth,
        Registration {
            name: form.name,
            email: form.email,
            password: form.password,
        },
    )
    .await?;
    let identity = auth::session_identity(&state.db, &user).await?;
    session::establish(view.session(), &identity).await?;
    view.created(
        "Registration successful",
        "/dashboard",
        &json!({ "user": user, "role": identity.role_name }),
    )
    .await
}

async fn logout(State(state): State<AppState>, view: View) -> Result<Response> {
    if let Some(identity) = session::identity(view.session()).await? {
        auth::logout(&state.db, &identity).await;
    }
    session::clear(view.session()).await?;
    view.done("You have been logged out", "/auth/login", &json!({})).await
}

async fn forgot_page(view: View) -> Result<Response> {
    view.page("auth/forgot-password", &json!({})).await
}

async fn forgot_password(
    State(state): State<AppState>,
    view: View,
    Payload(form): Payload<ForgotForm>,
) -> Result<Response> {
    let request = auth::issue_reset_token(
        &state.db,
        &state.config.auth,
        &state.config.server.public_host,
        &form.email,
    )
    .await?;
    if let Some(delivery) = &request.delivery {
        info!(
            user_id = delivery.user_id,
            email = %delivery.email,
            link = %delivery.link,
            expires_at = %delivery.expires_at,
            "Password reset email"
        );
    }
    view.done(request.message, "/auth/login", &json!({})).await
}

async fn reset_page(
    State(state): State<AppState>,
    view: View,
    Path(token): Path<String>,
) -> Result<Response> {
    auth::validate_reset_token(&state.db, &token).await?;
    view.page("auth/reset-password", &json!({ "token": token })).await
}

async fn reset_password(
    State(state): State<AppState>,
    view: View,
    Path(token): Path<String>,
    Payload(form): Payload<ResetForm>,
) -> Result<Response> {
    check_confirmation(&form.password, form.confirm_password.as_deref())?;
    auth::consume_reset_token(&state.db, &state.config.auth, &token, &form.password).await?;
    view.done(
        "Password has been reset. Please log in.",
        "/auth/login",
        &json!({}),
    )
    .await
}
