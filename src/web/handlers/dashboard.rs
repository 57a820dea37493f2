use crate::core::{dashboard, users};
use crate::errors::Result;
use crate::web::AppState;
use crate::web::gate::Auth;
use crate::web::respond::{Payload, View};
use crate::web::session;
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

/// Role-specific dashboard.
pub async fn show(State(state): State<AppState>, Auth(ctx): Auth, view: View) -> Result<Response> {
    let board = dashboard::build(&state.db, &ctx, &state.config.dashboard).await?;
    view.page(board.template(), &board).await
}

/// Who the caller is and what their role allows.
pub async fn me(State(state): State<AppState>, Auth(ctx): Auth, view: View) -> Result<Response> {
    let user = users::get_user(&state.db, ctx.user_id).await?;
    view.page(
        "profile",
        &json!({
            "user": user,
            "role": ctx.role,
            "permissions": ctx.permissions(),
            "menu": ctx.menu(),
        }),
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Edits the caller's own name and email.
///
/// The session's display name follows the new name.
pub async fn update_profile(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Payload(form): Payload<ProfileForm>,
) -> Result<Response> {
    let user = users::update_profile(
        &state.db,
        &ctx,
        users::ProfileUpdate {
            name: form.name,
            email: form.email,
        },
    )
    .await?;
    if let Some(mut identity) = session::identity(view.session()).await? {
        identity.display_name.clone_from(&user.name);
        session::establish(view.session(), &identity).await?;
    }
    view.done("Profile updated", "/me", &json!({ "user": user })).await
}
