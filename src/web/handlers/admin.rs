//! Admin area: statistics, reports, the audit trail, users and course moderation.

use super::Paging;
use crate::core::access::Role;
use crate::core::audit::{self, AuditFilter};
use crate::core::courses::{self, CourseFilter, ModerationAction};
use crate::core::dashboard;
use crate::core::reports::{self, DateRange};
use crate::core::users::{self, NewUser, UserFilter, UserUpdate};
use crate::entities::course::CourseStatus;
use crate::errors::{Error, Result};
use crate::web::AppState;
use crate::web::gate::Auth;
use crate::web::respond::{Payload, View};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, put};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/reports", get(report_bundle))
        .route("/audit-logs", get(audit_logs))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", put(update_user).delete(delete_user))
        .route("/courses", get(list_courses))
        .route("/courses/:id/moderate", put(moderate))
}

fn parse_role(name: &str) -> Result<Role> {
    Role::from_name(name).ok_or_else(|| Error::validation(format!("Unknown role '{name}'")))
}

async fn stats(State(state): State<AppState>, view: View) -> Result<Response> {
    let stats = dashboard::system_stats(&state.db).await?;
    view.page("admin/stats", &stats).await
}

#[derive(Debug, Default, Deserialize)]
struct ReportQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

async fn report_bundle(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Query(query): Query<ReportQuery>,
) -> Result<Response> {
    let range = DateRange::new(query.from, query.to)?;
    let bundle = reports::build_reports(&state.db, &ctx, &range).await?;
    view.page("admin/reports", &bundle).await
}

#[derive(Debug, Default, Deserialize)]
struct AuditQuery {
    actor_id: Option<i64>,
    action: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

async fn audit_logs(
    State(state): State<AppState>,
    view: View,
    Query(query): Query<AuditQuery>,
    Query(paging): Query<Paging>,
) -> Result<Response> {
    let filter = AuditFilter {
        actor_id: query.actor_id,
        action: query.action,
        from: query.from,
        to: query.to,
    };
    let page = audit::list(&state.db, &filter, paging.page(), paging.page_size()).await?;
    view.page("admin/audit-logs", &page).await
}

#[derive(Debug, Default, Deserialize)]
struct UserQuery {
    role: Option<String>,
    is_active: Option<bool>,
    search: Option<String>,
}

async fn list_users(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Query(query): Query<UserQuery>,
    Query(paging): Query<Paging>,
) -> Result<Response> {
    let filter = UserFilter {
        role: query.role.as_deref().map(parse_role).transpose()?,
        is_active: query.is_active,
        search: query.search,
    };
    let page = users::list_users(&state.db, &ctx, &filter, paging.page(), paging.page_size()).await?;
    view.page("admin/users", &page).await
}

#[derive(Debug, Deserialize)]
struct NewUserForm {
    name: String,
    email: String,
    password: String,
    role: String,
}

async fn create_user(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Payload(form): Payload<NewUserForm>,
) -> Result<Response> {
    let new_user = NewUser {
        name: form.name,
        email: form.email,
        password: form.password,
        role: parse_role(&form.role)?,
    };
    let user = users::create_user(&state.db, &state.config.auth, &ctx, new_user).await?;
    view.created("User created", "/admin/users", &json!({ "user": user })).await
}

#[derive(Debug, Deserialize)]
struct UserUpdateForm {
    name: Option<String>,
    email: Option<String>,
    role: Option<String>,
    is_active: Option<bool>,
}

async fn update_user(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(user_id): Path<i64>,
    Payload(form): Payload<UserUpdateForm>,
) -> Result<Response> {
    let update = UserUpdate {
        name: form.name,
        email: form.email,
        role: form.role.as_deref().map(parse_role).transpose()?,
        is_active: form.is_active,
    };
    let user = users::update_user(&state.db, &ctx, user_id, update).await?;
    view.done("User updated", "/admin/users", &json!({ "user": user })).await
}

async fn delete_user(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(user_id): Path<i64>,
) -> Result<Response> {
    match users::delete_user(&state.db, &ctx, user_id).await {
        Ok(()) => view.done("User deleted", "/admin/users", &json!({})).await,
        // Referenced accounts stay; offer the deactivation request instead.
        Err(Error::Conflict { message }) => {
            let deactivate = json!({
                "method": "PUT",
                "path": format!("/admin/users/{user_id}"),
                "body": { "is_active": false },
            });
            view.declined(
                StatusCode::CONFLICT,
                &message,
                "/admin/users",
                &json!({ "userId": user_id, "deactivate": deactivate }),
            )
            .await
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CourseQuery {
    status: Option<CourseStatus>,
    teacher_id: Option<i64>,
    search: Option<String>,
}

async fn list_courses(
    State(state): State<AppState>,
    view: View,
    Query(query): Query<CourseQuery>,
    Query(paging): Query<Paging>,
) -> Result<Response> {
    let filter = CourseFilter {
        status: query.status,
        teacher_id: query.teacher_id,
        search: query.search,
    };
    let page = courses::list_courses(&state.db, &filter, paging.page(), paging.page_size()).await?;
    view.page("admin/courses", &page).await
}

#[derive(Debug, Deserialize)]
struct ModerationForm {
    action: String,
    reason: Option<String>,
}

async fn moderate(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(course_id): Path<i64>,
    Payload(form): Payload<ModerationForm>,
) -> Result<Response> {
    let action = ModerationAction::parse(&form.action)?;
    let course = courses::moderate_course(&state.db, &ctx, course_id, action, form.reason).await?;
    view.done(
        &format!("Course is now {}", course.status.as_str()),
        "/admin/courses",
        &json!({ "course": course }),
    )
    .await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use crate::core::access::Role;
    use crate::test_utils::create_test_user;
    use crate::web::testing::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_admin_area_is_closed_to_other_roles() {
        let (app, db) = app().await;
        create_test_user(&db, "Tia", "tia@example.com", Role::Teacher).await.unwrap();
        let cookie = login(&app, "tia@example.com").await;

        let response = send(&app, json_request("GET", "/admin/stats", Some(&cookie), None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["kind"], "forbidden");
    }

    #[tokio::test]
    async fn test_admin_creates_and_lists_users() {
        let (app, db) = app().await;
        create_test_user(&db, "Ada", "ada@example.com", Role::SuperAdmin).await.unwrap();
        let cookie = login(&app, "ada@example.com").await;

        let body = json!({
            "name": "Tom Teacher",
            "email": "tom@example.com",
            "password": "Teach3rPass",
            "role": "teacher",
        });
        let response = send(&app, json_request("POST", "/admin/users", Some(&cookie), Some(body))).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(&app, json_request("GET", "/admin/users?role=Teacher", Some(&cookie), None)).await;
        let page = body_json(response).await;
        assert_eq!(page["data"]["total"], 1);
        assert_eq!(page["data"]["items"][0]["email"], "tom@example.com");

        let stats = body_json(send(&app, json_request("GET", "/admin/stats", Some(&cookie), None)).await).await;
        assert_eq!(stats["data"]["users"]["total"], 2);
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let (app, db) = app().await;
        create_test_user(&db, "Ada", "ada@example.com", Role::Admin).await.unwrap();
        let cookie = login(&app, "ada@example.com").await;

        let body = json!({ "name": "X", "email": "x@example.com", "password": "Passw0rdX", "role": "janitor" });
        let response = send(&app, json_request("POST", "/admin/users", Some(&cookie), Some(body))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reports_reject_inverted_range() {
        let (app, db) = app().await;
        create_test_user(&db, "Ada", "ada@example.com", Role::Admin).await.unwrap();
        let cookie = login(&app, "ada@example.com").await;

        let uri = "/admin/reports?from=2026-03-10&to=2026-03-01";
        let response = send(&app, json_request("GET", uri, Some(&cookie), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, json_request("GET", "/admin/reports", Some(&cookie), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["totalRevenue"], 0.0);
    }

    #[tokio::test]
    async fn test_audit_log_records_logins() {
        let (app, db) = app().await;
        create_test_user(&db, "Ada", "ada@example.com", Role::Admin).await.unwrap();
        let cookie = login(&app, "ada@example.com").await;

        let response = send(&app, json_request("GET", "/admin/audit-logs?action=login", Some(&cookie), None)).await;
        let page = body_json(response).await;
        assert_eq!(page["data"]["total"], 1);
        assert_eq!(page["data"]["items"][0]["action"], "login");
    }

    #[tokio::test]
    async fn test_demoted_admin_loses_admin_area() {
        let (app, db) = app().await;
        create_test_user(&db, "Ada", "ada@example.com", Role::SuperAdmin).await.unwrap();
        let bob = create_test_user(&db, "Bob", "bob@example.com", Role::Admin).await.unwrap();
        let root = login(&app, "ada@example.com").await;
        let bob_cookie = login(&app, "bob@example.com").await;

        let response = send(&app, json_request("GET", "/admin/stats", Some(&bob_cookie), None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let uri = format!("/admin/users/{}", bob.id);
        let response = send(&app, json_request("PUT", &uri, Some(&root), Some(json!({ "role": "Student" })))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, json_request("GET", "/admin/stats", Some(&bob_cookie), None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let me = body_json(send(&app, json_request("GET", "/me", Some(&bob_cookie), None)).await).await;
        assert_eq!(me["data"]["role"], "Student");
    }

    #[tokio::test]
    async fn test_admin_cannot_demote_super_admin() {
        let (app, db) = app().await;
        let root = create_test_user(&db, "Ada", "ada@example.com", Role::SuperAdmin).await.unwrap();
        create_test_user(&db, "Bob", "bob@example.com", Role::Admin).await.unwrap();
        let cookie = login(&app, "bob@example.com").await;

        let uri = format!("/admin/users/{}", root.id);
        let response = send(&app, json_request("PUT", &uri, Some(&cookie), Some(json!({ "role": "Student" })))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = send(&app, json_request("DELETE", &uri, Some(&cookie), None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_deleting_referenced_user_offers_deactivation() {
        let (app, db) = app().await;
        create_test_user(&db, "Ada", "ada@example.com", Role::Admin).await.unwrap();
        let sam = create_test_user(&db, "Sam", "sam@example.com", Role::Student).await.unwrap();
        login(&app, "sam@example.com").await;
        let cookie = login(&app, "ada@example.com").await;

        let uri = format!("/admin/users/{}", sam.id);
        let response = send(&app, json_request("DELETE", &uri, Some(&cookie), None)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["data"]["deactivate"]["path"], uri.as_str());

        let body = json["data"]["deactivate"]["body"].clone();
        let response = send(&app, json_request("PUT", &uri, Some(&cookie), Some(body))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["user"]["is_active"], false);
    }
}
