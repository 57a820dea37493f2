//! Course catalogue and course management.
//!
//! Only the catalogue is public. The other routes need a session; which roles may do what
//! is decided by the course operations themselves.

use super::{Paging, optional};
use crate::core::assignments;
use crate::core::courses::{self, CourseFilter, CourseUpdate, NewCourse};
use crate::entities::course::CourseStatus;
use crate::errors::Result;
use crate::web::AppState;
use crate::web::gate::{self, Auth};
use crate::web::respond::{Payload, View};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;

pub fn routes(state: &AppState) -> Router<AppState> {
    let signed_in = || middleware::from_fn_with_state(state.clone(), gate::signed_in);
    Router::new()
        .route("/", get(catalogue).merge(post(create).route_layer(signed_in())))
        .route("/:id", get(show).put(update).delete(remove).route_layer(signed_in()))
        .route("/:id/students", get(students).route_layer(signed_in()))
        .route("/:id/assignments", get(course_assignments).route_layer(signed_in()))
}

#[derive(Debug, Default, Deserialize)]
struct CatalogueQuery {
    search: Option<String>,
    #[serde(default, deserialize_with = "optional")]
    teacher_id: Option<i64>,
}

/// Active courses, newest first.
async fn catalogue(
    State(state): State<AppState>,
    view: View,
    Query(query): Query<CatalogueQuery>,
    Query(paging): Query<Paging>,
) -> Result<Response> {
    let filter = CourseFilter {
        status: Some(CourseStatus::Active),
        teacher_id: query.teacher_id,
        search: query.search,
    };
    let page = courses::list_courses(&state.db, &filter, paging.page(), paging.page_size()).await?;
    view.page("courses/index", &page).await
}

#[derive(Debug, Deserialize)]
struct CourseForm {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, deserialize_with = "optional")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "optional")]
    teacher_id: Option<i64>,
}

async fn create(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Payload(form): Payload<CourseForm>,
) -> Result<Response> {
    let new_course = NewCourse {
        title: form.title,
        description: form.description,
        price: form.price.unwrap_or(0.0),
        teacher_id: form.teacher_id,
    };
    let course = courses::create_course(&state.db, &ctx, new_course).await?;
    view.created(
        "Course submitted for approval",
        &format!("/courses/{}", course.id),
        &json!({ "course": course }),
    )
    .await
}

/// A single course. Courses that are not active are shown only to their owner and administrators.
async fn show(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(course_id): Path<i64>,
) -> Result<Response> {
    let course = courses::get_course(&state.db, course_id).await?;
    if course.status != CourseStatus::Active {
        ctx.require_owner_or_admin(course.teacher_id, "course")?;
    }
    view.page("courses/show", &json!({ "course": course })).await
}

#[derive(Debug, Deserialize)]
struct CourseUpdateForm {
    title: Option<String>,
    description: Option<String>,
    #[serde(default, deserialize_with = "optional")]
    price: Option<f64>,
}

async fn update(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(course_id): Path<i64>,
    Payload(form): Payload<CourseUpdateForm>,
) -> Result<Response> {
    let update = CourseUpdate {
        title: form.title,
        description: form.description,
        price: form.price,
    };
    let course = courses::update_course(&state.db, &ctx, course_id, update).await?;
    view.done(
        "Course updated",
        &format!("/courses/{course_id}"),
        &json!({ "course": course }),
    )
    .await
}

async fn remove(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(course_id): Path<i64>,
) -> Result<Response> {
    courses::delete_course(&state.db, &ctx, course_id).await?;
    view.done("Course deleted", "/courses", &json!({})).await
}

async fn students(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(course_id): Path<i64>,
) -> Result<Response> {
    let students = courses::enrolled_students(&state.db, &ctx, course_id).await?;
    view.page("courses/students", &json!({ "students": students })).await
}

async fn course_assignments(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(course_id): Path<i64>,
) -> Result<Response> {
    let assignments = assignments::assignments_for_course(&state.db, &ctx, course_id).await?;
    view.page("courses/assignments", &json!({ "assignments": assignments })).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use crate::core::access::Role;
    use crate::test_utils::{create_test_course, create_test_user};
    use crate::web::testing::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_catalogue_is_public_and_lists_active_only() {
        let (app, db) = app().await;
        let teacher = create_test_user(&db, "Tia", "tia@example.com", Role::Teacher).await.unwrap();
        create_test_course(&db, teacher.id, "Live", 10.0).await.unwrap();
        let cookie = login(&app, "tia@example.com").await;

        let body = json!({ "title": "Draft", "description": "Not yet", "price": 5 });
        let response = send(&app, json_request("POST", "/courses", Some(&cookie), Some(body))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["data"]["course"]["status"], "pending");

        let page = body_json(send(&app, json_request("GET", "/courses", None, None)).await).await;
        assert_eq!(page["data"]["total"], 1);
        assert_eq!(page["data"]["items"][0]["title"], "Live");
    }

    #[tokio::test]
    async fn test_course_creation_needs_session() {
        let (app, _db) = app().await;
        let body = json!({ "title": "Anon" });
        let response = send(&app, json_request("POST", "/courses", None, Some(body))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_students_cannot_create_or_see_pending_courses() {
        let (app, db) = app().await;
        create_test_user(&db, "Stu", "stu@example.com", Role::Student).await.unwrap();
        let teacher = create_test_user(&db, "Tia", "tia@example.com", Role::Teacher).await.unwrap();
        let teacher_cookie = login(&app, "tia@example.com").await;
        let body = json!({ "title": "Pending" });
        let created = body_json(send(&app, json_request("POST", "/courses", Some(&teacher_cookie), Some(body))).await).await;
        let course_id = created["data"]["course"]["id"].as_i64().unwrap();
        assert_eq!(created["data"]["course"]["teacher_id"], teacher.id);

        let cookie = login(&app, "stu@example.com").await;
        let response = send(&app, json_request("POST", "/courses", Some(&cookie), Some(json!({ "title": "Mine" })))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, json_request("GET", &format!("/courses/{course_id}"), Some(&cookie), None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
