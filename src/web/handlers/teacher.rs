//! Teacher area: own courses, assignments, grading and announcements.

use super::{announcements, optional};
use crate::core::assignments::{self, AssignmentUpdate, NewAssignment};
use crate::core::{courses, submissions};
use crate::errors::{Error, Result};
use crate::web::AppState;
use crate::web::gate::Auth;
use crate::web::respond::{Payload, View};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post, put};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(my_courses))
        .route("/assignments", get(my_assignments).post(create_assignment))
        .route("/assignments/:id", put(update_assignment).delete(delete_assignment))
        .route("/submissions", get(my_submissions))
        .route("/submissions/:id/grade", post(grade))
        .route("/announcements", post(announcements::create))
}

/// Accepts RFC 3339, or the `YYYY-MM-DDTHH:MM` a browser date-time input sends (read as UTC).
fn parse_due_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M").map(|d| d.and_utc()))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|d| d.and_utc()))
        .map_err(|_| Error::validation(format!("Invalid due date '{raw}'")))
}

async fn my_courses(State(state): State<AppState>, Auth(ctx): Auth, view: View) -> Result<Response> {
    let courses = courses::courses_by_teacher(&state.db, ctx.user_id).await?;
    view.page("teacher/courses", &json!({ "courses": courses })).await
}

async fn my_assignments(State(state): State<AppState>, Auth(ctx): Auth, view: View) -> Result<Response> {
    let assignments = assignments::assignments_for_teacher(&state.db, ctx.user_id, None).await?;
    view.page("teacher/assignments", &json!({ "assignments": assignments })).await
}

#[derive(Debug, Deserialize)]
struct AssignmentForm {
    course_id: i64,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, deserialize_with = "optional")]
    max_points: Option<f64>,
    due_date: String,
}

async fn create_assignment(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Payload(form): Payload<AssignmentForm>,
) -> Result<Response> {
    let new_assignment = NewAssignment {
        course_id: form.course_id,
        title: form.title,
        description: form.description,
        max_points: form.max_points,
        due_date: parse_due_date(&form.due_date)?,
    };
    let assignment = assignments::create_assignment(&state.db, &ctx, new_assignment).await?;
    view.created(
        "Assignment created",
        "/teacher/assignments",
        &json!({ "assignment": assignment }),
    )
    .await
}

#[derive(Debug, Deserialize)]
struct AssignmentUpdateForm {
    title: Option<String>,
    description: Option<String>,
    #[serde(default, deserialize_with = "optional")]
    max_points: Option<f64>,
    due_date: Option<String>,
}

async fn update_assignment(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(assignment_id): Path<i64>,
    Payload(form): Payload<AssignmentUpdateForm>,
) -> Result<Response> {
    let due_date = form
        .due_date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(parse_due_date)
        .transpose()?;
    let update = AssignmentUpdate {
        title: form.title,
        description: form.description,
        max_points: form.max_points,
        due_date,
    };
    let assignment = assignments::update_assignment(&state.db, &ctx, assignment_id, update).await?;
    view.done(
        "Assignment updated",
        "/teacher/assignments",
        &json!({ "assignment": assignment }),
    )
    .await
}

async fn delete_assignment(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(assignment_id): Path<i64>,
) -> Result<Response> {
    assignments::delete_assignment(&state.db, &ctx, assignment_id).await?;
    view.done("Assignment deleted", "/teacher/assignments", &json!({})).await
}

#[derive(Debug, Default, Deserialize)]
struct SubmissionQuery {
    #[serde(default, deserialize_with = "optional")]
    ungraded: Option<bool>,
}

async fn my_submissions(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Query(query): Query<SubmissionQuery>,
) -> Result<Response> {
    let ungraded = query.ungraded.unwrap_or(false);
    let submissions = submissions::submissions_for_teacher(&state.db, ctx.user_id, ungraded).await?;
    view.page("teacher/submissions", &json!({ "submissions": submissions })).await
}

#[derive(Debug, Deserialize)]
struct GradeForm {
    grade: f64,
    feedback: Option<String>,
}

async fn grade(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(submission_id): Path<i64>,
    Payload(form): Payload<GradeForm>,
) -> Result<Response> {
    let submission = submissions::grade(&state.db, &ctx, submission_id, form.grade, form.feedback).await?;
    view.done(
        "Submission graded",
        "/teacher/submissions",
        &json!({ "submission": submission }),
    )
    .await
}
