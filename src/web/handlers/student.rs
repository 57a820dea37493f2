//! Student area: enrollments, assignments and submissions.

use crate::core::submissions::{self, NewSubmission};
use crate::core::{assignments, courses};
use crate::errors::Result;
use crate::web::AppState;
use crate::web::gate::Auth;
use crate::web::respond::{Payload, View};
use axum::Router;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(my_courses))
        .route("/courses/:id/enroll", post(enroll))
        .route("/courses/:id/unenroll", post(unenroll))
        .route("/assignments", get(my_assignments))
        .route("/assignments/:id/submit", post(submit))
        .route("/submissions", get(my_submissions))
        .route("/submissions/:id", get(show_submission))
        .route("/grades", get(my_grades))
}

async fn my_courses(State(state): State<AppState>, Auth(ctx): Auth, view: View) -> Result<Response> {
    let courses = courses::enrolled_courses(&state.db, ctx.user_id).await?;
    view.page("student/courses", &json!({ "courses": courses })).await
}

async fn enroll(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(course_id): Path<i64>,
) -> Result<Response> {
    let enrollment = courses::enroll(&state.db, &ctx, course_id).await?;
    view.created(
        "Enrolled successfully",
        "/student/courses",
        &json!({ "enrollment": enrollment }),
    )
    .await
}

async fn unenroll(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(course_id): Path<i64>,
) -> Result<Response> {
    let enrollment = courses::unenroll(&state.db, &ctx, course_id).await?;
    view.done("Unenrolled", "/student/courses", &json!({ "enrollment": enrollment })).await
}

async fn my_assignments(State(state): State<AppState>, Auth(ctx): Auth, view: View) -> Result<Response> {
    let assignments = assignments::assignments_for_student(&state.db, ctx.user_id).await?;
    view.page("student/assignments", &json!({ "assignments": assignments })).await
}

#[derive(Debug, Deserialize)]
struct SubmissionForm {
    content: Option<String>,
    file_name: Option<String>,
}

async fn submit(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(assignment_id): Path<i64>,
    Payload(form): Payload<SubmissionForm>,
) -> Result<Response> {
    let new_submission = NewSubmission {
        content: form.content,
        file_name: form.file_name,
    };
    let submission = submissions::submit(&state.db, &ctx, assignment_id, new_submission).await?;
    view.created(
        "Assignment submitted",
        "/student/submissions",
        &json!({ "submission": submission }),
    )
    .await
}

async fn my_submissions(State(state): State<AppState>, Auth(ctx): Auth, view: View) -> Result<Response> {
    let submissions = submissions::submissions_for_student(&state.db, ctx.user_id, None).await?;
    view.page("student/submissions", &json!({ "submissions": submissions })).await
}

async fn show_submission(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(submission_id): Path<i64>,
) -> Result<Response> {
    let submission = submissions::view_submission(&state.db, &ctx, submission_id).await?;
    view.page("student/submission", &json!({ "submission": submission })).await
}

async fn my_grades(State(state): State<AppState>, Auth(ctx): Auth, view: View) -> Result<Response> {
    let grades = submissions::grades_for_student(&state.db, ctx.user_id).await?;
    view.page("student/grades", &json!({ "grades": grades })).await
}
