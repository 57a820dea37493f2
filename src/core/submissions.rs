//! Submission business logic - student hand-ins and teacher grading.
//!
//! A student submits once per assignment, before the due date, to a course they are
//! actively enrolled in. Only the assignment's teacher (or an administrator) grades it,
//! with points between 0 and the assignment's maximum.

use super::access::{self, AuthContext};
use super::assignments::get_assignment;
use super::audit::{self, actions};
use super::courses;
use crate::entities::{Submission, assignment, course, submission, user};
use crate::errors::{Error, Result, is_unique_violation};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

/// File extensions accepted for attachments.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "zip", "pptx", "xlsx"];

/// What a student hands in. At least one of the two must be non-empty.
#[derive(Debug, Clone, Default)]
pub struct NewSubmission {
    pub content: Option<String>,
    pub file_name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_file_name(file_name: &str) -> Result<()> {
    if file_name.contains(['/', '\\']) || file_name.starts_with('.') {
        return Err(Error::validation("File name must not contain a path"));
    }
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Only {} files are accepted",
            ALLOWED_EXTENSIONS.join(", ")
        )))
    }
}

/// Submits work for an assignment as the calling student.
///
/// # Errors
/// * [`Error::NotFound`] - no such assignment
/// * [`Error::Forbidden`] - caller is not actively enrolled in the course
/// * [`Error::SubmissionClosed`] - the due date has passed
/// * [`Error::AlreadySubmitted`] - a submission exists (also when a concurrent one wins)
/// * [`Error::Validation`] - nothing to submit, or a disallowed file type
#[instrument(skip(db, new_submission))]
pub async fn submit(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    assignment_id: i64,
    new_submission: NewSubmission,
) -> Result<submission::Model> {
    ctx.require_role(access::STUDENTS)?;
    let assignment = get_assignment(db, assignment_id).await?;

    if !courses::is_actively_enrolled(db, ctx.user_id, assignment.course_id).await? {
        return Err(Error::forbidden("not enrolled in this course"));
    }
    if Utc::now() > assignment.due_date {
        return Err(Error::SubmissionClosed { assignment_id });
    }

    let already = Submission::find()
        .filter(submission::Column::AssignmentId.eq(assignment_id))
        .filter(submission::Column::StudentId.eq(ctx.user_id))
        .count(db)
        .await?;
    if already > 0 {
        return Err(Error::AlreadySubmitted { assignment_id });
    }

    let content = non_empty(new_submission.content);
    let file_name = non_empty(new_submission.file_name);
    if content.is_none() && file_name.is_none() {
        return Err(Error::validation("Provide either text content or a file"));
    }
    if let Some(name) = file_name.as_deref() {
        check_file_name(name)?;
    }

    let submission = submission::ActiveModel {
        assignment_id: Set(assignment_id),
        student_id: Set(ctx.user_id),
        content: Set(content),
        file_name: Set(file_name),
        submitted_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::AlreadySubmitted { assignment_id }
        } else {
            e.into()
        }
    })?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::SUBMISSION_CREATE,
        json!({ "assignment_id": assignment_id, "submission_id": submission.id }),
    )
    .await;
    info!("Student {} submitted assignment {assignment_id}", ctx.user_id);
    Ok(submission)
}

/// Grades a submission.
///
/// # Errors
/// * [`Error::NotFound`] - no such submission
/// * [`Error::Forbidden`] - caller does not own the assignment and is not an administrator
/// * [`Error::Validation`] - negative or non-finite points
/// * [`Error::PointsExceedMaximum`] - points above the assignment maximum
#[instrument(skip(db, feedback))]
pub async fn grade(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    submission_id: i64,
    points: f64,
    feedback: Option<String>,
) -> Result<submission::Model> {
    ctx.require_role(access::COURSE_EDITORS)?;
    let existing = get_submission(db, submission_id).await?;
    let assignment = get_assignment(db, existing.assignment_id).await?;
    ctx.require_owner_or_admin(assignment.teacher_id, "assignment")?;

    if !points.is_finite() || points < 0.0 {
        return Err(Error::validation("Points must be a non-negative number"));
    }
    if points > assignment.max_points {
        return Err(Error::PointsExceedMaximum {
            points,
            max_points: assignment.max_points,
        });
    }

    let mut active: submission::ActiveModel = existing.into();
    active.grade = Set(Some(points));
    active.feedback = Set(non_empty(feedback));
    active.graded_at = Set(Some(Utc::now()));
    active.graded_by = Set(Some(ctx.user_id));
    let graded = active.update(db).await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::GRADE_SUBMISSION,
        json!({
            "submission_id": graded.id,
            "assignment_id": assignment.id,
            "student_id": graded.student_id,
            "points": points,
        }),
    )
    .await;
    Ok(graded)
}

/// Retrieves a submission by id.
pub async fn get_submission(db: &DatabaseConnection, submission_id: i64) -> Result<submission::Model> {
    Submission::find_by_id(submission_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Submission",
            id: submission_id,
        })
}

/// Submission joined with assignment, course and student details.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub id: i64,
    pub assignment_id: i64,
    pub assignment_title: String,
    pub max_points: f64,
    pub course_id: i64,
    pub course_title: String,
    pub student_id: i64,
    pub student_name: String,
    pub content: Option<String>,
    pub file_name: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
}

pub(crate) fn views() -> sea_orm::Select<Submission> {
    Submission::find()
        .select_only()
        .column(submission::Column::Id)
        .column(submission::Column::AssignmentId)
        .column_as(assignment::Column::Title, "assignment_title")
        .column(assignment::Column::MaxPoints)
        .column(assignment::Column::CourseId)
        .column_as(course::Column::Title, "course_title")
        .column(submission::Column::StudentId)
        .column_as(user::Column::Name, "student_name")
        .column(submission::Column::Content)
        .column(submission::Column::FileName)
        .column(submission::Column::SubmittedAt)
        .column(submission::Column::Grade)
        .column(submission::Column::Feedback)
        .column(submission::Column::GradedAt)
        .join(JoinType::InnerJoin, submission::Relation::Assignment.def())
        .join(JoinType::InnerJoin, assignment::Relation::Course.def())
        .join(JoinType::InnerJoin, submission::Relation::Student.def())
}

/// The caller's own submissions, newest first.
pub async fn submissions_for_student(
    db: &DatabaseConnection,
    student_id: i64,
    limit: Option<u64>,
) -> Result<Vec<SubmissionView>> {
    views()
        .filter(submission::Column::StudentId.eq(student_id))
        .order_by_desc(submission::Column::SubmittedAt)
        .order_by_desc(submission::Column::Id)
        .limit(limit)
        .into_model::<SubmissionView>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Graded submissions of a student, newest grading first.
pub async fn grades_for_student(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<Vec<SubmissionView>> {
    views()
        .filter(submission::Column::StudentId.eq(student_id))
        .filter(submission::Column::Grade.is_not_null())
        .order_by_desc(submission::Column::GradedAt)
        .into_model::<SubmissionView>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// One submission, visible to its student, the assignment's teacher, or an administrator.
pub async fn view_submission(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    submission_id: i64,
) -> Result<SubmissionView> {
    let view = views()
        .filter(submission::Column::Id.eq(submission_id))
        .into_model::<SubmissionView>()
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Submission",
            id: submission_id,
        })?;

    if view.student_id != ctx.user_id {
        let assignment = get_assignment(db, view.assignment_id).await?;
        ctx.require_owner_or_admin(assignment.teacher_id, "submission")?;
    }
    Ok(view)
}

/// Submissions to the teacher's assignments, ungraded first then newest.
pub async fn submissions_for_teacher(
    db: &DatabaseConnection,
    teacher_id: i64,
    ungraded_only: bool,
) -> Result<Vec<SubmissionView>> {
    let mut query = views().filter(assignment::Column::TeacherId.eq(teacher_id));
    if ungraded_only {
        query = query.filter(submission::Column::Grade.is_null());
    }
    query
        .order_by_asc(submission::Column::GradedAt)
        .order_by_desc(submission::Column::SubmittedAt)
        .into_model::<SubmissionView>()
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::access::Role;
    use crate::errors::ErrorKind;
    use crate::test_utils::*;
    use chrono::Duration;

    fn text(content: &str) -> NewSubmission {
        NewSubmission {
            content: Some(content.to_string()),
            file_name: None,
        }
    }

    #[test]
    fn test_file_name_rules() {
        assert!(check_file_name("essay.PDF").is_ok());
        assert!(check_file_name("slides.pptx").is_ok());
        assert!(check_file_name("run.exe").is_err());
        assert!(check_file_name("../etc/passwd.txt").is_err());
        assert!(check_file_name("noextension").is_err());
    }

    #[tokio::test]
    async fn test_submit_once_then_grade() -> Result<()> {
        let db = setup_test_db().await?;
        let (teacher, teacher_ctx) = create_test_actor(&db, Role::Teacher).await?;
        let (student, student_ctx) = create_test_actor(&db, Role::Student).await?;
        let course = create_test_course(&db, teacher.id, "Graded", 0.0).await?;
        enroll_test_student(&db, student.id, course.id).await?;
        let assignment = create_test_assignment(&db, course.id, teacher.id, Duration::days(1)).await?;

        let submission = submit(&db, &student_ctx, assignment.id, text("my answer")).await?;
        assert_eq!(submission.grade, None);

        let err = submit(&db, &student_ctx, assignment.id, text("again")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadySubmitted { .. }));
        assert_eq!(Submission::find().count(&db).await?, 1);

        let err = grade(&db, &teacher_ctx, submission.id, 101.0, None).await.unwrap_err();
        assert!(matches!(err, Error::PointsExceedMaximum { .. }));
        let err = grade(&db, &teacher_ctx, submission.id, -1.0, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        let graded = grade(&db, &teacher_ctx, submission.id, 88.5, Some("Nice".to_string())).await?;
        assert_eq!(graded.grade, Some(88.5));
        assert_eq!(graded.graded_by, Some(teacher.id));

        let grades = grades_for_student(&db, student.id).await?;
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].feedback.as_deref(), Some("Nice"));
        Ok(())
    }

    #[tokio::test]
    async fn test_submit_requires_enrollment_and_open_assignment() -> Result<()> {
        let db = setup_test_db().await?;
        let (teacher, _) = create_test_actor(&db, Role::Teacher).await?;
        let (student, student_ctx) = create_test_actor(&db, Role::Student).await?;
        let course = create_test_course(&db, teacher.id, "Closed", 0.0).await?;
        let open = create_test_assignment(&db, course.id, teacher.id, Duration::days(1)).await?;
        let closed = create_test_assignment(&db, course.id, teacher.id, -Duration::days(1)).await?;

        let err = submit(&db, &student_ctx, open.id, text("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        enroll_test_student(&db, student.id, course.id).await?;
        let err = submit(&db, &student_ctx, closed.id, text("x")).await.unwrap_err();
        assert!(matches!(err, Error::SubmissionClosed { .. }));

        let err = submit(&db, &student_ctx, open.id, NewSubmission::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        let err = submit(&db, &student_ctx, 999, text("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn test_grading_and_viewing_respect_ownership() -> Result<()> {
        let db = setup_test_db().await?;
        let (teacher, _) = create_test_actor(&db, Role::Teacher).await?;
        let (_, other_teacher) = create_test_actor(&db, Role::Teacher).await?;
        let (_, admin) = create_test_actor(&db, Role::Admin).await?;
        let (student, student_ctx) = create_test_actor(&db, Role::Student).await?;
        let (_, other_student) = create_test_actor(&db, Role::Student).await?;
        let course = create_test_course(&db, teacher.id, "Owned", 0.0).await?;
        enroll_test_student(&db, student.id, course.id).await?;
        let assignment = create_test_assignment(&db, course.id, teacher.id, Duration::days(2)).await?;
        let submission = submit(&db, &student_ctx, assignment.id, text("answer")).await?;

        let err = grade(&db, &other_teacher, submission.id, 50.0, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(grade(&db, &admin, submission.id, 50.0, None).await.is_ok());

        assert_eq!(view_submission(&db, &student_ctx, submission.id).await?.student_id, student.id);
        let err = view_submission(&db, &other_student, submission.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let pending = submissions_for_teacher(&db, teacher.id, true).await?;
        assert!(pending.is_empty());
        assert_eq!(submissions_for_teacher(&db, teacher.id, false).await?.len(), 1);
        Ok(())
    }
}
