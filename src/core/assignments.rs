//! Assignment business logic.
//!
//! Teachers manage assignments in the courses they own; administrators can manage any.
//! Students see the assignments of courses they are actively enrolled in.

use super::access::{self, AuthContext, Role};
use super::audit::{self, actions};
use super::courses::{self, get_course};
use crate::entities::{Assignment, assignment, course};
use crate::errors::{Error, Result, is_foreign_key_violation};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

/// Points used when a new assignment does not specify a maximum.
pub const DEFAULT_MAX_POINTS: f64 = 100.0;

/// Upper bound for `max_points`.
pub const MAX_POINTS_LIMIT: f64 = 1000.0;

/// Retrieves an assignment by id.
pub async fn get_assignment<C: ConnectionTrait>(db: &C, assignment_id: i64) -> Result<assignment::Model> {
    Assignment::find_by_id(assignment_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Assignment",
            id: assignment_id,
        })
}

fn check_max_points(max_points: f64) -> Result<f64> {
    if max_points.is_finite() && max_points > 0.0 && max_points <= MAX_POINTS_LIMIT {
        Ok(max_points)
    } else {
        Err(Error::validation(format!(
            "Maximum points must be greater than 0 and at most {MAX_POINTS_LIMIT}"
        )))
    }
}

fn clean_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > courses::MAX_TITLE_LENGTH {
        return Err(Error::validation("Assignment title is required (max 255 characters)"));
    }
    Ok(title.to_string())
}

/// Input for [`create_assignment`].
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub course_id: i64,
    pub title: String,
    pub description: String,
    pub max_points: Option<f64>,
    pub due_date: DateTime<Utc>,
}

/// Creates an assignment in a course the caller owns.
#[instrument(skip(db))]
pub async fn create_assignment(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    new_assignment: NewAssignment,
) -> Result<assignment::Model> {
    ctx.require_role(access::COURSE_EDITORS)?;
    let course = get_course(db, new_assignment.course_id).await?;
    ctx.require_owner_or_admin(course.teacher_id, "course")?;

    let title = clean_title(&new_assignment.title)?;
    let max_points = check_max_points(new_assignment.max_points.unwrap_or(DEFAULT_MAX_POINTS))?;

    let assignment = assignment::ActiveModel {
        course_id: Set(course.id),
        teacher_id: Set(course.teacher_id),
        title: Set(title),
        description: Set(new_assignment.description.trim().to_string()),
        max_points: Set(max_points),
        due_date: Set(new_assignment.due_date),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::ASSIGNMENT_CREATE,
        json!({ "assignment_id": assignment.id, "course_id": course.id, "title": assignment.title }),
    )
    .await;
    Ok(assignment)
}

/// Fields that may change on an assignment.
#[derive(Debug, Clone, Default)]
pub struct AssignmentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub max_points: Option<f64>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Updates an assignment the caller owns.
pub async fn update_assignment(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    assignment_id: i64,
    update: AssignmentUpdate,
) -> Result<assignment::Model> {
    ctx.require_role(access::COURSE_EDITORS)?;
    let existing = get_assignment(db, assignment_id).await?;
    ctx.require_owner_or_admin(existing.teacher_id, "assignment")?;

    let mut active: assignment::ActiveModel = existing.into();
    if let Some(title) = update.title.as_deref() {
        active.title = Set(clean_title(title)?);
    }
    if let Some(description) = update.description {
        active.description = Set(description.trim().to_string());
    }
    if let Some(max_points) = update.max_points {
        active.max_points = Set(check_max_points(max_points)?);
    }
    if let Some(due_date) = update.due_date {
        active.due_date = Set(due_date);
    }
    let assignment = active.update(db).await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::ASSIGNMENT_UPDATE,
        json!({ "assignment_id": assignment.id }),
    )
    .await;
    Ok(assignment)
}

/// Deletes an assignment the caller owns.
///
/// # Errors
/// [`Error::Conflict`] once students have submitted to it.
pub async fn delete_assignment(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    assignment_id: i64,
) -> Result<()> {
    ctx.require_role(access::COURSE_EDITORS)?;
    let existing = get_assignment(db, assignment_id).await?;
    ctx.require_owner_or_admin(existing.teacher_id, "assignment")?;

    Assignment::delete_by_id(existing.id)
        .exec(db)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::Conflict {
                    message: format!("Assignment {} already has submissions", existing.id),
                }
            } else {
                e.into()
            }
        })?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::ASSIGNMENT_DELETE,
        json!({ "assignment_id": existing.id, "title": existing.title }),
    )
    .await;
    Ok(())
}

/// Assignment joined with its course title.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub id: i64,
    pub course_id: i64,
    pub course_title: String,
    pub title: String,
    pub description: String,
    pub max_points: f64,
    pub due_date: DateTime<Utc>,
}

fn views() -> sea_orm::Select<Assignment> {
    Assignment::find()
        .select_only()
        .column(assignment::Column::Id)
        .column(assignment::Column::CourseId)
        .column_as(course::Column::Title, "course_title")
        .column(assignment::Column::Title)
        .column(assignment::Column::Description)
        .column(assignment::Column::MaxPoints)
        .column(assignment::Column::DueDate)
        .join(JoinType::InnerJoin, assignment::Relation::Course.def())
}

/// Assignments created by `teacher_id`, latest due date first.
pub async fn assignments_for_teacher(
    db: &DatabaseConnection,
    teacher_id: i64,
    limit: Option<u64>,
) -> Result<Vec<AssignmentView>> {
    views()
        .filter(assignment::Column::TeacherId.eq(teacher_id))
        .order_by_desc(assignment::Column::DueDate)
        .limit(limit)
        .into_model::<AssignmentView>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Assignments of one course.
///
/// Students must be actively enrolled; teachers must own the course.
pub async fn assignments_for_course(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    course_id: i64,
) -> Result<Vec<AssignmentView>> {
    let course = get_course(db, course_id).await?;
    match ctx.role {
        Role::Student => {
            if !courses::is_actively_enrolled(db, ctx.user_id, course_id).await? {
                return Err(Error::forbidden("not enrolled in this course"));
            }
        }
        _ => ctx.require_owner_or_admin(course.teacher_id, "course")?,
    }

    views()
        .filter(assignment::Column::CourseId.eq(course_id))
        .order_by_asc(assignment::Column::DueDate)
        .into_model::<AssignmentView>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Assignments across every course the student is actively enrolled in, soonest due first.
pub async fn assignments_for_student(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<Vec<AssignmentView>> {
    let course_ids = courses::active_course_ids(db, student_id).await?;
    if course_ids.is_empty() {
        return Ok(Vec::new());
    }
    views()
        .filter(assignment::Column::CourseId.is_in(course_ids))
        .order_by_asc(assignment::Column::DueDate)
        .into_model::<AssignmentView>()
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::ErrorKind;
    use crate::test_utils::*;
    use chrono::Duration;

    fn new_assignment(course_id: i64, max_points: Option<f64>) -> NewAssignment {
        NewAssignment {
            course_id,
            title: "Borrow checker drills".to_string(),
            description: "Fix the lifetimes".to_string(),
            max_points,
            due_date: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn test_owner_creates_with_default_points() -> Result<()> {
        let db = setup_test_db().await?;
        let (teacher, ctx) = create_test_actor(&db, Role::Teacher).await?;
        let course = create_test_course(&db, teacher.id, "Rust", 0.0).await?;

        let assignment = create_assignment(&db, &ctx, new_assignment(course.id, None)).await?;
        assert!((assignment.max_points - DEFAULT_MAX_POINTS).abs() < f64::EPSILON);
        assert_eq!(assignment.teacher_id, teacher.id);

        let listed = assignments_for_teacher(&db, teacher.id, None).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].course_title, "Rust");
        Ok(())
    }

    #[tokio::test]
    async fn test_max_points_bounds() -> Result<()> {
        let db = setup_test_db().await?;
        let (teacher, ctx) = create_test_actor(&db, Role::Teacher).await?;
        let course = create_test_course(&db, teacher.id, "Bounds", 0.0).await?;

        for bad in [0.0, -5.0, 1000.5] {
            let err = create_assignment(&db, &ctx, new_assignment(course.id, Some(bad))).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        }
        assert!(create_assignment(&db, &ctx, new_assignment(course.id, Some(1000.0))).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_other_teacher_cannot_touch_assignment() -> Result<()> {
        let db = setup_test_db().await?;
        let (teacher, ctx) = create_test_actor(&db, Role::Teacher).await?;
        let (_, intruder) = create_test_actor(&db, Role::Teacher).await?;
        let course = create_test_course(&db, teacher.id, "Mine", 0.0).await?;

        let err = create_assignment(&db, &intruder, new_assignment(course.id, None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let assignment = create_assignment(&db, &ctx, new_assignment(course.id, None)).await?;
        let err = delete_assignment(&db, &intruder, assignment.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        delete_assignment(&db, &ctx, assignment.id).await?;
        assert!(matches!(get_assignment(&db, assignment.id).await, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_students_see_only_enrolled_course_assignments() -> Result<()> {
        let db = setup_test_db().await?;
        let (teacher, ctx) = create_test_actor(&db, Role::Teacher).await?;
        let (student, student_ctx) = create_test_actor(&db, Role::Student).await?;
        let enrolled = create_test_course(&db, teacher.id, "Enrolled", 0.0).await?;
        let other = create_test_course(&db, teacher.id, "Other", 0.0).await?;
        create_assignment(&db, &ctx, new_assignment(enrolled.id, None)).await?;
        create_assignment(&db, &ctx, new_assignment(other.id, None)).await?;
        enroll_test_student(&db, student.id, enrolled.id).await?;

        let visible = assignments_for_student(&db, student.id).await?;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].course_id, enrolled.id);

        let err = assignments_for_course(&db, &student_ctx, other.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(assignments_for_course(&db, &student_ctx, enrolled.id).await?.len(), 1);
        Ok(())
    }
}
