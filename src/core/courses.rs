//! Course business logic - CRUD, moderation and enrollment.
//!
//! Courses created by teachers start `pending` and must be approved before students can
//! enroll or pay. Enrollment rows are unique per (student, course); leaving a course marks
//! the row inactive and enrolling again reactivates it.

use super::Page;
use super::access::{self, AuthContext, Role};
use super::audit::{self, actions};
use super::users;
use crate::entities::{
    Course, CourseStatus, Enrollment, EnrollmentStatus, course, enrollment, user,
};
use crate::errors::{Error, Result, is_foreign_key_violation, is_unique_violation};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    Set,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

/// Maximum title length.
pub const MAX_TITLE_LENGTH: usize = 255;

/// Retrieves a course by id.
pub async fn get_course<C: ConnectionTrait>(db: &C, course_id: i64) -> Result<course::Model> {
    Course::find_by_id(course_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Course",
            id: course_id,
        })
}

fn clean_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
        return Err(Error::validation(format!(
            "Title must be between 1 and {MAX_TITLE_LENGTH} characters"
        )));
    }
    Ok(title.to_string())
}

fn check_price(price: f64) -> Result<f64> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(Error::validation("Price must be a non-negative amount"))
    }
}

/// Input for [`create_course`].
#[derive(Debug, Clone, Default)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub price: f64,
    /// Owning teacher; only administrators may set it
    pub teacher_id: Option<i64>,
}

/// Creates a course.
///
/// Every course starts `pending` until moderated. Teachers always own what they create;
/// administrators must name an owning teacher.
#[instrument(skip(db))]
pub async fn create_course(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    new_course: NewCourse,
) -> Result<course::Model> {
    ctx.require_role(access::COURSE_EDITORS)?;
    let title = clean_title(&new_course.title)?;
    let price = check_price(new_course.price)?;

    let teacher_id = if ctx.is_admin() {
        let teacher_id = new_course
            .teacher_id
            .ok_or_else(|| Error::validation("An owning teacher is required"))?;
        let teacher = users::get_user(db, teacher_id).await?;
        if teacher.role_id != users::role_id_for(db, Role::Teacher).await? {
            return Err(Error::validation(format!("User {teacher_id} is not a teacher")));
        }
        teacher_id
    } else {
        if new_course.teacher_id.is_some_and(|id| id != ctx.user_id) {
            return Err(Error::forbidden("teachers can only create their own courses"));
        }
        ctx.user_id
    };

    let course = course::ActiveModel {
        title: Set(title),
        description: Set(new_course.description.trim().to_string()),
        teacher_id: Set(teacher_id),
        price: Set(price),
        status: Set(CourseStatus::Pending),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::COURSE_CREATE,
        json!({ "course_id": course.id, "title": course.title, "teacher_id": teacher_id }),
    )
    .await;
    info!("Course {} created by {}", course.id, ctx.user_id);
    Ok(course)
}

/// Fields that may change on a course. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
}

/// Updates a course owned by the caller (or any course, for administrators).
pub async fn update_course(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    course_id: i64,
    update: CourseUpdate,
) -> Result<course::Model> {
    ctx.require_role(access::COURSE_EDITORS)?;
    let existing = get_course(db, course_id).await?;
    ctx.require_owner_or_admin(existing.teacher_id, "course")?;

    let mut active: course::ActiveModel = existing.into();
    if let Some(title) = update.title.as_deref() {
        active.title = Set(clean_title(title)?);
    }
    if let Some(description) = update.description {
        active.description = Set(description.trim().to_string());
    }
    if let Some(price) = update.price {
        active.price = Set(check_price(price)?);
    }
    let course = active.update(db).await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::COURSE_UPDATE,
        json!({ "course_id": course.id }),
    )
    .await;
    Ok(course)
}

/// Deletes a course. Administrators only.
///
/// # Errors
/// [`Error::Conflict`] while enrollments, assignments or payments reference the course.
pub async fn delete_course(db: &DatabaseConnection, ctx: &AuthContext, course_id: i64) -> Result<()> {
    ctx.require_role(access::ADMINS)?;
    let course = get_course(db, course_id).await?;

    Course::delete_by_id(course.id).exec(db).await.map_err(|e| {
        if is_foreign_key_violation(&e) {
            Error::Conflict {
                message: format!("Course {} still has enrollments, assignments or payments", course.id),
            }
        } else {
            e.into()
        }
    })?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::COURSE_DELETE,
        json!({ "course_id": course.id, "title": course.title }),
    )
    .await;
    Ok(())
}

/// Course row joined with its teacher's name.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub teacher_id: i64,
    pub teacher_name: String,
    pub price: f64,
    pub status: CourseStatus,
    pub created_at: DateTime<Utc>,
}

/// Filters for [`list_courses`].
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub status: Option<CourseStatus>,
    pub teacher_id: Option<i64>,
    /// Substring of the title
    pub search: Option<String>,
}

/// Lists courses newest first.
pub async fn list_courses(
    db: &DatabaseConnection,
    filter: &CourseFilter,
    page: u64,
    page_size: u64,
) -> Result<Page<CourseSummary>> {
    let condition = Condition::all()
        .add_option(filter.status.map(|s| course::Column::Status.eq(s)))
        .add_option(filter.teacher_id.map(|t| course::Column::TeacherId.eq(t)))
        .add_option(
            filter
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| course::Column::Title.contains(s)),
        );

    let page_size = page_size.clamp(1, 100);
    let page = page.max(1);
    let paginator = Course::find()
        .select_only()
        .column(course::Column::Id)
        .column(course::Column::Title)
        .column(course::Column::Description)
        .column(course::Column::TeacherId)
        .column_as(user::Column::Name, "teacher_name")
        .column(course::Column::Price)
        .column(course::Column::Status)
        .column(course::Column::CreatedAt)
        .join(JoinType::InnerJoin, course::Relation::Teacher.def())
        .filter(condition)
        .order_by_desc(course::Column::CreatedAt)
        .order_by_desc(course::Column::Id)
        .into_model::<CourseSummary>()
        .paginate(db, page_size);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;
    Ok(Page::new(items, total, page, page_size))
}

/// Courses owned by `teacher_id`, newest first.
pub async fn courses_by_teacher(
    db: &DatabaseConnection,
    teacher_id: i64,
) -> Result<Vec<course::Model>> {
    Course::find()
        .filter(course::Column::TeacherId.eq(teacher_id))
        .order_by_desc(course::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// What moderation does to a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Approve,
    Reject,
    Deactivate,
}

impl ModerationAction {
    /// Parses "approve", "reject" or "deactivate".
    pub fn parse(action: &str) -> Result<Self> {
        match action.trim().to_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "deactivate" => Ok(Self::Deactivate),
            other => Err(Error::validation(format!("Unknown moderation action '{other}'"))),
        }
    }

    /// Status a course ends up in.
    #[must_use]
    pub const fn target_status(self) -> CourseStatus {
        match self {
            Self::Approve => CourseStatus::Active,
            Self::Reject => CourseStatus::Rejected,
            Self::Deactivate => CourseStatus::Inactive,
        }
    }
}

/// Moves a course to the status implied by `action`. Administrators only.
///
/// Any transition is allowed, including to the current status.
#[instrument(skip(db))]
pub async fn moderate_course(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    course_id: i64,
    action: ModerationAction,
    reason: Option<String>,
) -> Result<course::Model> {
    ctx.require_role(access::ADMINS)?;
    let existing = get_course(db, course_id).await?;
    let previous = existing.status;
    let target = action.target_status();

    let mut active: course::ActiveModel = existing.into();
    active.status = Set(target);
    let course = active.update(db).await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::ADMIN_MODERATE_COURSE,
        json!({
            "course_id": course.id,
            "previous_status": previous.as_str(),
            "new_status": target.as_str(),
            "reason": reason.as_deref().map(str::trim).filter(|r| !r.is_empty()),
        }),
    )
    .await;
    info!(
        "Course {} moved from {} to {} by {}",
        course.id,
        previous.as_str(),
        target.as_str(),
        ctx.user_id
    );
    Ok(course)
}

/// Whether `student_id` holds an active enrollment in `course_id`.
pub async fn is_actively_enrolled<C: ConnectionTrait>(
    db: &C,
    student_id: i64,
    course_id: i64,
) -> Result<bool> {
    let count = Enrollment::find()
        .filter(enrollment::Column::StudentId.eq(student_id))
        .filter(enrollment::Column::CourseId.eq(course_id))
        .filter(enrollment::Column::Status.eq(EnrollmentStatus::Active))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// Creates or reactivates the enrollment row for (student, course).
///
/// Runs on whatever connection is passed so payments can enroll inside their transaction.
///
/// # Errors
/// [`Error::AlreadyEnrolled`] if an active enrollment exists, including when a concurrent
/// request inserts it first.
pub async fn activate_enrollment<C: ConnectionTrait>(
    db: &C,
    student_id: i64,
    course_id: i64,
) -> Result<enrollment::Model> {
    let existing = Enrollment::find()
        .filter(enrollment::Column::StudentId.eq(student_id))
        .filter(enrollment::Column::CourseId.eq(course_id))
        .one(db)
        .await?;

    match existing {
        Some(row) if row.status == EnrollmentStatus::Active => {
            Err(Error::AlreadyEnrolled { course_id })
        }
        Some(row) => {
            let mut active: enrollment::ActiveModel = row.into();
            active.status = Set(EnrollmentStatus::Active);
            active.enrolled_at = Set(Utc::now());
            active.update(db).await.map_err(Into::into)
        }
        None => enrollment::ActiveModel {
            student_id: Set(student_id),
            course_id: Set(course_id),
            status: Set(EnrollmentStatus::Active),
            enrolled_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::AlreadyEnrolled { course_id }
            } else {
                e.into()
            }
        }),
    }
}

/// Fails unless the course accepts new students.
pub(crate) fn require_open(course: &course::Model) -> Result<()> {
    if course.status == CourseStatus::Active {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Course {} is not open for enrollment",
            course.id
        )))
    }
}

/// Enrolls the calling student in a free course.
#[instrument(skip(db))]
pub async fn enroll(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    course_id: i64,
) -> Result<enrollment::Model> {
    ctx.require_role(access::STUDENTS)?;
    let course = get_course(db, course_id).await?;
    require_open(&course)?;
    if course.price > 0.0 {
        return Err(Error::validation(format!(
            "Course {course_id} requires payment before enrollment"
        )));
    }

    let enrollment = activate_enrollment(db, ctx.user_id, course_id).await?;
    audit::record(
        db,
        Some(ctx.user_id),
        actions::COURSE_ENROLL,
        json!({ "course_id": course_id, "enrollment_id": enrollment.id }),
    )
    .await;
    info!("Student {} enrolled in course {course_id}", ctx.user_id);
    Ok(enrollment)
}

/// Marks the calling student's enrollment inactive.
pub async fn unenroll(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    course_id: i64,
) -> Result<enrollment::Model> {
    ctx.require_role(access::STUDENTS)?;
    let row = Enrollment::find()
        .filter(enrollment::Column::StudentId.eq(ctx.user_id))
        .filter(enrollment::Column::CourseId.eq(course_id))
        .filter(enrollment::Column::Status.eq(EnrollmentStatus::Active))
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Enrollment in course",
            id: course_id,
        })?;

    let mut active: enrollment::ActiveModel = row.into();
    active.status = Set(EnrollmentStatus::Inactive);
    let enrollment = active.update(db).await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::COURSE_UNENROLL,
        json!({ "course_id": course_id }),
    )
    .await;
    Ok(enrollment)
}

/// Ids of courses the student is actively enrolled in.
pub async fn active_course_ids(db: &DatabaseConnection, student_id: i64) -> Result<Vec<i64>> {
    Enrollment::find()
        .select_only()
        .column(enrollment::Column::CourseId)
        .filter(enrollment::Column::StudentId.eq(student_id))
        .filter(enrollment::Column::Status.eq(EnrollmentStatus::Active))
        .into_tuple::<i64>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Courses the student is actively enrolled in.
pub async fn enrolled_courses(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<Vec<course::Model>> {
    let ids = active_course_ids(db, student_id).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Course::find()
        .filter(course::Column::Id.is_in(ids))
        .order_by_asc(course::Column::Title)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Student enrolled in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledStudent {
    pub student_id: i64,
    pub name: String,
    pub email: String,
    pub enrolled_at: DateTime<Utc>,
}

/// Active students of a course. Owner or administrator only.
pub async fn enrolled_students(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    course_id: i64,
) -> Result<Vec<EnrolledStudent>> {
    let course = get_course(db, course_id).await?;
    ctx.require_owner_or_admin(course.teacher_id, "course")?;

    Enrollment::find()
        .select_only()
        .column_as(enrollment::Column::StudentId, "student_id")
        .column(user::Column::Name)
        .column(user::Column::Email)
        .column(enrollment::Column::EnrolledAt)
        .join(JoinType::InnerJoin, enrollment::Relation::Student.def())
        .filter(enrollment::Column::CourseId.eq(course_id))
        .filter(enrollment::Column::Status.eq(EnrollmentStatus::Active))
        .order_by_asc(user::Column::Name)
        .into_model::<EnrolledStudent>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Enrollment joined with student name and course title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentView {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub course_id: i64,
    pub course_title: String,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
}

/// The `limit` most recent enrollments across all courses.
pub async fn recent_enrollments(
    db: &DatabaseConnection,
    limit: u64,
) -> Result<Vec<EnrollmentView>> {
    Enrollment::find()
        .select_only()
        .column(enrollment::Column::Id)
        .column(enrollment::Column::StudentId)
        .column_as(user::Column::Name, "student_name")
        .column(enrollment::Column::CourseId)
        .column_as(course::Column::Title, "course_title")
        .column(enrollment::Column::Status)
        .column(enrollment::Column::EnrolledAt)
        .join(JoinType::InnerJoin, enrollment::Relation::Student.def())
        .join(JoinType::InnerJoin, enrollment::Relation::Course.def())
        .order_by_desc(enrollment::Column::EnrolledAt)
        .order_by_desc(enrollment::Column::Id)
        .limit(limit)
        .into_model::<EnrollmentView>()
        .all(db)
        .await
        .map_err(Into::into)
}
