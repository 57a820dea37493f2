//! Dashboard aggregator.
//!
//! [`build`] runs a fixed set of read-only aggregate queries for the caller's role and
//! returns a role-specific [`Dashboard`]. Counts are `u64` and sums default to `0.0`, so an
//! empty store yields zeros rather than errors; the student's average grade is the only
//! value that stays `None` when there is nothing to average.

use super::access::{AuthContext, Role};
use super::announcements::{self, AnnouncementView};
use super::assignments::{self, AssignmentView};
use super::audit::{self, AuditEntryView};
use super::courses::{self, EnrollmentView};
use super::payments::{self, PaymentView};
use super::round2;
use super::submissions::{self, SubmissionView};
use super::users::{self, UserSummary};
use crate::config::settings::DashboardSettings;
use crate::entities::{
    Assignment, Course, CourseStatus, Enrollment, EnrollmentStatus, Payment, PaymentStatus,
    Submission, User, assignment, course, enrollment, payment, role, submission, user,
};
use crate::errors::Result;
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, PaginatorTrait, QueryFilter,
    QuerySelect, RelationTrait,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// User counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    /// Keyed by canonical role name; every role is present
    pub by_role: BTreeMap<String, u64>,
}

/// Course counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStats {
    pub total: u64,
    pub pending: u64,
    pub active: u64,
    pub rejected: u64,
    pub inactive: u64,
}

/// Payment counts and revenue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub refunded: u64,
    /// Sum of completed payment amounts
    pub completed_revenue: f64,
}

/// System-wide statistics shared by the admin dashboard and the stats page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub users: UserStats,
    pub courses: CourseStats,
    pub payments: PaymentStats,
}

/// Admin and Super Admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub stats: SystemStats,
    pub recent_enrollments: Vec<EnrollmentView>,
    pub recent_users: Vec<UserSummary>,
    pub recent_audit: Vec<AuditEntryView>,
}

/// Teacher counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherStats {
    pub courses: u64,
    pub assignments: u64,
    /// Submissions to the teacher's assignments that have no grade yet
    pub pending_grading: u64,
}

/// Teacher dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDashboard {
    pub stats: TeacherStats,
    pub courses: Vec<course::Model>,
    /// Latest due date first
    pub recent_assignments: Vec<AssignmentView>,
}

/// Student counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    /// Active enrollments
    pub enrollments: u64,
    /// Assignments in actively enrolled courses
    pub assignments: u64,
    /// Graded submissions
    pub completed: u64,
    /// Submissions waiting for a grade
    pub pending: u64,
    /// Mean grade of graded submissions, rounded to two decimals
    pub average_grade: Option<f64>,
}

/// Student dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub stats: StudentStats,
    pub enrolled_courses: Vec<course::Model>,
    pub recent_submissions: Vec<SubmissionView>,
    pub grades: Vec<SubmissionView>,
    pub announcements: Vec<AnnouncementView>,
}

/// Finance Officer dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceDashboard {
    pub total_revenue: f64,
    pub pending_payments: u64,
    pub recent_payments: Vec<PaymentView>,
}

/// Role-specific dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dashboard {
    Admin(AdminDashboard),
    Teacher(TeacherDashboard),
    Student(StudentDashboard),
    Finance(FinanceDashboard),
}

impl Dashboard {
    /// Template used to render this dashboard as a page.
    #[must_use]
    pub const fn template(&self) -> &'static str {
        match self {
            Self::Admin(_) => "dashboard/admin",
            Self::Teacher(_) => "dashboard/teacher",
            Self::Student(_) => "dashboard/student",
            Self::Finance(_) => "dashboard/finance",
        }
    }
}

/// Builds the dashboard for the caller's role.
#[instrument(skip(db, limits))]
pub async fn build(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    limits: &DashboardSettings,
) -> Result<Dashboard> {
    debug!("Building {} dashboard for user {}", ctx.role, ctx.user_id);
    Ok(match ctx.role {
        Role::Admin | Role::SuperAdmin => Dashboard::Admin(admin_dashboard(db, limits).await?),
        Role::Teacher => Dashboard::Teacher(teacher_dashboard(db, ctx.user_id, limits).await?),
        Role::Student => Dashboard::Student(student_dashboard(db, ctx.user_id, limits).await?),
        Role::FinanceOfficer => Dashboard::Finance(finance_dashboard(db, limits).await?),
    })
}

fn count_expr<C: sea_orm::sea_query::IntoColumnRef>(column: C) -> SimpleExpr {
    Expr::col(column).count()
}

async fn completed_revenue(db: &DatabaseConnection) -> Result<f64> {
    let sum = Payment::find()
        .select_only()
        .column_as(
            SimpleExpr::from(Func::sum(Expr::col(payment::Column::Amount))),
            "revenue",
        )
        .filter(payment::Column::Status.eq(PaymentStatus::Completed))
        .into_tuple::<Option<f64>>()
        .one(db)
        .await?;
    Ok(round2(sum.flatten().unwrap_or(0.0)))
}

/// Counts users, courses and payments.
pub async fn system_stats(db: &DatabaseConnection) -> Result<SystemStats> {
    let mut by_role: BTreeMap<String, u64> = Role::ALL
        .iter()
        .map(|r| (r.canonical_name().to_string(), 0))
        .collect();
    let role_counts = User::find()
        .select_only()
        .column_as(role::Column::Name, "role_name")
        .column_as(count_expr((User, user::Column::Id)), "count")
        .join(JoinType::InnerJoin, user::Relation::Role.def())
        .group_by(role::Column::Name)
        .into_tuple::<(String, i64)>()
        .all(db)
        .await?;
    for (name, count) in role_counts {
        by_role.insert(name, u64::try_from(count).unwrap_or(0));
    }
    let active = User::find()
        .filter(user::Column::IsActive.eq(true))
        .count(db)
        .await?;
    let inactive = User::find()
        .filter(user::Column::IsActive.eq(false))
        .count(db)
        .await?;

    let mut courses = CourseStats::default();
    let course_counts = Course::find()
        .select_only()
        .column(course::Column::Status)
        .column_as(count_expr(course::Column::Id), "count")
        .group_by(course::Column::Status)
        .into_tuple::<(CourseStatus, i64)>()
        .all(db)
        .await?;
    for (status, count) in course_counts {
        let count = u64::try_from(count).unwrap_or(0);
        courses.total += count;
        match status {
            CourseStatus::Pending => courses.pending = count,
            CourseStatus::Active => courses.active = count,
            CourseStatus::Rejected => courses.rejected = count,
            CourseStatus::Inactive => courses.inactive = count,
        }
    }

    let mut payments = PaymentStats::default();
    let payment_counts = Payment::find()
        .select_only()
        .column(payment::Column::Status)
        .column_as(count_expr(payment::Column::Id), "count")
        .group_by(payment::Column::Status)
        .into_tuple::<(PaymentStatus, i64)>()
        .all(db)
        .await?;
    for (status, count) in payment_counts {
        let count = u64::try_from(count).unwrap_or(0);
        payments.total += count;
        match status {
            PaymentStatus::Pending => payments.pending = count,
            PaymentStatus::Completed => payments.completed = count,
            PaymentStatus::Failed => payments.failed = count,
            PaymentStatus::Refunded => payments.refunded = count,
        }
    }
    payments.completed_revenue = completed_revenue(db).await?;

    Ok(SystemStats {
        users: UserStats {
            total: active + inactive,
            active,
            inactive,
            by_role,
        },
        courses,
        payments,
    })
}

/// Admin and Super Admin dashboard.
pub async fn admin_dashboard(
    db: &DatabaseConnection,
    limits: &DashboardSettings,
) -> Result<AdminDashboard> {
    Ok(AdminDashboard {
        stats: system_stats(db).await?,
        recent_enrollments: courses::recent_enrollments(db, limits.recent_limit).await?,
        recent_users: users::recent_users(db, limits.recent_limit).await?,
        recent_audit: audit::recent(db, limits.recent_limit).await?,
    })
}

/// Dashboard for the teacher `teacher_id`.
pub async fn teacher_dashboard(
    db: &DatabaseConnection,
    teacher_id: i64,
    limits: &DashboardSettings,
) -> Result<TeacherDashboard> {
    let owned = courses::courses_by_teacher(db, teacher_id).await?;
    let assignment_count = Assignment::find()
        .filter(assignment::Column::TeacherId.eq(teacher_id))
        .count(db)
        .await?;
    let pending_grading = Submission::find()
        .join(JoinType::InnerJoin, submission::Relation::Assignment.def())
        .filter(assignment::Column::TeacherId.eq(teacher_id))
        .filter(submission::Column::Grade.is_null())
        .count(db)
        .await?;

    Ok(TeacherDashboard {
        stats: TeacherStats {
            courses: owned.len() as u64,
            assignments: assignment_count,
            pending_grading,
        },
        courses: owned,
        recent_assignments: assignments::assignments_for_teacher(
            db,
            teacher_id,
            Some(limits.recent_limit),
        )
        .await?,
    })
}

/// Dashboard for the student `student_id`.
pub async fn student_dashboard(
    db: &DatabaseConnection,
    student_id: i64,
    limits: &DashboardSettings,
) -> Result<StudentDashboard> {
    let enrollments = Enrollment::find()
        .filter(enrollment::Column::StudentId.eq(student_id))
        .filter(enrollment::Column::Status.eq(EnrollmentStatus::Active))
        .count(db)
        .await?;
    let course_ids = courses::active_course_ids(db, student_id).await?;
    let assignment_count = if course_ids.is_empty() {
        0
    } else {
        Assignment::find()
            .filter(assignment::Column::CourseId.is_in(course_ids))
            .count(db)
            .await?
    };
    let completed = Submission::find()
        .filter(submission::Column::StudentId.eq(student_id))
        .filter(submission::Column::Grade.is_not_null())
        .count(db)
        .await?;
    let pending = Submission::find()
        .filter(submission::Column::StudentId.eq(student_id))
        .filter(submission::Column::Grade.is_null())
        .count(db)
        .await?;
    let average_grade = Submission::find()
        .select_only()
        .column_as(
            SimpleExpr::from(Func::avg(Expr::col(submission::Column::Grade))),
            "average",
        )
        .filter(submission::Column::StudentId.eq(student_id))
        .filter(submission::Column::Grade.is_not_null())
        .into_tuple::<Option<f64>>()
        .one(db)
        .await?
        .flatten()
        .map(round2);

    Ok(StudentDashboard {
        stats: StudentStats {
            enrollments,
            assignments: assignment_count,
            completed,
            pending,
            average_grade,
        },
        enrolled_courses: courses::enrolled_courses(db, student_id).await?,
        recent_submissions: submissions::submissions_for_student(
            db,
            student_id,
            Some(limits.student_submission_limit),
        )
        .await?,
        grades: submissions::grades_for_student(db, student_id).await?,
        announcements: announcements::list_announcements(db, Some(limits.recent_limit)).await?,
    })
}

/// Finance Officer dashboard.
pub async fn finance_dashboard(
    db: &DatabaseConnection,
    limits: &DashboardSettings,
) -> Result<FinanceDashboard> {
    let pending_payments = Payment::find()
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .count(db)
        .await?;
    Ok(FinanceDashboard {
        total_revenue: completed_revenue(db).await?,
        pending_payments,
        recent_payments: payments::recent_payments(db, limits.recent_limit).await?,
    })
}
