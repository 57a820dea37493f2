//! End-to-end walk through a course's life: registration, moderation, payment,
//! submission, grading and the dashboards that summarise it.

#![allow(clippy::unwrap_used)]
#![allow(clippy::float_cmp)]

use super::access::{AuthContext, Role};
use super::assignments::{NewAssignment, create_assignment};
use super::audit::{self, AuditFilter, actions};
use super::auth::{Registration, authenticate, register};
use super::courses::{ModerationAction, NewCourse, create_course, moderate_course};
use super::dashboard::{self, Dashboard};
use super::payments::{MockPaymentProcessor, process_payment};
use super::submissions::{NewSubmission, get_submission, grade, submit};
use super::users::{NewUser, create_user};
use crate::config::settings::DashboardSettings;
use crate::entities::{
    CourseStatus, Enrollment, Payment, PaymentStatus, enrollment, payment,
};
use crate::errors::{Error, ErrorKind, Result};
use crate::test_utils::*;
use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

#[tokio::test]
async fn test_course_lifecycle() -> Result<()> {
    let db = setup_test_db().await?;
    let settings = test_auth_settings();
    let limits = DashboardSettings::default();
    let processor = MockPaymentProcessor::default();
    let (_, admin) = create_test_actor(&db, Role::SuperAdmin).await?;

    // Registration assigns the Student role.
    let alice = register(
        &db,
        &settings,
        Registration {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "Passw0rd1".to_string(),
        },
    )
    .await?;
    let login = authenticate(&db, "alice@example.com", "Passw0rd1", None).await?;
    assert_eq!(login.identity.role_name, "Student");
    let alice_ctx = AuthContext::from_identity(&login.identity)?;
    assert_eq!(alice_ctx.role, Role::Student);
    assert_eq!(alice_ctx.user_id, alice.id);

    let teacher = create_user(
        &db,
        &settings,
        &admin,
        NewUser {
            name: "Tom Teacher".to_string(),
            email: "tom@example.com".to_string(),
            password: "Teach1ng!".to_string(),
            role: Role::Teacher,
        },
    )
    .await?;
    let teacher_ctx = AuthContext::new(teacher.id, teacher.name.clone(), Role::Teacher);

    // An admin-created course waits for moderation.
    let course = create_course(
        &db,
        &admin,
        NewCourse {
            title: "Intro to X".to_string(),
            description: "Everything about X".to_string(),
            price: 30.0,
            teacher_id: Some(teacher.id),
        },
    )
    .await?;
    assert_eq!(course.status, CourseStatus::Pending);
    assert_eq!(course.teacher_id, teacher.id);

    let course = moderate_course(&db, &admin, course.id, ModerationAction::Approve, None).await?;
    assert_eq!(course.status, CourseStatus::Active);

    // Paying enrolls exactly once.
    let receipt = process_payment(&db, &processor, &alice_ctx, course.id, "card").await?;
    assert_eq!(receipt.payment.status, PaymentStatus::Completed);
    assert!(receipt.enrollment.is_some());

    let err = process_payment(&db, &processor, &alice_ctx, course.id, "card").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyEnrolled { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let enrollments = Enrollment::find()
        .filter(enrollment::Column::StudentId.eq(alice.id))
        .count(&db)
        .await?;
    assert_eq!(enrollments, 1);
    let payments = Payment::find()
        .filter(payment::Column::StudentId.eq(alice.id))
        .count(&db)
        .await?;
    assert_eq!(payments, 1);

    let assignment = create_assignment(
        &db,
        &teacher_ctx,
        NewAssignment {
            course_id: course.id,
            title: "Week 1".to_string(),
            description: "Read chapter one".to_string(),
            max_points: None,
            due_date: Utc::now() + Duration::days(7),
        },
    )
    .await?;

    // One submission per student and assignment.
    let answer = || NewSubmission {
        content: Some("My answer".to_string()),
        file_name: None,
    };
    let submission = submit(&db, &alice_ctx, assignment.id, answer()).await?;
    assert_eq!(submission.grade, None);
    let err = submit(&db, &alice_ctx, assignment.id, answer()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Over-maximum grades leave the submission untouched.
    let err = grade(&db, &teacher_ctx, submission.id, 101.0, None).await.unwrap_err();
    assert!(matches!(err, Error::PointsExceedMaximum { .. }));
    assert_eq!(get_submission(&db, submission.id).await?.grade, None);

    let graded = grade(&db, &teacher_ctx, submission.id, 88.0, Some("Solid".to_string())).await?;
    assert_eq!(graded.grade, Some(88.0));
    assert_eq!(graded.graded_by, Some(teacher.id));

    let filter = AuditFilter {
        action: Some(actions::GRADE_SUBMISSION.to_string()),
        ..Default::default()
    };
    let grading = audit::list(&db, &filter, 1, 10).await?;
    assert_eq!(grading.total, 1);
    assert_eq!(grading.items[0].actor_id, Some(teacher.id));

    // Dashboards reflect the finished flow.
    let Dashboard::Student(student) = dashboard::build(&db, &alice_ctx, &limits).await? else {
        panic!("expected a student dashboard");
    };
    assert_eq!(student.stats.enrollments, 1);
    assert_eq!(student.stats.assignments, 1);
    assert_eq!(student.stats.completed, 1);
    assert_eq!(student.stats.pending, 0);
    assert_eq!(student.stats.average_grade, Some(88.0));

    let Dashboard::Teacher(teaching) = dashboard::build(&db, &teacher_ctx, &limits).await? else {
        panic!("expected a teacher dashboard");
    };
    assert_eq!(teaching.stats.courses, 1);
    assert_eq!(teaching.stats.pending_grading, 0);

    let Dashboard::Admin(overview) = dashboard::build(&db, &admin, &limits).await? else {
        panic!("expected an admin dashboard");
    };
    assert_eq!(overview.stats.users.total, 3);
    assert_eq!(overview.stats.courses.active, 1);
    assert_eq!(overview.stats.payments.completed_revenue, 30.0);
    Ok(())
}
