//! Shared test utilities.
//!
//! Helpers set up an in-memory database and insert rows directly, skipping the
//! audit trail and the validation done by the `core` operations.

use crate::{
    config::{database, settings::AuthSettings},
    core::access::{AuthContext, Role},
    core::users::role_id_for,
    entities::{self, CourseStatus, EnrollmentStatus},
    errors::Result,
};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Password of every user created by [`create_test_user`].
pub const TEST_PASSWORD: &str = "Secret123";

static NEXT_USER: AtomicU64 = AtomicU64::new(1);

/// Routes `tracing` output through the test harness. Safe to call more than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables and roles in place.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = database::create_connection("sqlite::memory:").await?;
    database::create_tables(&db).await?;
    database::seed_roles(&db).await?;
    Ok(db)
}

/// Auth settings at the lowest production cost.
pub fn test_auth_settings() -> AuthSettings {
    AuthSettings {
        bcrypt_cost: crate::config::settings::MIN_BCRYPT_COST,
        ..AuthSettings::default()
    }
}

/// Inserts an active user with [`TEST_PASSWORD`].
///
/// The hash uses bcrypt's minimum cost so tests stay fast.
pub async fn create_test_user(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
    role: Role,
) -> Result<entities::user::Model> {
    let password_hash = bcrypt::hash(TEST_PASSWORD, 4).map_err(|e| crate::errors::Error::Internal {
        message: e.to_string(),
    })?;
    let user = entities::user::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(password_hash),
        role_id: Set(role_id_for(db, role).await?),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(user)
}

/// Inserts a user with a unique email and returns it with its [`AuthContext`].
pub async fn create_test_actor(
    db: &DatabaseConnection,
    role: Role,
) -> Result<(entities::user::Model, AuthContext)> {
    let n = NEXT_USER.fetch_add(1, Ordering::Relaxed);
    let slug = role.canonical_name().to_lowercase().replace(' ', "-");
    let user = create_test_user(
        db,
        &format!("{} {n}", role.canonical_name()),
        &format!("{slug}{n}@example.com"),
        role,
    )
    .await?;
    let ctx = AuthContext::new(user.id, user.name.clone(), role);
    Ok((user, ctx))
}

/// Inserts an active course owned by `teacher_id`.
pub async fn create_test_course(
    db: &DatabaseConnection,
    teacher_id: i64,
    title: &str,
    price: f64,
) -> Result<entities::course::Model> {
    let course = entities::course::ActiveModel {
        title: Set(title.to_string()),
        description: Set(format!("{title} description")),
        teacher_id: Set(teacher_id),
        price: Set(price),
        status: Set(CourseStatus::Active),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(course)
}

/// Inserts an active enrollment.
pub async fn enroll_test_student(
    db: &DatabaseConnection,
    student_id: i64,
    course_id: i64,
) -> Result<entities::enrollment::Model> {
    let enrollment = entities::enrollment::ActiveModel {
        student_id: Set(student_id),
        course_id: Set(course_id),
        status: Set(EnrollmentStatus::Active),
        enrolled_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(enrollment)
}

/// Inserts a 100-point assignment due `due_in` from now. Negative offsets are already past due.
pub async fn create_test_assignment(
    db: &DatabaseConnection,
    course_id: i64,
    teacher_id: i64,
    due_in: Duration,
) -> Result<entities::assignment::Model> {
    let n = NEXT_USER.fetch_add(1, Ordering::Relaxed);
    let assignment = entities::assignment::ActiveModel {
        course_id: Set(course_id),
        teacher_id: Set(teacher_id),
        title: Set(format!("Assignment {n}")),
        description: Set("Answer every question".to_string()),
        max_points: Set(100.0),
        due_date: Set(Utc::now() + due_in),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(assignment)
}
