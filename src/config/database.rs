//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so foreign keys follow the `belongs_to` relations. Composite uniqueness that the entity
//! macros cannot express (one enrollment per student and course, one submission per student
//! and assignment) is added as explicit unique indexes.

use crate::core::access::Role as RoleKind;
use crate::entities::{
    Announcement, Assignment, AuditLog, Course, Enrollment, PasswordResetToken, Payment, Role,
    Session, Submission, User, enrollment, role, submission,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Schema, Set,
};
use tracing::{debug, info};

/// Default location of the `SQLite` database file.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/lms.sqlite?mode=rwc";

/// Establishes a connection to the database at `url` and enables foreign key enforcement.
pub async fn create_connection(url: &str) -> Result<DatabaseConnection> {
    if let Some(path) = url
        .strip_prefix("sqlite://")
        .and_then(|rest| rest.split('?').next())
        .and_then(|file| std::path::Path::new(file).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(path)?;
    }

    let db = Database::connect(url).await?;
    db.execute_unprepared("PRAGMA foreign_keys = ON").await?;
    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()> {
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    debug!("Ensured table {}", entity.table_name());
    Ok(())
}

/// Creates all tables and indexes, skipping any that already exist.
///
/// Tables are created parents first so foreign keys resolve.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table(db, &schema, Role).await?;
    create_table(db, &schema, User).await?;
    create_table(db, &schema, Course).await?;
    create_table(db, &schema, Enrollment).await?;
    create_table(db, &schema, Assignment).await?;
    create_table(db, &schema, Submission).await?;
    create_table(db, &schema, Payment).await?;
    create_table(db, &schema, Announcement).await?;
    create_table(db, &schema, AuditLog).await?;
    create_table(db, &schema, PasswordResetToken).await?;
    create_table(db, &schema, Session).await?;

    let enrollment_index = Index::create()
        .name("idx_enrollments_student_course")
        .table(Enrollment)
        .col(enrollment::Column::StudentId)
        .col(enrollment::Column::CourseId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&enrollment_index)).await?;

    let submission_index = Index::create()
        .name("idx_submissions_assignment_student")
        .table(Submission)
        .col(submission::Column::AssignmentId)
        .col(submission::Column::StudentId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&submission_index)).await?;

    Ok(())
}

/// Inserts every role of [`RoleKind::ALL`] that is not yet present.
pub async fn seed_roles(db: &DatabaseConnection) -> Result<()> {
    for kind in RoleKind::ALL {
        let exists = Role::find()
            .filter(role::Column::Name.eq(kind.canonical_name()))
            .one(db)
            .await?
            .is_some();
        if !exists {
            role::ActiveModel {
                name: Set(kind.canonical_name().to_string()),
                ..Default::default()
            }
            .insert(db)
            .await?;
            info!("Seeded role {}", kind.canonical_name());
        }
    }
    Ok(())
}

/// Connects, creates the schema and seeds roles.
pub async fn init_database(url: &str) -> Result<DatabaseConnection> {
    let db = create_connection(url).await?;
    create_tables(&db).await?;
    seed_roles(&db).await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{course, user};
    use crate::errors::is_unique_violation;
    use crate::test_utils::setup_test_db;
    use sea_orm::PaginatorTrait;

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        create_tables(&db).await?;
        seed_roles(&db).await?;

        assert_eq!(Role::find().count(&db).await?, RoleKind::ALL.len() as u64);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_enrollment_is_rejected_by_storage() -> Result<()> {
        let db = setup_test_db().await?;
        let now = chrono::Utc::now();
        let student_role = Role::find()
            .filter(role::Column::Name.eq("Student"))
            .one(&db)
            .await?
            .unwrap();
        let teacher = user::ActiveModel {
            name: Set("T".to_string()),
            email: Set("t@example.com".to_string()),
            password_hash: Set("x".to_string()),
            role_id: Set(student_role.id),
            is_active: Set(true),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await?;
        let course = course::ActiveModel {
            title: Set("Rust".to_string()),
            description: Set(String::new()),
            teacher_id: Set(teacher.id),
            price: Set(0.0),
            status: Set(crate::entities::CourseStatus::Active),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let row = || enrollment::ActiveModel {
            student_id: Set(teacher.id),
            course_id: Set(course.id),
            status: Set(crate::entities::EnrollmentStatus::Active),
            enrolled_at: Set(now),
            ..Default::default()
        };
        row().insert(&db).await?;
        let err = row().insert(&db).await.unwrap_err();
        assert!(is_unique_violation(&err));
        Ok(())
    }
}
