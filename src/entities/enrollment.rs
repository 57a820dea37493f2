//! Enrollment entity - Links a student to a course.
//!
//! At most one row exists per (student, course); leaving a course flips the status instead
//! of deleting the row so re-enrolling reactivates it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether an enrollment currently grants access
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    /// Student has access to the course
    #[sea_orm(string_value = "active")]
    Active,
    /// Student left or was removed
    #[sea_orm(string_value = "inactive")]
    Inactive,
}

/// Enrollment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "enrollments")]
pub struct Model {
    /// Unique identifier for the enrollment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Enrolled student
    pub student_id: i64,
    /// Course enrolled in
    pub course_id: i64,
    /// Current status
    pub status: EnrollmentStatus,
    /// When the enrollment was (last) activated
    pub enrolled_at: DateTimeUtc,
}

/// Defines relationships between Enrollment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each enrollment belongs to one student
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::StudentId",
        to = "super::user::Column::Id"
    )]
    Student,
    /// Each enrollment belongs to one course
    #[sea_orm(
        belongs_to = "super::course::Entity",
        from = "Column::CourseId",
        to = "super::course::Column::Id"
    )]
    Course,
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
