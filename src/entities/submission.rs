//! Submission entity - A student's answer to an assignment.
//!
//! One row per (assignment, student). `grade` stays `None` until a teacher grades it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Submission database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    /// Unique identifier for the submission
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Assignment answered
    pub assignment_id: i64,
    /// Submitting student
    pub student_id: i64,
    /// Inline text answer
    pub content: Option<String>,
    /// Name of an attached file
    pub file_name: Option<String>,
    /// When it was submitted
    pub submitted_at: DateTimeUtc,
    /// Points awarded, between 0 and the assignment maximum
    pub grade: Option<f64>,
    /// Grader's comments
    pub feedback: Option<String>,
    /// When it was graded
    pub graded_at: Option<DateTimeUtc>,
    /// Who graded it
    pub graded_by: Option<i64>,
}

/// Defines relationships between Submission and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each submission answers one assignment
    #[sea_orm(
        belongs_to = "super::assignment::Entity",
        from = "Column::AssignmentId",
        to = "super::assignment::Column::Id"
    )]
    Assignment,
    /// Each submission belongs to one student
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::StudentId",
        to = "super::user::Column::Id"
    )]
    Student,
    /// Grader, once graded
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::GradedBy",
        to = "super::user::Column::Id"
    )]
    Grader,
}

impl Related<super::assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
