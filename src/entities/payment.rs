//! Payment entity - One charge attempt for a course.
//!
//! A row is written for every processor response, successful or not, so failed attempts
//! stay visible to finance staff.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Recorded but not yet settled
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Charge succeeded
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Charge was declined
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Completed charge that was later refunded
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl PaymentStatus {
    /// Lowercase name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

/// Payment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Paying student
    pub student_id: i64,
    /// Course being paid for
    pub course_id: i64,
    /// Amount charged
    pub amount: f64,
    /// Payment method reported by the client, e.g. "card"
    pub method: String,
    /// Current state
    pub status: PaymentStatus,
    /// Processor reference
    pub transaction_id: String,
    /// When the charge was attempted
    pub created_at: DateTimeUtc,
    /// When it was refunded
    pub refunded_at: Option<DateTimeUtc>,
    /// Reason given for the refund
    pub refund_reason: Option<String>,
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment was made by one student
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::StudentId",
        to = "super::user::Column::Id"
    )]
    Student,
    /// Each payment is for one course
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
