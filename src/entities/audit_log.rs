//! Audit log entity - Append-only record of security-relevant actions.
//!
//! Entries are never updated or deleted. `actor_id` is null when nobody is authenticated,
//! e.g. for failed logins.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who performed the action, if any
    pub actor_id: Option<i64>,
    /// Action code, e.g. "login" or "ASSIGNMENT_CREATE"
    pub action: String,
    /// Structured details about the action
    pub metadata: Json,
    /// When the action happened
    pub created_at: DateTimeUtc,
}

/// Defines relationships between AuditLog and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Acting user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ActorId",
        to = "super::user::Column::Id"
    )]
    Actor,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Actor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
