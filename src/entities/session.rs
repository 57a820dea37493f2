//! Session entity - Server-side HTTP session records.
//!
//! `data` holds the serialized session record as JSON text; `expiry_date` is a unix
//! timestamp in seconds so expired rows can be swept with a single comparison.

use sea_orm::entity::prelude::*;

/// Session database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    /// Session id as carried in the cookie
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// JSON-encoded session record
    #[sea_orm(column_type = "Text")]
    pub data: String,
    /// Unix timestamp after which the session is invalid
    pub expiry_date: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
