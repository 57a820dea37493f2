//! Audit recorder.
//!
//! [`record`] appends one entry per security-relevant action. A failed write never fails
//! the action that triggered it: the failure is logged and reported back as
//! [`AuditOutcome::Failed`] so callers can decide whether to care. Entries are only ever
//! inserted; there is no update or delete path.

use super::Page;
use crate::entities::{AuditLog, audit_log, user};
use crate::errors::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    Set,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

/// Action codes written by this crate.
pub mod actions {
    /// Successful login
    pub const LOGIN: &str = "login";
    /// Rejected login; metadata carries the reason
    pub const FAILED_LOGIN: &str = "failed_login";
    /// Session ended by the user
    pub const LOGOUT: &str = "logout";
    /// Self-service registration
    pub const REGISTER: &str = "register";
    /// Reset token issued
    pub const PASSWORD_RESET_REQUESTED: &str = "password_reset_requested";
    /// Password changed through a reset token
    pub const PASSWORD_RESET_SUCCESS: &str = "password_reset_success";
    /// Own profile edited
    pub const PROFILE_UPDATE: &str = "profile_update";
    pub const ADMIN_CREATE_USER: &str = "ADMIN_CREATE_USER";
    pub const ADMIN_UPDATE_USER: &str = "ADMIN_UPDATE_USER";
    pub const ADMIN_DELETE_USER: &str = "ADMIN_DELETE_USER";
    pub const ADMIN_MODERATE_COURSE: &str = "ADMIN_MODERATE_COURSE";
    pub const COURSE_CREATE: &str = "COURSE_CREATE";
    pub const COURSE_UPDATE: &str = "COURSE_UPDATE";
    pub const COURSE_DELETE: &str = "COURSE_DELETE";
    pub const COURSE_ENROLL: &str = "COURSE_ENROLL";
    pub const COURSE_UNENROLL: &str = "COURSE_UNENROLL";
    pub const ASSIGNMENT_CREATE: &str = "ASSIGNMENT_CREATE";
    pub const ASSIGNMENT_UPDATE: &str = "ASSIGNMENT_UPDATE";
    pub const ASSIGNMENT_DELETE: &str = "ASSIGNMENT_DELETE";
    pub const SUBMISSION_CREATE: &str = "SUBMISSION_CREATE";
    pub const GRADE_SUBMISSION: &str = "GRADE_SUBMISSION";
    pub const PAYMENT_PROCESSED: &str = "PAYMENT_PROCESSED";
    pub const PAYMENT_REFUND: &str = "PAYMENT_REFUND";
    pub const ANNOUNCEMENT_CREATE: &str = "ANNOUNCEMENT_CREATE";
    pub const ANNOUNCEMENT_UPDATE: &str = "ANNOUNCEMENT_UPDATE";
    pub const ANNOUNCEMENT_DELETE: &str = "ANNOUNCEMENT_DELETE";
}

/// Result of an audit write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Entry stored with this id
    Recorded(i64),
    /// Store rejected the write; the reason has already been logged
    Failed(String),
}

impl AuditOutcome {
    /// Whether the entry was stored.
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}

/// Appends an audit entry.
///
/// # Arguments
/// * `actor_id` - Acting user, `None` for anonymous actions such as failed logins
/// * `action` - Action code, see [`actions`]
/// * `metadata` - Structured details; use `Value::Null` when there are none
pub async fn record<C: ConnectionTrait>(
    db: &C,
    actor_id: Option<i64>,
    action: &str,
    metadata: Value,
) -> AuditOutcome {
    let entry = audit_log::ActiveModel {
        actor_id: Set(actor_id),
        action: Set(action.to_string()),
        metadata: Set(metadata),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match entry.insert(db).await {
        Ok(model) => {
            debug!("Audit {action} by {actor_id:?} recorded as {}", model.id);
            AuditOutcome::Recorded(model.id)
        }
        Err(e) => {
            error!("Failed to record audit entry {action} for {actor_id:?}: {e}");
            AuditOutcome::Failed(e.to_string())
        }
    }
}

/// Audit entry joined with the actor's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryView {
    pub id: i64,
    pub actor_id: Option<i64>,
    /// `None` for anonymous actions
    pub actor_name: Option<String>,
    pub action: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Filters for [`list`]. All fields are optional and combine with AND.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only entries by this user
    pub actor_id: Option<i64>,
    /// Substring of the action code
    pub action: Option<String>,
    /// Inclusive lower bound on the creation time
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the creation time
    pub to: Option<DateTime<Utc>>,
}

fn entries_query() -> sea_orm::Select<AuditLog> {
    AuditLog::find()
        .select_only()
        .column(audit_log::Column::Id)
        .column(audit_log::Column::ActorId)
        .column_as(user::Column::Name, "actor_name")
        .column(audit_log::Column::Action)
        .column(audit_log::Column::Metadata)
        .column(audit_log::Column::CreatedAt)
        .join(JoinType::LeftJoin, audit_log::Relation::Actor.def())
        .order_by_desc(audit_log::Column::CreatedAt)
        .order_by_desc(audit_log::Column::Id)
}

/// Lists entries newest first, one page at a time.
///
/// `page` is 1-based; `page_size` is clamped to 1..=100.
pub async fn list(
    db: &DatabaseConnection,
    filter: &AuditFilter,
    page: u64,
    page_size: u64,
) -> Result<Page<AuditEntryView>> {
    let condition = Condition::all()
        .add_option(filter.actor_id.map(|id| audit_log::Column::ActorId.eq(id)))
        .add_option(
            filter
                .action
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(|a| audit_log::Column::Action.contains(a)),
        )
        .add_option(filter.from.map(|from| audit_log::Column::CreatedAt.gte(from)))
        .add_option(filter.to.map(|to| audit_log::Column::CreatedAt.lte(to)));

    let page_size = page_size.clamp(1, 100);
    let page = page.max(1);
    let paginator = entries_query()
        .filter(condition)
        .into_model::<AuditEntryView>()
        .paginate(db, page_size);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;
    Ok(Page::new(items, total, page, page_size))
}

/// The `limit` most recent entries.
pub async fn recent(db: &DatabaseConnection, limit: u64) -> Result<Vec<AuditEntryView>> {
    entries_query()
        .limit(limit)
        .into_model::<AuditEntryView>()
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_with_and_without_actor() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Audited", "audited@example.com", crate::core::access::Role::Student).await?;

        let outcome = record(&db, Some(user.id), actions::LOGIN, json!({"ip": "127.0.0.1"})).await;
        assert!(outcome.is_recorded());
        let outcome = record(
            &db,
            None,
            actions::FAILED_LOGIN,
            json!({"email": "ghost@example.com", "reason": "user_not_found"}),
        )
        .await;
        assert!(outcome.is_recorded());

        let entries = recent(&db, 10).await?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, actions::FAILED_LOGIN);
        assert_eq!(entries[0].actor_name, None);
        assert_eq!(entries[1].actor_name.as_deref(), Some("Audited"));
        assert_eq!(entries[1].metadata["ip"], "127.0.0.1");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_not_raised() -> Result<()> {
        let db = setup_test_db().await?;
        // Actor does not exist, so the foreign key rejects the row.
        let outcome = record(&db, Some(9999), actions::LOGIN, Value::Null).await;
        assert!(matches!(outcome, AuditOutcome::Failed(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Pager", "pager@example.com", crate::core::access::Role::Admin).await?;
        for _ in 0..3 {
            record(&db, Some(user.id), actions::COURSE_CREATE, Value::Null).await;
        }
        record(&db, Some(user.id), actions::LOGIN, Value::Null).await;
        record(&db, None, actions::FAILED_LOGIN, Value::Null).await;

        let filter = AuditFilter {
            action: Some("COURSE".to_string()),
            ..Default::default()
        };
        let page = list(&db, &filter, 1, 2).await?;
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|e| e.action == actions::COURSE_CREATE));

        let filter = AuditFilter {
            actor_id: Some(user.id),
            ..Default::default()
        };
        assert_eq!(list(&db, &filter, 1, 50).await?.total, 4);

        let filter = AuditFilter {
            to: Some(Utc::now() - chrono::Duration::days(1)),
            ..Default::default()
        };
        assert_eq!(list(&db, &filter, 1, 50).await?.total, 0);
        Ok(())
    }
}
