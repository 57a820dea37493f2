//! Announcement business logic.

use super::access::{self, AuthContext};
use super::audit::{self, actions};
use crate::entities::{Announcement, announcement, user};
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType, QueryOrder,
    QuerySelect, RelationTrait, Set,
};
use serde::Serialize;
use serde_json::json;

fn clean(title: &str, message: &str) -> Result<(String, String)> {
    let title = title.trim();
    let message = message.trim();
    if title.is_empty() || title.chars().count() > 255 {
        return Err(Error::validation("Announcement title is required (max 255 characters)"));
    }
    if message.is_empty() {
        return Err(Error::validation("Announcement message is required"));
    }
    Ok((title.to_string(), message.to_string()))
}

async fn get_announcement(db: &DatabaseConnection, id: i64) -> Result<announcement::Model> {
    Announcement::find_by_id(id).one(db).await?.ok_or(Error::NotFound {
        entity: "Announcement",
        id,
    })
}

fn require_author_or_admin(ctx: &AuthContext, existing: &announcement::Model) -> Result<()> {
    match existing.author_id {
        Some(author) => ctx.require_owner_or_admin(author, "announcement"),
        None if ctx.is_admin() => Ok(()),
        None => Err(Error::forbidden("only administrators may edit this announcement")),
    }
}

/// Posts an announcement as the caller.
pub async fn create_announcement(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    title: &str,
    message: &str,
) -> Result<announcement::Model> {
    ctx.require_role(access::ANNOUNCERS)?;
    let (title, message) = clean(title, message)?;

    let announcement = announcement::ActiveModel {
        title: Set(title),
        message: Set(message),
        author_id: Set(Some(ctx.user_id)),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::ANNOUNCEMENT_CREATE,
        json!({ "announcement_id": announcement.id, "title": announcement.title }),
    )
    .await;
    Ok(announcement)
}

/// Replaces the title and message of an announcement.
pub async fn update_announcement(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    id: i64,
    title: &str,
    message: &str,
) -> Result<announcement::Model> {
    ctx.require_role(access::ANNOUNCERS)?;
    let existing = get_announcement(db, id).await?;
    require_author_or_admin(ctx, &existing)?;
    let (title, message) = clean(title, message)?;

    let mut active: announcement::ActiveModel = existing.into();
    active.title = Set(title);
    active.message = Set(message);
    let updated = active.update(db).await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::ANNOUNCEMENT_UPDATE,
        json!({ "announcement_id": id }),
    )
    .await;
    Ok(updated)
}

/// Deletes an announcement.
pub async fn delete_announcement(db: &DatabaseConnection, ctx: &AuthContext, id: i64) -> Result<()> {
    ctx.require_role(access::ANNOUNCERS)?;
    let existing = get_announcement(db, id).await?;
    require_author_or_admin(ctx, &existing)?;

    Announcement::delete_by_id(id).exec(db).await?;
    audit::record(
        db,
        Some(ctx.user_id),
        actions::ANNOUNCEMENT_DELETE,
        json!({ "announcement_id": id, "title": existing.title }),
    )
    .await;
    Ok(())
}

/// Announcement with its author's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementView {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Announcements newest first, at most `limit` when given.
pub async fn list_announcements(
    db: &DatabaseConnection,
    limit: Option<u64>,
) -> Result<Vec<AnnouncementView>> {
    Announcement::find()
        .select_only()
        .column(announcement::Column::Id)
        .column(announcement::Column::Title)
        .column(announcement::Column::Message)
        .column(announcement::Column::AuthorId)
        .column_as(user::Column::Name, "author_name")
        .column(announcement::Column::CreatedAt)
        .join(JoinType::LeftJoin, announcement::Relation::Author.def())
        .order_by_desc(announcement::Column::CreatedAt)
        .order_by_desc(announcement::Column::Id)
        .limit(limit)
        .into_model::<AnnouncementView>()
        .all(db)
        .await
        .map_err(Into::into)
}
