//! User management - Admin CRUD over accounts plus self-service profile edits.
//!
//! Deletion is refused for the caller's own account and surfaces [`Error::Conflict`] when
//! other rows still reference the user; deactivation is the normal way to retire an account.

use super::Page;
use super::access::{AuthContext, Role};
use super::audit::{self, actions};
use super::auth::{check_password_policy, hash_password, normalize_email, validate_email};
use crate::config::settings::{AuthSettings, SeedAdmin};
use crate::entities::{Role as RoleEntity, User, role, user};
use crate::errors::{Error, Result, is_foreign_key_violation, is_unique_violation};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

/// Role row id for `role`.
pub async fn role_id_for(db: &DatabaseConnection, role: Role) -> Result<i32> {
    RoleEntity::find()
        .filter(role::Column::Name.eq(role.canonical_name()))
        .one(db)
        .await?
        .map(|r| r.id)
        .ok_or_else(|| Error::Internal {
            message: format!("role {role} has not been seeded"),
        })
}

/// Looks up a user by already normalized email.
pub async fn find_by_email(db: &DatabaseConnection, email: &str) -> Result<Option<user::Model>> {
    User::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a user by id.
pub async fn get_user(db: &DatabaseConnection, user_id: i64) -> Result<user::Model> {
    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "User",
            id: user_id,
        })
}

/// User row joined with its role name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Filters for [`list_users`].
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    /// Substring of name or email
    pub search: Option<String>,
}

fn summaries() -> sea_orm::Select<User> {
    User::find()
        .select_only()
        .column(user::Column::Id)
        .column(user::Column::Name)
        .column(user::Column::Email)
        .column_as(role::Column::Name, "role_name")
        .column(user::Column::IsActive)
        .column(user::Column::CreatedAt)
        .join(JoinType::InnerJoin, user::Relation::Role.def())
}

/// Lists users newest first.
pub async fn list_users(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    filter: &UserFilter,
    page: u64,
    page_size: u64,
) -> Result<Page<UserSummary>> {
    ctx.require_role(super::access::ADMINS)?;

    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let condition = Condition::all()
        .add_option(filter.role.map(|r| role::Column::Name.eq(r.canonical_name())))
        .add_option(filter.is_active.map(|a| user::Column::IsActive.eq(a)))
        .add_option(search.map(|s| {
            Condition::any()
                .add(user::Column::Name.contains(s))
                .add(user::Column::Email.contains(s))
        }));

    let page_size = page_size.clamp(1, 100);
    let page = page.max(1);
    let paginator = summaries()
        .filter(condition)
        .order_by_desc(user::Column::CreatedAt)
        .order_by_desc(user::Column::Id)
        .into_model::<UserSummary>()
        .paginate(db, page_size);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;
    Ok(Page::new(items, total, page, page_size))
}

/// The `limit` newest users.
pub async fn recent_users(db: &DatabaseConnection, limit: u64) -> Result<Vec<UserSummary>> {
    summaries()
        .order_by_desc(user::Column::CreatedAt)
        .order_by_desc(user::Column::Id)
        .limit(limit)
        .into_model::<UserSummary>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Account created by an administrator.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

fn check_role_grant(ctx: &AuthContext, role: Role) -> Result<()> {
    if role == Role::SuperAdmin && ctx.role != Role::SuperAdmin {
        return Err(Error::forbidden("only a Super Admin may grant the Super Admin role"));
    }
    Ok(())
}

/// Only a Super Admin may change or remove a Super Admin account.
async fn check_target(db: &DatabaseConnection, ctx: &AuthContext, target: &user::Model) -> Result<()> {
    if ctx.role != Role::SuperAdmin && target.role_id == role_id_for(db, Role::SuperAdmin).await? {
        return Err(Error::forbidden("only a Super Admin may manage a Super Admin account"));
    }
    Ok(())
}

fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 120 {
        return Err(Error::validation("Name must be between 1 and 120 characters"));
    }
    Ok(name.to_string())
}

fn unique_email(e: sea_orm::DbErr) -> Error {
    if is_unique_violation(&e) {
        Error::DuplicateEmail
    } else {
        e.into()
    }
}

async fn insert_account(
    db: &DatabaseConnection,
    settings: &AuthSettings,
    new_user: &NewUser,
) -> Result<user::Model> {
    let name = clean_name(&new_user.name)?;
    let email = normalize_email(&new_user.email);
    validate_email(&email)?;
    if find_by_email(db, &email).await?.is_some() {
        return Err(Error::DuplicateEmail);
    }
    check_password_policy(&new_user.password)?;

    let password_hash = hash_password(&new_user.password, settings.bcrypt_cost).await?;
    let role_id = role_id_for(db, new_user.role).await?;
    user::ActiveModel {
        name: Set(name),
        email: Set(email),
        password_hash: Set(password_hash),
        role_id: Set(role_id),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(unique_email)
}

/// Creates the configured Super Admin unless an account with that email exists.
///
/// Returns the new account, or `None` when nothing was created.
pub async fn ensure_seed_admin(
    db: &DatabaseConnection,
    settings: &AuthSettings,
    seed: &SeedAdmin,
) -> Result<Option<user::Model>> {
    if find_by_email(db, &normalize_email(&seed.email)).await?.is_some() {
        return Ok(None);
    }
    let new_user = NewUser {
        name: seed.name.clone(),
        email: seed.email.clone(),
        password: seed.password.clone(),
        role: Role::SuperAdmin,
    };
    let user = insert_account(db, settings, &new_user).await?;
    info!("Seeded Super Admin account {}", user.email);
    Ok(Some(user))
}

/// Creates an account with an explicit role.
#[instrument(skip(db, settings, new_user))]
pub async fn create_user(
    db: &DatabaseConnection,
    settings: &AuthSettings,
    ctx: &AuthContext,
    new_user: NewUser,
) -> Result<user::Model> {
    ctx.require_role(super::access::ADMINS)?;
    check_role_grant(ctx, new_user.role)?;
    let user = insert_account(db, settings, &new_user).await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::ADMIN_CREATE_USER,
        json!({ "user_id": user.id, "email": user.email, "role": new_user.role.canonical_name() }),
    )
    .await;
    info!("User {} created account {} as {}", ctx.user_id, user.id, new_user.role);
    Ok(user)
}

/// Fields an administrator may change. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Applies an administrative update.
pub async fn update_user(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    user_id: i64,
    update: UserUpdate,
) -> Result<user::Model> {
    ctx.require_role(super::access::ADMINS)?;
    let existing = get_user(db, user_id).await?;
    check_target(db, ctx, &existing).await?;

    if user_id == ctx.user_id && update.is_active == Some(false) {
        return Err(Error::forbidden("you cannot deactivate your own account"));
    }

    let mut active: user::ActiveModel = existing.into();
    let mut changed = Vec::new();
    if let Some(name) = update.name.as_deref() {
        active.name = Set(clean_name(name)?);
        changed.push("name");
    }
    if let Some(email) = update.email.as_deref() {
        let email = normalize_email(email);
        validate_email(&email)?;
        if find_by_email(db, &email)
            .await?
            .is_some_and(|other| other.id != user_id)
        {
            return Err(Error::DuplicateEmail);
        }
        active.email = Set(email);
        changed.push("email");
    }
    if let Some(role) = update.role {
        check_role_grant(ctx, role)?;
        active.role_id = Set(role_id_for(db, role).await?);
        changed.push("role");
    }
    if let Some(is_active) = update.is_active {
        active.is_active = Set(is_active);
        changed.push("is_active");
    }

    let user = active.update(db).await.map_err(unique_email)?;
    audit::record(
        db,
        Some(ctx.user_id),
        actions::ADMIN_UPDATE_USER,
        json!({ "user_id": user.id, "changed": changed, "role": update.role.map(Role::canonical_name) }),
    )
    .await;
    Ok(user)
}

/// Deletes an account.
///
/// # Errors
/// * [`Error::Forbidden`] - `user_id` is the caller, or a Super Admin and the caller is not
/// * [`Error::NotFound`] - no such user
/// * [`Error::Conflict`] - other rows (courses, payments, audit entries, ...) reference the user
#[instrument(skip(db))]
pub async fn delete_user(db: &DatabaseConnection, ctx: &AuthContext, user_id: i64) -> Result<()> {
    ctx.require_role(super::access::ADMINS)?;
    if user_id == ctx.user_id {
        return Err(Error::forbidden("you cannot delete your own account"));
    }
    let user = get_user(db, user_id).await?;
    check_target(db, ctx, &user).await?;

    User::delete_by_id(user.id).exec(db).await.map_err(|e| {
        if is_foreign_key_violation(&e) {
            Error::Conflict {
                message: format!(
                    "User {} is still referenced by other records; deactivate the account instead",
                    user.id
                ),
            }
        } else {
            e.into()
        }
    })?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::ADMIN_DELETE_USER,
        json!({ "user_id": user.id, "email": user.email }),
    )
    .await;
    info!("User {} deleted account {}", ctx.user_id, user.id);
    Ok(())
}

/// Self-service profile edit.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Updates the caller's own name and email.
pub async fn update_profile(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    update: ProfileUpdate,
) -> Result<user::Model> {
    let existing = get_user(db, ctx.user_id).await?;
    let mut active: user::ActiveModel = existing.into();

    if let Some(name) = update.name.as_deref() {
        active.name = Set(clean_name(name)?);
    }
    if let Some(email) = update.email.as_deref() {
        let email = normalize_email(email);
        validate_email(&email)?;
        if find_by_email(db, &email)
            .await?
            .is_some_and(|other| other.id != ctx.user_id)
        {
            return Err(Error::DuplicateEmail);
        }
        active.email = Set(email);
    }

    let user = active.update(db).await.map_err(unique_email)?;
    audit::record(db, Some(ctx.user_id), actions::PROFILE_UPDATE, json!({})).await;
    Ok(user)
}

/// Number of users, optionally restricted to one role.
pub async fn count_users(db: &DatabaseConnection, role: Option<Role>) -> Result<u64> {
    let mut query = User::find().join(JoinType::InnerJoin, user::Relation::Role.def());
    if let Some(role) = role {
        query = query.filter(role::Column::Name.eq(role.canonical_name()));
    }
    query.count(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::ErrorKind;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_admin_creates_and_lists_users() -> Result<()> {
        let db = setup_test_db().await?;
        let (admin, ctx) = create_test_actor(&db, Role::Admin).await?;

        let teacher = create_user(
            &db,
            &test_auth_settings(),
            &ctx,
            NewUser {
                name: "Alan".to_string(),
                email: "Alan@Example.com".to_string(),
                password: "Turing123".to_string(),
                role: Role::Teacher,
            },
        )
        .await?;
        assert_eq!(teacher.email, "alan@example.com");

        let filter = UserFilter {
            role: Some(Role::Teacher),
            ..Default::default()
        };
        let page = list_users(&db, &ctx, &filter, 1, 20).await?;
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].role_name, "Teacher");

        let all = list_users(&db, &ctx, &UserFilter::default(), 1, 20).await?;
        assert_eq!(all.total, 2);
        assert!(all.items.iter().any(|u| u.id == admin.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_only_super_admin_grants_super_admin() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, admin) = create_test_actor(&db, Role::Admin).await?;
        let target = create_test_user(&db, "Target", "target@example.com", Role::Student).await?;

        let err = update_user(
            &db,
            &admin,
            target.id,
            UserUpdate {
                role: Some(Role::SuperAdmin),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let (_, root) = create_test_actor(&db, Role::SuperAdmin).await?;
        let updated = update_user(
            &db,
            &root,
            target.id,
            UserUpdate {
                role: Some(Role::SuperAdmin),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
        assert!(!updated.is_active);
        assert_eq!(updated.role_id, role_id_for(&db, Role::SuperAdmin).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_cannot_manage_super_admin() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, admin) = create_test_actor(&db, Role::Admin).await?;
        let root = create_test_user(&db, "Root", "root@example.com", Role::SuperAdmin).await?;

        let demote = UserUpdate {
            role: Some(Role::Student),
            ..Default::default()
        };
        let err = update_user(&db, &admin, root.id, demote).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let deactivate = UserUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        let err = update_user(&db, &admin, root.id, deactivate).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = delete_user(&db, &admin, root.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let unchanged = get_user(&db, root.id).await?;
        assert!(unchanged.is_active);
        assert_eq!(unchanged.role_id, role_id_for(&db, Role::SuperAdmin).await?);

        let (_, other_root) = create_test_actor(&db, Role::SuperAdmin).await?;
        let demote = UserUpdate {
            role: Some(Role::Admin),
            ..Default::default()
        };
        let updated = update_user(&db, &other_root, root.id, demote).await?;
        assert_eq!(updated.role_id, role_id_for(&db, Role::Admin).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_rules() -> Result<()> {
        let db = setup_test_db().await?;
        let (admin, ctx) = create_test_actor(&db, Role::Admin).await?;

        let err = delete_user(&db, &ctx, admin.id).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));

        let unused = create_test_user(&db, "Unused", "unused@example.com", Role::Student).await?;
        delete_user(&db, &ctx, unused.id).await?;
        assert!(matches!(get_user(&db, unused.id).await, Err(Error::NotFound { .. })));

        let teacher = create_test_user(&db, "Owner", "owner@example.com", Role::Teacher).await?;
        create_test_course(&db, teacher.id, "Owned", 0.0).await?;
        let err = delete_user(&db, &ctx, teacher.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(get_user(&db, teacher.id).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_non_admin_cannot_manage_users() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, student) = create_test_actor(&db, Role::Student).await?;
        let err = list_users(&db, &student, &UserFilter::default(), 1, 10).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        Ok(())
    }

    #[tokio::test]
    async fn test_profile_update_rejects_taken_email() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "Taken", "taken@example.com", Role::Student).await?;
        let (_, ctx) = create_test_actor(&db, Role::Student).await?;

        let err = update_profile(
            &db,
            &ctx,
            ProfileUpdate {
                email: Some("TAKEN@example.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateEmail));

        let user = update_profile(
            &db,
            &ctx,
            ProfileUpdate {
                name: Some("  Renamed ".to_string()),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(user.name, "Renamed");
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_admin_runs_once() -> Result<()> {
        let db = setup_test_db().await?;
        let seed = SeedAdmin {
            name: "Root".to_string(),
            email: "Root@Example.com".to_string(),
            password: "Sup3rSecret".to_string(),
        };
        let created = ensure_seed_admin(&db, &test_auth_settings(), &seed).await?.unwrap();
        assert_eq!(created.email, "root@example.com");
        assert_eq!(created.role_id, role_id_for(&db, Role::SuperAdmin).await?);
        assert!(ensure_seed_admin(&db, &test_auth_settings(), &seed).await?.is_none());
        assert_eq!(count_users(&db, None).await?, 1);
        Ok(())
    }
}
