//! Credential verifier.
//!
//! Registration, login, and the password reset flow. Passwords are hashed with bcrypt on
//! the blocking thread pool. Reset tokens are 32 bytes from the OS CSPRNG, hex encoded,
//! single use, and expire after `auth.reset_token_ttl_minutes`.
//!
//! Every outcome is audited. Failed logins are recorded without an actor and with the
//! reason in the metadata; the caller only ever sees [`Error::InvalidCredentials`] or
//! [`Error::AccountInactive`].

use super::access::{Role, SessionIdentity};
use super::audit::{self, actions};
use super::users;
use crate::config::settings::AuthSettings;
use crate::entities::{PasswordResetToken, Role as RoleEntity, User, password_reset_token, user};
use crate::errors::{Error, Result, is_unique_violation};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde_json::json;
use std::sync::OnceLock;
use tracing::{info, instrument, warn};

/// Shortest accepted password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// bcrypt ignores input past 72 bytes, so longer passwords are refused.
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Longest accepted email address.
pub const MAX_EMAIL_LENGTH: usize = 150;

/// Response to every reset request, whether or not the account exists.
pub const RESET_REQUEST_MESSAGE: &str =
    "If an account with this email exists, a reset link will be sent.";

/// Lowercases and trims an email address.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Structural email check on an already normalized address.
pub fn validate_email(email: &str) -> Result<()> {
    let invalid = || Error::validation("A valid email address is required");
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH || email.contains(char::is_whitespace)
    {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(())
}

/// Password policy: 8 to 72 bytes with at least one uppercase letter, one lowercase
/// letter and one digit.
pub fn check_password_policy(password: &str) -> Result<()> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LENGTH;
    let short_enough = password.len() <= MAX_PASSWORD_LENGTH;
    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && short_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(Error::WeakPassword)
    }
}

/// Hashes `password` with bcrypt at `cost` on the blocking pool.
pub async fn hash_password(password: &str, cost: u32) -> Result<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| Error::Internal {
            message: format!("password hashing task failed: {e}"),
        })?
        .map_err(|e| Error::Internal {
            message: format!("password hashing failed: {e}"),
        })
}

/// Checks `password` against a stored bcrypt hash.
///
/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| Error::Internal {
            message: format!("password verification task failed: {e}"),
        })?;
    Ok(verified.unwrap_or_else(|e| {
        warn!("Stored password hash could not be parsed: {e}");
        false
    }))
}

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// A hash no password matches, verified against when the email is unknown so that lookup
/// misses cost as much as wrong passwords.
async fn dummy_hash() -> Result<&'static str> {
    if let Some(hash) = DUMMY_HASH.get() {
        return Ok(hash.as_str());
    }
    let hash = hash_password(&generate_token()?, bcrypt::DEFAULT_COST).await?;
    Ok(DUMMY_HASH.get_or_init(|| hash).as_str())
}

/// 32 bytes of CSPRNG output as 64 lowercase hex characters.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|e| Error::Internal {
        message: format!("random source unavailable: {e}"),
    })?;
    Ok(hex::encode(bytes))
}

/// Self-service registration form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Registers a new Student account.
///
/// # Errors
/// * [`Error::Validation`] - empty name or malformed email
/// * [`Error::DuplicateEmail`] - email already registered (also when a concurrent
///   registration wins the race)
/// * [`Error::WeakPassword`] - password fails the policy
#[instrument(skip(db, settings, registration))]
pub async fn register(
    db: &DatabaseConnection,
    settings: &AuthSettings,
    registration: Registration,
) -> Result<user::Model> {
    let name = registration.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 120 {
        return Err(Error::validation("Name must be between 1 and 120 characters"));
    }
    let email = normalize_email(&registration.email);
    validate_email(&email)?;

    if users::find_by_email(db, &email).await?.is_some() {
        return Err(Error::DuplicateEmail);
    }
    check_password_policy(&registration.password)?;

    let password_hash = hash_password(&registration.password, settings.bcrypt_cost).await?;
    let role_id = users::role_id_for(db, Role::Student).await?;

    let user = user::ActiveModel {
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
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::DuplicateEmail
        } else {
            e.into()
        }
    })?;

    audit::record(
        db,
        Some(user.id),
        actions::REGISTER,
        json!({ "email": user.email, "role": Role::Student.canonical_name() }),
    )
    .await;
    info!("Registered user {} ({})", user.id, user.email);

    Ok(user)
}

/// A verified login.
#[derive(Debug, Clone)]
pub struct Authenticated {
    /// The account that logged in
    pub user: user::Model,
    /// What to store in the session
    pub identity: SessionIdentity,
}

async fn reject_login(
    db: &DatabaseConnection,
    email: &str,
    reason: &str,
    client_ip: Option<&str>,
    error: Error,
) -> Error {
    audit::record(
        db,
        None,
        actions::FAILED_LOGIN,
        json!({ "email": email, "reason": reason, "ip": client_ip }),
    )
    .await;
    warn!("Failed login for {email}: {reason}");
    error
}

/// Verifies an email and password pair.
///
/// The password is checked before the active flag, so only someone holding the correct
/// password learns that an account is deactivated.
///
/// # Errors
/// * [`Error::InvalidCredentials`] - unknown email or wrong password
/// * [`Error::AccountInactive`] - correct password for a deactivated account
#[instrument(skip(db, password))]
pub async fn authenticate(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
    client_ip: Option<&str>,
) -> Result<Authenticated> {
    let email = normalize_email(email);

    let Some(user) = users::find_by_email(db, &email).await? else {
        verify_password(password, dummy_hash().await?).await?;
        return Err(reject_login(db, &email, "user_not_found", client_ip, Error::InvalidCredentials).await);
    };

    if !verify_password(password, &user.password_hash).await? {
        return Err(reject_login(db, &email, "invalid_password", client_ip, Error::InvalidCredentials).await);
    }

    if !user.is_active {
        return Err(reject_login(db, &email, "account_inactive", client_ip, Error::AccountInactive).await);
    }

    let identity = session_identity(db, &user).await?;
    audit::record(
        db,
        Some(user.id),
        actions::LOGIN,
        json!({ "ip": client_ip, "role": identity.role_name }),
    )
    .await;
    info!("User {} logged in as {}", user.id, identity.role_name);
    Ok(Authenticated { user, identity })
}

/// What the session stores for `user`, with the role name looked up from its role row.
pub async fn session_identity(db: &DatabaseConnection, user: &user::Model) -> Result<SessionIdentity> {
    let role_name = RoleEntity::find_by_id(user.role_id)
        .one(db)
        .await?
        .map(|role| role.name)
        .ok_or_else(|| Error::Internal {
            message: format!("user {} references missing role {}", user.id, user.role_id),
        })?;
    Ok(SessionIdentity {
        user_id: user.id,
        display_name: user.name.clone(),
        role_id: user.role_id,
        role_name,
    })
}

/// Records the end of a session.
pub async fn logout(db: &DatabaseConnection, identity: &SessionIdentity) {
    audit::record(db, Some(identity.user_id), actions::LOGOUT, json!({})).await;
    info!("User {} logged out", identity.user_id);
}

/// Where a freshly issued reset token should be delivered.
#[derive(Debug, Clone)]
pub struct ResetDelivery {
    pub user_id: i64,
    pub email: String,
    pub token: String,
    /// Full reset URL built from the public host
    pub link: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a reset request. `message` is the same for every email; `delivery` is only
/// set when a token was actually issued and must never be shown to the requester.
#[derive(Debug, Clone)]
pub struct ResetRequest {
    pub message: &'static str,
    pub delivery: Option<ResetDelivery>,
}

/// Issues a password reset token for `email` if it belongs to an active account.
///
/// Any earlier unused token for the account is invalidated in the same transaction.
#[instrument(skip(db, settings))]
pub async fn issue_reset_token(
    db: &DatabaseConnection,
    settings: &AuthSettings,
    public_host: &str,
    email: &str,
) -> Result<ResetRequest> {
    let email = normalize_email(email);
    let user = match users::find_by_email(db, &email).await? {
        Some(user) if user.is_active => user,
        _ => {
            info!("Password reset requested for unknown or inactive email");
            return Ok(ResetRequest {
                message: RESET_REQUEST_MESSAGE,
                delivery: None,
            });
        }
    };

    let token = generate_token()?;
    let now = Utc::now();
    let expires_at = now + Duration::minutes(settings.reset_token_ttl_minutes);

    let txn = db.begin().await?;
    PasswordResetToken::update_many()
        .col_expr(password_reset_token::Column::Used, Expr::value(true))
        .filter(password_reset_token::Column::UserId.eq(user.id))
        .filter(password_reset_token::Column::Used.eq(false))
        .exec(&txn)
        .await?;
    password_reset_token::ActiveModel {
        user_id: Set(user.id),
        token: Set(token.clone()),
        expires_at: Set(expires_at),
        used: Set(false),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    audit::record(
        db,
        Some(user.id),
        actions::PASSWORD_RESET_REQUESTED,
        json!({ "expires_at": expires_at }),
    )
    .await;

    let link = format!(
        "{}/auth/reset-password/{token}",
        public_host.trim_end_matches('/')
    );
    Ok(ResetRequest {
        message: RESET_REQUEST_MESSAGE,
        delivery: Some(ResetDelivery {
            user_id: user.id,
            email: user.email,
            token,
            link,
            expires_at,
        }),
    })
}

/// Looks up a reset token that is still usable.
///
/// # Errors
/// [`Error::InvalidOrExpiredToken`] if the token is unknown, used, or expired.
pub async fn validate_reset_token(
    db: &DatabaseConnection,
    token: &str,
) -> Result<password_reset_token::Model> {
    let token = token.trim();
    if token.len() != 64 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidOrExpiredToken);
    }

    let record = PasswordResetToken::find()
        .filter(password_reset_token::Column::Token.eq(token))
        .one(db)
        .await?
        .ok_or(Error::InvalidOrExpiredToken)?;

    if record.used || record.expires_at <= Utc::now() {
        return Err(Error::InvalidOrExpiredToken);
    }
    Ok(record)
}

/// Sets a new password using a reset token and consumes the token.
///
/// The token is claimed with a conditional update inside the same transaction as the
/// password change, so two concurrent uses cannot both succeed.
///
/// # Errors
/// * [`Error::InvalidOrExpiredToken`] - token unknown, used, expired, or claimed concurrently
/// * [`Error::WeakPassword`] - new password fails the policy; the token stays usable
#[instrument(skip_all)]
pub async fn consume_reset_token(
    db: &DatabaseConnection,
    settings: &AuthSettings,
    token: &str,
    new_password: &str,
) -> Result<()> {
    let record = validate_reset_token(db, token).await?;
    check_password_policy(new_password)?;
    let password_hash = hash_password(new_password, settings.bcrypt_cost).await?;

    let txn = db.begin().await?;
    let claimed = PasswordResetToken::update_many()
        .col_expr(password_reset_token::Column::Used, Expr::value(true))
        .filter(password_reset_token::Column::Id.eq(record.id))
        .filter(password_reset_token::Column::Used.eq(false))
        .exec(&txn)
        .await?;
    if claimed.rows_affected != 1 {
        return Err(Error::InvalidOrExpiredToken);
    }
    User::update_many()
        .col_expr(user::Column::PasswordHash, Expr::value(password_hash))
        .filter(user::Column::Id.eq(record.user_id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    audit::record(
        db,
        Some(record.user_id),
        actions::PASSWORD_RESET_SUCCESS,
        json!({ "token_id": record.id }),
    )
    .await;
    info!("Password reset completed for user {}", record.user_id);
    Ok(())
}
