//! Unified error types and result handling.
//!
//! Every domain failure maps to exactly one [`ErrorKind`], so callers (and tests) can branch
//! on the kind instead of matching message text. The transport layer turns the kind into a
//! status code or a redirect.

use serde::Serialize;
use thiserror::Error;

/// Coarse failure category surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No session identity, bad credentials, or a deactivated account.
    Unauthenticated,
    /// The session's role or ownership does not permit the action.
    Forbidden,
    /// The target entity does not exist.
    NotFound,
    /// Input failed validation (weak password, duplicate email, missing fields, ...).
    ValidationFailed,
    /// The action collides with existing state (already enrolled, already submitted, ...).
    Conflict,
    /// A password reset token is unknown, expired, or already used.
    InvalidOrExpiredToken,
    /// The payment processor or the storage layer is unavailable.
    UpstreamFailure,
    /// Anything else; never shown to users in detail.
    Internal,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{message}")]
    Validation { message: String },

    #[error("Email already registered")]
    DuplicateEmail,

    #[error(
        "Password must be 8 to 72 characters and include an uppercase letter, a lowercase letter and a digit"
    )]
    WeakPassword,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    AccountInactive,

    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,

    #[error("Already enrolled in course {course_id}")]
    AlreadyEnrolled { course_id: i64 },

    #[error("Assignment {assignment_id} has already been submitted")]
    AlreadySubmitted { assignment_id: i64 },

    #[error("Submissions for assignment {assignment_id} are closed")]
    SubmissionClosed { assignment_id: i64 },

    #[error("Only completed payments can be refunded (payment {payment_id} is {status})")]
    PaymentNotCompleted { payment_id: i64, status: String },

    #[error("{points} points exceeds the assignment maximum of {max_points}")]
    PointsExceedMaximum { points: f64, max_points: f64 },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Upstream failure: {message}")]
    Upstream { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Forbidden`] with the given reason.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated | Self::InvalidCredentials | Self::AccountInactive => {
                ErrorKind::Unauthenticated
            }
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. }
            | Self::DuplicateEmail
            | Self::WeakPassword
            | Self::SubmissionClosed { .. }
            | Self::PointsExceedMaximum { .. } => ErrorKind::ValidationFailed,
            Self::AlreadyEnrolled { .. }
            | Self::AlreadySubmitted { .. }
            | Self::PaymentNotCompleted { .. }
            | Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvalidOrExpiredToken => ErrorKind::InvalidOrExpiredToken,
            Self::Upstream { .. } => ErrorKind::UpstreamFailure,
            Self::Config { .. }
            | Self::Session { .. }
            | Self::Internal { .. }
            | Self::Database(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether the message is safe to show to an end user.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal | ErrorKind::UpstreamFailure)
    }
}

/// Returns true when `err` is a unique-constraint violation reported by the store.
#[must_use]
pub fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}

/// Returns true when `err` is a foreign-key violation reported by the store.
#[must_use]
pub fn is_foreign_key_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::ForeignKeyConstraintViolation(_))
    )
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_failures_map_to_taxonomy() {
        assert_eq!(Error::DuplicateEmail.kind(), ErrorKind::ValidationFailed);
        assert_eq!(Error::WeakPassword.kind(), ErrorKind::ValidationFailed);
        assert_eq!(Error::AccountInactive.kind(), ErrorKind::Unauthenticated);
        assert_eq!(
            Error::AlreadyEnrolled { course_id: 1 }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            Error::AlreadySubmitted { assignment_id: 1 }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            Error::PointsExceedMaximum {
                points: 120.0,
                max_points: 100.0
            }
            .kind(),
            ErrorKind::ValidationFailed
        );
        assert_eq!(
            Error::InvalidOrExpiredToken.kind(),
            ErrorKind::InvalidOrExpiredToken
        );
    }

    #[test]
    fn test_internal_errors_are_not_user_facing() {
        let err = Error::Database(sea_orm::DbErr::Custom("disk full".to_string()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_user_facing());
        assert!(Error::validation("Title is required").is_user_facing());
    }
}
