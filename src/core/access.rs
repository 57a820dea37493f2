//! Role-based access control.
//!
//! The session carries a [`SessionIdentity`] with the role *name* stored at login. Every
//! request that touches a protected operation resolves it into an [`AuthContext`] through
//! [`restrict_to`], which is the single gate: no session means
//! [`Error::Unauthenticated`], an unknown role or a role outside the allowed set means
//! [`Error::Forbidden`]. Ownership checks (a teacher grading only their own assignments,
//! a student reading only their own payments) are done by the managers on top of the
//! context.

use crate::config::roles::{self, MenuItem};
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Course and staff administration
    Admin,
    /// Everything an admin can do plus user and system management
    #[serde(rename = "Super Admin")]
    SuperAdmin,
    /// Owns courses and assignments, grades submissions
    Teacher,
    /// Enrolls, submits and pays
    Student,
    /// Sees and refunds payments
    #[serde(rename = "Finance Officer")]
    FinanceOfficer,
}

impl Role {
    /// Every role, in seeding order.
    pub const ALL: [Self; 5] = [
        Self::SuperAdmin,
        Self::Admin,
        Self::Teacher,
        Self::Student,
        Self::FinanceOfficer,
    ];

    /// Name stored in the roles table and shown to users.
    #[must_use]
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::SuperAdmin => "Super Admin",
            Self::Teacher => "Teacher",
            Self::Student => "Student",
            Self::FinanceOfficer => "Finance Officer",
        }
    }

    /// Resolves a stored role name.
    ///
    /// Matching ignores case and surrounding whitespace, and accepts the compact spelling
    /// of two-word roles ("SuperAdmin", "financeofficer"). Any other name is `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let compact: String = name
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match compact.as_str() {
            "admin" => Some(Self::Admin),
            "superadmin" => Some(Self::SuperAdmin),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            "financeofficer" => Some(Self::FinanceOfficer),
            _ => None,
        }
    }

    /// Admin and Super Admin bypass ownership checks.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Roles allowed through the admin gate.
pub const ADMINS: &[Role] = &[Role::Admin, Role::SuperAdmin];
/// Roles allowed through the teacher gate. Administrators pass too.
pub const TEACHERS: &[Role] = &[Role::Teacher, Role::Admin, Role::SuperAdmin];
/// Roles allowed to create and edit courses.
pub const COURSE_EDITORS: &[Role] = &[Role::Teacher, Role::Admin, Role::SuperAdmin];
/// Roles allowed through the student gate.
pub const STUDENTS: &[Role] = &[Role::Student];
/// Roles allowed to see and refund payments.
pub const FINANCE: &[Role] = &[Role::FinanceOfficer, Role::Admin, Role::SuperAdmin];
/// Roles allowed to post announcements.
pub const ANNOUNCERS: &[Role] = &[Role::Teacher, Role::Admin, Role::SuperAdmin];

/// What the session stores about the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Authenticated user
    pub user_id: i64,
    /// Name shown in the UI
    pub display_name: String,
    /// Role row id at login time
    pub role_id: i32,
    /// Role name at login time
    pub role_name: String,
}

/// Per-request view of the authenticated user. Built once by [`restrict_to`] and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Authenticated user
    pub user_id: i64,
    /// Name shown in the UI
    pub display_name: String,
    /// Resolved role
    pub role: Role,
}

impl AuthContext {
    /// Builds a context for `role`.
    #[must_use]
    pub const fn new(user_id: i64, display_name: String, role: Role) -> Self {
        Self {
            user_id,
            display_name,
            role,
        }
    }

    /// Resolves a session identity, rejecting unknown role names.
    pub fn from_identity(identity: &SessionIdentity) -> Result<Self> {
        let role = Role::from_name(&identity.role_name).ok_or_else(|| {
            Error::forbidden(format!("unknown role '{}'", identity.role_name))
        })?;
        Ok(Self::new(
            identity.user_id,
            identity.display_name.clone(),
            role,
        ))
    }

    /// Permission names granted by the role.
    #[must_use]
    pub const fn permissions(&self) -> &'static [&'static str] {
        roles::permissions(self.role)
    }

    /// Whether the role grants `permission`.
    #[must_use]
    pub fn can(&self, permission: &str) -> bool {
        self.permissions().contains(&permission)
    }

    /// Navigation menu for the role.
    #[must_use]
    pub const fn menu(&self) -> &'static [MenuItem] {
        roles::menu(self.role)
    }

    /// Shorthand for `self.role.is_admin()`.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Fails with [`Error::Forbidden`] unless the role is one of `allowed`.
    pub fn require_role(&self, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(Error::forbidden(format!(
                "role {} may not perform this action",
                self.role
            )))
        }
    }

    /// Fails with [`Error::Forbidden`] unless the caller owns the resource or is an admin.
    pub fn require_owner_or_admin(&self, owner_id: i64, what: &str) -> Result<()> {
        if self.is_admin() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(Error::forbidden(format!("not the owner of this {what}")))
        }
    }
}

/// The access gate.
///
/// Fails with [`Error::Unauthenticated`] when there is no identity and with
/// [`Error::Forbidden`] when the stored role is unknown or not in `allowed`.
pub fn restrict_to(identity: Option<&SessionIdentity>, allowed: &[Role]) -> Result<AuthContext> {
    let identity = identity.ok_or(Error::Unauthenticated)?;
    let context = AuthContext::from_identity(identity)?;
    context.require_role(allowed)?;
    Ok(context)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::ErrorKind;

    fn identity(role_name: &str) -> SessionIdentity {
        SessionIdentity {
            user_id: 7,
            display_name: "Ada".to_string(),
            role_id: 1,
            role_name: role_name.to_string(),
        }
    }

    #[test]
    fn test_role_names_resolve_case_insensitively() {
        assert_eq!(Role::from_name("Super Admin"), Some(Role::SuperAdmin));
        assert_eq!(Role::from_name("superadmin"), Some(Role::SuperAdmin));
        assert_eq!(Role::from_name("  TEACHER "), Some(Role::Teacher));
        assert_eq!(Role::from_name("Finance Officer"), Some(Role::FinanceOfficer));
        assert_eq!(Role::from_name("Janitor"), None);
        for role in Role::ALL {
            assert_eq!(Role::from_name(role.canonical_name()), Some(role));
        }
    }

    #[test]
    fn test_missing_identity_is_unauthenticated() {
        let err = restrict_to(None, ADMINS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn test_role_outside_allowed_set_is_forbidden() {
        let err = restrict_to(Some(&identity("Student")), ADMINS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = restrict_to(Some(&identity("Ghost")), STUDENTS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_allowed_role_gets_context_with_permissions() {
        let ctx = restrict_to(Some(&identity("super admin")), ADMINS).unwrap();
        assert_eq!(ctx.role, Role::SuperAdmin);
        assert_eq!(ctx.user_id, 7);
        assert!(ctx.can("manage_users"));
        assert!(!ctx.can("submit_assignments"));
        assert_eq!(ctx.menu().len(), 9);
    }

    #[test]
    fn test_ownership_check() {
        let teacher = AuthContext::new(3, "T".to_string(), Role::Teacher);
        assert!(teacher.require_owner_or_admin(3, "course").is_ok());
        assert!(matches!(
            teacher.require_owner_or_admin(4, "course"),
            Err(Error::Forbidden { .. })
        ));

        let admin = AuthContext::new(1, "A".to_string(), Role::Admin);
        assert!(admin.require_owner_or_admin(4, "course").is_ok());
    }
}
