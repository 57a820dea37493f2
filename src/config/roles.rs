//! Static permission sets and navigation menus per role.
//!
//! These tables are process-wide constants. The access layer reads them when it builds an
//! `AuthContext`; nothing mutates them at runtime.

use crate::core::access::Role;
use serde::Serialize;

/// One entry in a role's navigation menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    /// Text shown to the user
    pub label: &'static str,
    /// Target path
    pub url: &'static str,
    /// Page key used by templates to highlight the active entry
    pub page: &'static str,
    /// Icon name
    pub icon: &'static str,
}

const fn item(
    label: &'static str,
    url: &'static str,
    page: &'static str,
    icon: &'static str,
) -> MenuItem {
    MenuItem {
        label,
        url,
        page,
        icon,
    }
}

const SUPER_ADMIN_PERMISSIONS: &[&str] = &[
    "manage_users",
    "manage_roles",
    "manage_courses",
    "manage_subjects",
    "manage_teachers",
    "manage_students",
    "view_reports",
    "manage_payments",
    "view_audit_logs",
    "system_settings",
];

const ADMIN_PERMISSIONS: &[&str] = &[
    "manage_courses",
    "manage_subjects",
    "manage_teachers",
    "manage_students",
    "view_reports",
    "manage_payments",
    "view_audit_logs",
];

const TEACHER_PERMISSIONS: &[&str] = &[
    "manage_assignments",
    "grade_submissions",
    "take_attendance",
    "view_student_progress",
    "post_announcements",
];

const STUDENT_PERMISSIONS: &[&str] = &[
    "view_courses",
    "enroll_courses",
    "submit_assignments",
    "view_grades",
    "view_attendance",
    "make_payments",
];

const FINANCE_OFFICER_PERMISSIONS: &[&str] =
    &["manage_payments", "view_payment_reports", "process_refunds"];

const SUPER_ADMIN_MENU: &[MenuItem] = &[
    item("Dashboard", "/dashboard", "dashboard", "home"),
    item("User Management", "/admin/users", "users", "users"),
    item("Course Management", "/admin/courses", "courses", "book"),
    item("Reports", "/admin/reports", "reports", "chart"),
    item("System Stats", "/admin/stats", "stats", "activity"),
    item("Announcements", "/admin/announcements", "announcements", "megaphone"),
    item("Audit Logs", "/admin/audit-logs", "audit-logs", "shield"),
    item("Settings", "/admin/settings", "settings", "settings"),
    item("System Settings", "/admin/system", "system", "server"),
];

const ADMIN_MENU: &[MenuItem] = &[
    item("Dashboard", "/dashboard", "dashboard", "home"),
    item("Course Management", "/admin/courses", "courses", "book"),
    item("Reports", "/admin/reports", "reports", "chart"),
    item("Audit Logs", "/admin/audit-logs", "audit-logs", "shield"),
];

const TEACHER_MENU: &[MenuItem] = &[
    item("Dashboard", "/teacher", "dashboard", "home"),
    item("My Courses", "/teacher/courses", "courses", "book"),
    item("Assignments", "/teacher/assignments", "assignments", "clipboard"),
    item("Submissions", "/teacher/submissions", "submissions", "inbox"),
    item("Gradebook", "/teacher/grades", "grades", "award"),
    item("Announcements", "/teacher/announcements", "announcements", "megaphone"),
    item("Reports", "/teacher/reports", "reports", "chart"),
];

const STUDENT_MENU: &[MenuItem] = &[
    item("Dashboard", "/dashboard", "dashboard", "home"),
    item("Enrolled Courses", "/student/courses", "courses", "book"),
    item("Enroll", "/student/enroll", "enroll", "plus"),
    item("Assignments", "/student/assignments", "assignments", "clipboard"),
    item("My Submissions", "/student/submissions", "submissions", "upload"),
    item("My Grades", "/student/grades", "grades", "award"),
    item("Recommendations", "/student/recommendations", "recommendations", "star"),
    item("Notifications", "/student/notifications", "notifications", "bell"),
    item("Profile", "/settings/profile", "profile", "user"),
];

const FINANCE_OFFICER_MENU: &[MenuItem] = &[
    item("Dashboard", "/dashboard/finance", "dashboard", "home"),
    item("Payments", "/finance/payments", "payments", "credit-card"),
    item("Invoices", "/finance/invoices", "invoices", "file-text"),
    item("Financial Reports", "/finance/reports", "reports", "chart"),
];

/// Permission names granted to `role`.
#[must_use]
pub const fn permissions(role: Role) -> &'static [&'static str] {
    match role {
        Role::SuperAdmin => SUPER_ADMIN_PERMISSIONS,
        Role::Admin => ADMIN_PERMISSIONS,
        Role::Teacher => TEACHER_PERMISSIONS,
        Role::Student => STUDENT_PERMISSIONS,
        Role::FinanceOfficer => FINANCE_OFFICER_PERMISSIONS,
    }
}

/// Navigation menu shown to `role`.
#[must_use]
pub const fn menu(role: Role) -> &'static [MenuItem] {
    match role {
        Role::SuperAdmin => SUPER_ADMIN_MENU,
        Role::Admin => ADMIN_MENU,
        Role::Teacher => TEACHER_MENU,
        Role::Student => STUDENT_MENU,
        Role::FinanceOfficer => FINANCE_OFFICER_MENU,
    }
}
