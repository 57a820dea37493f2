//! Core business logic - framework-agnostic operations over a `DatabaseConnection`.
//!
//! Nothing in here knows about HTTP. Callers pass an [`access::AuthContext`] where an
//! operation depends on who is asking.

pub mod access;
pub mod announcements;
pub mod assignments;
pub mod audit;
pub mod auth;
pub mod courses;
pub mod dashboard;
pub mod payments;
pub mod reports;
pub mod submissions;
pub mod users;

#[cfg(test)]
mod scenario;

use serde::Serialize;

/// One page of a larger result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// Rows across all pages
    pub total: u64,
    /// 1-based page number
    pub page: u64,
    /// Maximum rows per page
    pub page_size: u64,
    /// Number of pages, at least 1
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Wraps `items` with pagination totals.
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, page: u64, page_size: u64) -> Self {
        let total_pages = total.div_ceil(page_size.max(1)).max(1);
        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// Rounds to two decimal places for display.
#[must_use]
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
