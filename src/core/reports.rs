//! Administrative reports over an optional date range.

use super::access::{self, AuthContext};
use super::round2;
use crate::entities::{
    Enrollment, EnrollmentStatus, Payment, PaymentStatus, User, course, enrollment, payment, user,
};
use crate::errors::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::instrument;

/// Inclusive range of calendar days (UTC). Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// Builds a range, refusing one that ends before it starts.
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self> {
        if matches!((from, to), (Some(from), Some(to)) if to < from) {
            return Err(Error::validation("Report range ends before it starts"));
        }
        Ok(Self { from, to })
    }

    fn start(&self) -> Option<DateTime<Utc>> {
        self.from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
    }

    /// Exclusive upper bound: midnight after `to`.
    fn end(&self) -> Option<DateTime<Utc>> {
        self.to
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
    }

    fn condition<C: ColumnTrait>(&self, column: C) -> Condition {
        Condition::all()
            .add_option(self.start().map(|s| column.gte(s)))
            .add_option(self.end().map(|e| column.lt(e)))
    }
}

/// Count for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// Revenue for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub amount: f64,
    pub payments: u64,
}

/// Active enrollment count for one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEnrollments {
    pub course_id: i64,
    pub title: String,
    pub enrollments: u64,
}

/// The admin reports bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reports {
    pub registrations: Vec<DailyCount>,
    pub enrollments: Vec<CourseEnrollments>,
    pub revenue: Vec<DailyRevenue>,
    pub total_revenue: f64,
}

/// New user accounts per day.
pub async fn registrations_per_day(
    db: &DatabaseConnection,
    range: &DateRange,
) -> Result<Vec<DailyCount>> {
    let created: Vec<DateTime<Utc>> = User::find()
        .select_only()
        .column(user::Column::CreatedAt)
        .filter(range.condition(user::Column::CreatedAt))
        .into_tuple()
        .all(db)
        .await?;

    let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for at in created {
        *days.entry(at.date_naive()).or_default() += 1;
    }
    Ok(days
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect())
}

/// Active enrollments per course, busiest first. Enrollments made inside the range only.
pub async fn enrollments_per_course(
    db: &DatabaseConnection,
    range: &DateRange,
) -> Result<Vec<CourseEnrollments>> {
    let rows: Vec<(i64, String, i64)> = Enrollment::find()
        .select_only()
        .column(enrollment::Column::CourseId)
        .column(course::Column::Title)
        .column_as(Expr::col((Enrollment, enrollment::Column::Id)).count(), "enrollments")
        .join(JoinType::InnerJoin, enrollment::Relation::Course.def())
        .filter(enrollment::Column::Status.eq(EnrollmentStatus::Active))
        .filter(range.condition(enrollment::Column::EnrolledAt))
        .group_by(enrollment::Column::CourseId)
        .group_by(course::Column::Title)
        .order_by_desc(Expr::col((Enrollment, enrollment::Column::Id)).count())
        .order_by_asc(course::Column::Title)
        .into_tuple()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(course_id, title, count)| CourseEnrollments {
            course_id,
            title,
            enrollments: u64::try_from(count).unwrap_or(0),
        })
        .collect())
}

/// Completed payment revenue per day.
pub async fn revenue_per_day(
    db: &DatabaseConnection,
    range: &DateRange,
) -> Result<Vec<DailyRevenue>> {
    let rows: Vec<(DateTime<Utc>, f64)> = Payment::find()
        .select_only()
        .column(payment::Column::CreatedAt)
        .column(payment::Column::Amount)
        .filter(payment::Column::Status.eq(PaymentStatus::Completed))
        .filter(range.condition(payment::Column::CreatedAt))
        .into_tuple()
        .all(db)
        .await?;

    let mut days: BTreeMap<NaiveDate, (f64, u64)> = BTreeMap::new();
    for (at, amount) in rows {
        let day = days.entry(at.date_naive()).or_default();
        day.0 += amount;
        day.1 += 1;
    }
    Ok(days
        .into_iter()
        .map(|(date, (amount, payments))| DailyRevenue {
            date,
            amount: round2(amount),
            payments,
        })
        .collect())
}

/// All admin reports for a range.
#[instrument(skip(db))]
pub async fn build_reports(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    range: &DateRange,
) -> Result<Reports> {
    ctx.require_role(access::ADMINS)?;
    let revenue = revenue_per_day(db, range).await?;
    let total_revenue = round2(revenue.iter().map(|d| d.amount).sum());
    Ok(Reports {
        registrations: registrations_per_day(db, range).await?,
        enrollments: enrollments_per_course(db, range).await?,
        revenue,
        total_revenue,
    })
}
