//! Payment business logic.
//!
//! Charging goes through a [`PaymentProcessor`]. Every processor answer is persisted as a
//! payment row; a successful charge and the resulting enrollment are written in one
//! transaction, so a student is never charged-and-recorded without being enrolled.

use super::Page;
use super::access::{self, AuthContext, Role};
use super::audit::{self, actions};
use super::auth::generate_token;
use super::courses::{self, get_course};
use crate::entities::{Payment, PaymentStatus, course, enrollment, payment, user};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
    TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};

/// A charge request sent to the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub student_id: i64,
    pub course_id: i64,
    pub amount: f64,
    pub method: String,
}

/// The processor's answer to a charge or refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorOutcome {
    /// Whether the money moved
    pub success: bool,
    /// Processor reference, also present on declines
    pub transaction_id: String,
    /// Human-readable detail
    pub message: String,
}

/// External payment gateway.
///
/// Returning `Err` means the processor could not be reached; a decline is an `Ok` outcome
/// with `success: false`.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Attempts to charge the student.
    async fn charge(&self, request: &ChargeRequest) -> Result<ProcessorOutcome>;

    /// Attempts to refund a previous charge.
    async fn refund(&self, payment: &payment::Model, reason: &str) -> Result<ProcessorOutcome>;
}

/// Deterministic processor used in development and tests.
///
/// Approves everything unless built with `decline_all`.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentProcessor {
    decline_all: bool,
}

impl MockPaymentProcessor {
    /// Creates a processor that declines every charge when `decline_all` is set.
    #[must_use]
    pub const fn new(decline_all: bool) -> Self {
        Self { decline_all }
    }

    fn reference() -> Result<String> {
        Ok(format!("txn_{}", &generate_token()?[..24]))
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn charge(&self, request: &ChargeRequest) -> Result<ProcessorOutcome> {
        let transaction_id = Self::reference()?;
        if self.decline_all {
            return Ok(ProcessorOutcome {
                success: false,
                transaction_id,
                message: "Payment declined".to_string(),
            });
        }
        Ok(ProcessorOutcome {
            success: true,
            transaction_id,
            message: format!("Charged {:.2} via {}", request.amount, request.method),
        })
    }

    async fn refund(&self, payment: &payment::Model, _reason: &str) -> Result<ProcessorOutcome> {
        Ok(ProcessorOutcome {
            success: true,
            transaction_id: payment.transaction_id.clone(),
            message: "Refund issued".to_string(),
        })
    }
}

/// Result of [`process_payment`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub payment: payment::Model,
    /// Present only when the charge succeeded
    pub enrollment: Option<enrollment::Model>,
    pub message: String,
}

fn clean_method(method: &str) -> Result<String> {
    let method = method.trim().to_lowercase();
    if method.is_empty() || method.len() > 50 {
        return Err(Error::validation("A payment method is required"));
    }
    Ok(method)
}

/// Charges the calling student for a course and enrolls them on success.
///
/// # Errors
/// * [`Error::NotFound`] - no such course
/// * [`Error::Validation`] - course not active, or missing payment method
/// * [`Error::AlreadyEnrolled`] - student already holds an active enrollment
/// * [`Error::Upstream`] - the processor could not be reached
#[instrument(skip(db, processor))]
pub async fn process_payment(
    db: &DatabaseConnection,
    processor: &dyn PaymentProcessor,
    ctx: &AuthContext,
    course_id: i64,
    method: &str,
) -> Result<PaymentReceipt> {
    ctx.require_role(access::STUDENTS)?;
    let method = clean_method(method)?;
    let course = get_course(db, course_id).await?;
    courses::require_open(&course)?;
    if courses::is_actively_enrolled(db, ctx.user_id, course_id).await? {
        return Err(Error::AlreadyEnrolled { course_id });
    }

    let request = ChargeRequest {
        student_id: ctx.user_id,
        course_id,
        amount: course.price,
        method: method.clone(),
    };
    let outcome = processor.charge(&request).await.map_err(|e| {
        warn!("Payment processor failed for student {}: {e}", ctx.user_id);
        Error::Upstream {
            message: "payment processor unavailable".to_string(),
        }
    })?;

    let status = if outcome.success {
        PaymentStatus::Completed
    } else {
        PaymentStatus::Failed
    };

    let txn = db.begin().await?;
    let payment = payment::ActiveModel {
        student_id: Set(ctx.user_id),
        course_id: Set(course_id),
        amount: Set(course.price),
        method: Set(method),
        status: Set(status),
        transaction_id: Set(outcome.transaction_id.clone()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    let enrollment = if outcome.success {
        Some(courses::activate_enrollment(&txn, ctx.user_id, course_id).await?)
    } else {
        None
    };
    txn.commit().await?;

    audit::record(
        db,
        Some(ctx.user_id),
        actions::PAYMENT_PROCESSED,
        json!({
            "payment_id": payment.id,
            "course_id": course_id,
            "amount": payment.amount,
            "status": status.as_str(),
            "transaction_id": payment.transaction_id,
        }),
    )
    .await;
    info!(
        "Payment {} for course {course_id} by student {}: {}",
        payment.id,
        ctx.user_id,
        status.as_str()
    );

    Ok(PaymentReceipt {
        payment,
        enrollment,
        message: outcome.message,
    })
}

/// Retrieves a payment by id.
pub async fn get_payment(db: &DatabaseConnection, payment_id: i64) -> Result<payment::Model> {
    Payment::find_by_id(payment_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Payment",
            id: payment_id,
        })
}

/// Refunds a completed payment.
///
/// # Errors
/// * [`Error::PaymentNotCompleted`] - payment is pending, failed or already refunded
/// * [`Error::Upstream`] - the processor could not be reached or refused the refund
#[instrument(skip(db, processor))]
pub async fn refund_payment(
    db: &DatabaseConnection,
    processor: &dyn PaymentProcessor,
    ctx: &AuthContext,
    payment_id: i64,
    reason: &str,
) -> Result<payment::Model> {
    ctx.require_role(access::FINANCE)?;
    let existing = get_payment(db, payment_id).await?;
    if existing.status != PaymentStatus::Completed {
        return Err(Error::PaymentNotCompleted {
            payment_id,
            status: existing.status.as_str().to_string(),
        });
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(Error::validation("A refund reason is required"));
    }

    let outcome = processor
        .refund(&existing, reason)
        .await
        .map_err(|e| Error::Upstream {
            message: format!("refund failed: {e}"),
        })?;
    if !outcome.success {
        return Err(Error::Upstream {
            message: outcome.message,
        });
    }

    // Only a still-completed row may flip, so two concurrent refunds cannot both succeed.
    let updated = Payment::update_many()
        .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Refunded))
        .col_expr(payment::Column::RefundedAt, Expr::value(Utc::now()))
        .col_expr(payment::Column::RefundReason, Expr::value(reason.to_string()))
        .filter(payment::Column::Id.eq(payment_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Completed))
        .exec(db)
        .await?;
    if updated.rows_affected != 1 {
        return Err(Error::PaymentNotCompleted {
            payment_id,
            status: PaymentStatus::Refunded.as_str().to_string(),
        });
    }

    audit::record(
        db,
        Some(ctx.user_id),
        actions::PAYMENT_REFUND,
        json!({ "payment_id": payment_id, "amount": existing.amount, "reason": reason }),
    )
    .await;
    info!("Payment {payment_id} refunded by {}", ctx.user_id);
    get_payment(db, payment_id).await
}

/// Payment joined with student name and course title.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub course_id: i64,
    pub course_title: String,
    pub amount: f64,
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub created_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
}

fn views() -> sea_orm::Select<Payment> {
    Payment::find()
        .select_only()
        .column(payment::Column::Id)
        .column(payment::Column::StudentId)
        .column_as(user::Column::Name, "student_name")
        .column(payment::Column::CourseId)
        .column_as(course::Column::Title, "course_title")
        .column(payment::Column::Amount)
        .column(payment::Column::Method)
        .column(payment::Column::Status)
        .column(payment::Column::TransactionId)
        .column(payment::Column::CreatedAt)
        .column(payment::Column::RefundedAt)
        .column(payment::Column::RefundReason)
        .join(JoinType::InnerJoin, payment::Relation::Student.def())
        .join(JoinType::InnerJoin, payment::Relation::Course.def())
        .order_by_desc(payment::Column::CreatedAt)
        .order_by_desc(payment::Column::Id)
}

/// One payment. Students may only see their own.
pub async fn view_payment(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    payment_id: i64,
) -> Result<PaymentView> {
    let view = views()
        .filter(payment::Column::Id.eq(payment_id))
        .into_model::<PaymentView>()
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "Payment",
            id: payment_id,
        })?;

    let staff = ctx.require_role(access::FINANCE).is_ok();
    if !staff && view.student_id != ctx.user_id {
        return Err(Error::forbidden("not your payment"));
    }
    Ok(view)
}

/// Payment history of the calling student, newest first.
pub async fn payment_history(db: &DatabaseConnection, ctx: &AuthContext) -> Result<Vec<PaymentView>> {
    ctx.require_role(&[Role::Student])?;
    views()
        .filter(payment::Column::StudentId.eq(ctx.user_id))
        .into_model::<PaymentView>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// All payments, optionally by status. Finance staff only.
pub async fn list_payments(
    db: &DatabaseConnection,
    ctx: &AuthContext,
    status: Option<PaymentStatus>,
    page: u64,
    page_size: u64,
) -> Result<Page<PaymentView>> {
    ctx.require_role(access::FINANCE)?;
    let page_size = page_size.clamp(1, 100);
    let page = page.max(1);
    let paginator = views()
        .filter(Condition::all().add_option(status.map(|s| payment::Column::Status.eq(s))))
        .into_model::<PaymentView>()
        .paginate(db, page_size);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;
    Ok(Page::new(items, total, page, page_size))
}

/// The `limit` most recent payments of any status.
pub async fn recent_payments(db: &DatabaseConnection, limit: u64) -> Result<Vec<PaymentView>> {
    views()
        .limit(limit)
        .into_model::<PaymentView>()
        .all(db)
        .await
        .map_err(Into::into)
}
