//! Payments: students pay for courses, finance staff review and refund.

use super::Paging;
use crate::core::payments;
use crate::entities::PaymentStatus;
use crate::errors::Result;
use crate::web::AppState;
use crate::web::gate::{self, Auth};
use crate::web::respond::{Payload, View};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;

pub fn routes(state: &AppState) -> Router<AppState> {
    let students = || middleware::from_fn_with_state(state.clone(), gate::students);
    let finance = || middleware::from_fn_with_state(state.clone(), gate::finance);
    let signed_in = middleware::from_fn_with_state(state.clone(), gate::signed_in);
    Router::new()
        .route(
            "/",
            post(pay)
                .route_layer(students())
                .merge(get(list).route_layer(finance())),
        )
        .route("/history", get(history).route_layer(students()))
        .route("/:id", get(show).route_layer(signed_in))
        .route("/:id/refund", post(refund).route_layer(finance()))
}

#[derive(Debug, Deserialize)]
struct PaymentForm {
    course_id: i64,
    #[serde(default = "default_method")]
    method: String,
}

fn default_method() -> String {
    "card".to_string()
}

async fn pay(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Payload(form): Payload<PaymentForm>,
) -> Result<Response> {
    let receipt =
        payments::process_payment(&state.db, state.processor.as_ref(), &ctx, form.course_id, &form.method)
            .await?;
    if receipt.enrollment.is_some() {
        view.created("Payment successful", "/student/courses", &receipt).await
    } else {
        view.declined(
            StatusCode::PAYMENT_REQUIRED,
            &receipt.message,
            "/payments/history",
            &receipt,
        )
        .await
    }
}

async fn history(State(state): State<AppState>, Auth(ctx): Auth, view: View) -> Result<Response> {
    let payments = payments::payment_history(&state.db, &ctx).await?;
    view.page("payments/history", &json!({ "payments": payments })).await
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<PaymentStatus>,
}

async fn list(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Query(query): Query<ListQuery>,
    Query(paging): Query<Paging>,
) -> Result<Response> {
    let page = payments::list_payments(&state.db, &ctx, query.status, paging.page(), paging.page_size()).await?;
    view.page("payments/index", &page).await
}

async fn show(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(payment_id): Path<i64>,
) -> Result<Response> {
    let payment = payments::view_payment(&state.db, &ctx, payment_id).await?;
    view.page("payments/show", &json!({ "payment": payment })).await
}

#[derive(Debug, Deserialize)]
struct RefundForm {
    reason: String,
}

async fn refund(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(payment_id): Path<i64>,
    Payload(form): Payload<RefundForm>,
) -> Result<Response> {
    let payment =
        payments::refund_payment(&state.db, state.processor.as_ref(), &ctx, payment_id, &form.reason).await?;
    view.done(
        "Payment refunded",
        &format!("/payments/{payment_id}"),
        &json!({ "payment": payment }),
    )
    .await
}
