//! Order screens: listing, detail and the workflow actions.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;

use super::{ApiError, ApiResult, FlashMessage};
use crate::db::orders::{list_orders, OrderListFilter, OrderSummary};
use crate::db::{PageParams, PaginatedResponse};
use crate::domain::aggregates::{FulfillmentRequest, OrderDetail, PaymentData};
use crate::notify::Notifier;
use crate::store::OrderStore;
use crate::workflow::StatusChange;
use crate::{OrderWorkflow, WorkflowError};

type Workflow<S, N> = Arc<OrderWorkflow<S, N>>;

pub fn workflow_routes<S: OrderStore, N: Notifier>(workflow: Workflow<S, N>) -> Router {
    Router::new()
        .route("/orders/:id", get(get_order::<S, N>))
        .route("/orders/:id/status", post(update_status::<S, N>))
        .route("/orders/:id/fulfillment", post(schedule_fulfillment::<S, N>))
        .route("/orders/:id/payment", post(record_payment::<S, N>))
        .route("/orders/:id/cancel", post(cancel_order::<S, N>))
        .route("/orders/:id/actions", post(submit_action::<S, N>))
        .with_state(workflow)
}

pub fn listing_routes(pool: PgPool) -> Router {
    Router::new().route("/orders", get(list)).with_state(pool)
}

async fn list(
    State(pool): State<PgPool>,
    Query(filter): Query<OrderListFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<PaginatedResponse<OrderSummary>>> {
    Ok(Json(list_orders(&pool, &filter, &page).await?))
}

async fn get_order<S: OrderStore, N: Notifier>(
    State(workflow): State<Workflow<S, N>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<OrderDetail>> {
    workflow
        .order_detail(id)
        .await?
        .map(Json)
        .ok_or_else(|| WorkflowError::OrderNotFound(id).into())
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
}

async fn update_status<S: OrderStore, N: Notifier>(
    State(workflow): State<Workflow<S, N>>,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<FlashMessage> {
    run(&workflow, id, OrderAction::UpdateStatus { status: req.status, notes: req.notes }).await
}

async fn schedule_fulfillment<S: OrderStore, N: Notifier>(
    State(workflow): State<Workflow<S, N>>,
    Path(id): Path<i64>,
    Json(req): Json<FulfillmentRequest>,
) -> ApiResult<FlashMessage> {
    run(&workflow, id, OrderAction::ScheduleDelivery(req)).await
}

async fn record_payment<S: OrderStore, N: Notifier>(
    State(workflow): State<Workflow<S, N>>,
    Path(id): Path<i64>,
    Json(req): Json<PaymentData>,
) -> ApiResult<FlashMessage> {
    run(&workflow, id, OrderAction::RecordPayment(req)).await
}

async fn cancel_order<S: OrderStore, N: Notifier>(
    State(workflow): State<Workflow<S, N>>,
    Path(id): Path<i64>,
    Json(req): Json<CancelRequest>,
) -> ApiResult<FlashMessage> {
    run(&workflow, id, OrderAction::CancelOrder { reason: req.reason }).await
}

async fn submit_action<S: OrderStore, N: Notifier>(
    State(workflow): State<Workflow<S, N>>,
    Path(id): Path<i64>,
    Form(form): Form<OrderActionForm>,
) -> ApiResult<FlashMessage> {
    let action = OrderAction::try_from(form)?;
    run(&workflow, id, action).await
}

/// Flat form posted by the order detail screen; `action` names the operation.
#[derive(Debug, Default, Deserialize)]
pub struct OrderActionForm {
    pub action: String,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub mode: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub method: Option<String>,
    pub payment_status: Option<String>,
    pub transaction_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug)]
pub enum OrderAction {
    UpdateStatus { status: String, notes: Option<String> },
    ScheduleDelivery(FulfillmentRequest),
    RecordPayment(PaymentData),
    CancelOrder { reason: String },
}

impl TryFrom<OrderActionForm> for OrderAction {
    type Error = ApiError;

    fn try_from(form: OrderActionForm) -> Result<Self, ApiError> {
        match form.action.as_str() {
            "update_status" => Ok(Self::UpdateStatus {
                status: form.status.ok_or(WorkflowError::MissingField("status"))?,
                notes: form.notes.filter(|n| !n.trim().is_empty()),
            }),
            "schedule_delivery" => {
                let request = match form.mode.as_deref() {
                    Some("pickup") => FulfillmentRequest::Pickup { location: form.location },
                    Some("delivery") => FulfillmentRequest::Delivery {
                        date: parse_date(form.date.as_deref())?,
                        carrier: form.carrier,
                        tracking_number: form.tracking_number,
                    },
                    Some(other) => {
                        return Err(ApiError::new(
                            StatusCode::UNPROCESSABLE_ENTITY,
                            format!("Unknown fulfillment mode {other:?}"),
                        ))
                    }
                    None => return Err(WorkflowError::MissingField("mode").into()),
                };
                Ok(Self::ScheduleDelivery(request))
            }
            "record_payment" => Ok(Self::RecordPayment(PaymentData {
                method: form.method,
                status: form.payment_status,
                transaction_id: form.transaction_id,
            })),
            "cancel_order" => Ok(Self::CancelOrder { reason: form.reason.unwrap_or_default() }),
            other => {
                Err(ApiError::new(StatusCode::BAD_REQUEST, format!("Unknown action {other:?}")))
            }
        }
    }
}

/// Empty means absent; anything else must be `YYYY-MM-DD`.
fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d").map(Some).map_err(|_| {
            ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("Invalid date {v:?}"))
        }),
    }
}

async fn run<S: OrderStore, N: Notifier>(
    workflow: &OrderWorkflow<S, N>,
    id: i64,
    action: OrderAction,
) -> ApiResult<FlashMessage> {
    let flash = match action {
        OrderAction::UpdateStatus { status, notes } => {
            let change = workflow.apply_status(id, &status, notes.as_deref()).await?;
            FlashMessage::success(status_message(&change)).with_data(&change)
        }
        OrderAction::ScheduleDelivery(request) => {
            let pickup = matches!(request, FulfillmentRequest::Pickup { .. });
            let change = workflow.schedule_fulfillment(id, request).await?;
            let what = if pickup { "Pickup" } else { "Delivery" };
            FlashMessage::success(format!("{what} scheduled for order #{id}")).with_data(&change)
        }
        OrderAction::RecordPayment(data) => {
            let outcome = workflow.record_payment(id, data).await?;
            FlashMessage::success(format!("Payment recorded for order #{id}")).with_data(&outcome)
        }
        OrderAction::CancelOrder { reason } => {
            let change = workflow.cancel_order(id, &reason).await?;
            let message = if change.is_noop() {
                format!("Order #{id} is already cancelled")
            } else {
                format!("Order #{id} cancelled")
            };
            FlashMessage::success(message).with_data(&change)
        }
    };
    Ok(flash)
}

fn status_message(change: &StatusChange) -> String {
    if change.is_noop() {
        format!("Order #{} is already {}", change.order_id, change.to)
    } else {
        format!("Order #{} status updated to {}", change.order_id, change.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn form(action: &str) -> OrderActionForm {
        OrderActionForm { action: action.to_string(), ..Default::default() }
    }

    #[test]
    fn test_delivery_form_becomes_request() {
        let action = OrderAction::try_from(OrderActionForm {
            mode: Some("delivery".into()),
            date: Some("2024-06-03".into()),
            carrier: Some("LBC".into()),
            ..form("schedule_delivery")
        })
        .unwrap();
        assert_matches!(
            action,
            OrderAction::ScheduleDelivery(FulfillmentRequest::Delivery {
                date: Some(_),
                carrier: Some(ref c),
                tracking_number: None,
            }) if c == "LBC"
        );
    }

    #[test]
    fn test_payment_form_uses_payment_status_field() {
        let action = OrderAction::try_from(OrderActionForm {
            method: Some("gcash".into()),
            payment_status: Some("completed".into()),
            ..form("record_payment")
        })
        .unwrap();
        assert_matches!(
            action,
            OrderAction::RecordPayment(PaymentData { status: Some(ref s), .. }) if s == "completed"
        );
    }

    #[test]
    fn test_rejects_unknown_action_and_bad_date() {
        let unknown = OrderAction::try_from(form("refund_everything")).unwrap_err();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        let bad_date = OrderActionForm {
            mode: Some("delivery".into()),
            date: Some("next week".into()),
            ..form("schedule_delivery")
        };
        let err = OrderAction::try_from(bad_date).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
