//! Order Workflow Engine
//!
//! Validates and applies order status transitions and keeps the dependent
//! shipping, payment and history records in step. Each public operation runs
//! in one store transaction; customer emails and order events are collected
//! while it runs and released only after commit, so a failed send never
//! undoes a status change and a rolled-back change never notifies anyone.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::domain::aggregates::{
    FulfillmentRequest, OrderDetail, OrderHead, OrderStatus, PaymentData, PaymentRecord,
    PaymentStatus, ShippingRecord, StatusHistoryEntry,
};
use crate::domain::events::{EventPublisher, OrderEvent};
use crate::notify::{EmailMessage, MessageComposer, Notifier};
use crate::store::{OrderStore, OrderTx};
use crate::{Result, WorkflowError};

const NOTE_DELIVERY_SCHEDULED: &str = "Delivery scheduled";
const NOTE_PAYMENT_COMPLETED: &str = "Payment completed";

/// Outcome of a status transition.
#[derive(Clone, Debug, Serialize)]
pub struct StatusChange {
    pub order_id: i64,
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// `None` when a terminal status was re-applied and nothing was written.
    pub history: Option<StatusHistoryEntry>,
}

impl StatusChange {
    pub fn is_noop(&self) -> bool { self.history.is_none() }
}

#[derive(Clone, Debug, Serialize)]
pub struct PaymentOutcome {
    pub payment: PaymentRecord,
    pub status_change: Option<StatusChange>,
}

/// Side effects held back until the transaction commits.
#[derive(Default)]
struct Outbox {
    messages: Vec<EmailMessage>,
    events: Vec<OrderEvent>,
}

pub struct OrderWorkflow<S, N> {
    store: S,
    notifier: N,
    composer: MessageComposer,
    events: EventPublisher,
}

impl<S: OrderStore, N: Notifier> OrderWorkflow<S, N> {
    pub fn new(store: S, notifier: N, composer: MessageComposer) -> Self {
        Self { store, notifier, composer, events: EventPublisher::disabled() }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    /// Applies a status given as text, rejecting anything outside [`OrderStatus`].
    pub async fn apply_status(
        &self,
        order_id: i64,
        new_status: &str,
        notes: Option<&str>,
    ) -> Result<StatusChange> {
        let status = OrderStatus::parse(new_status).map_err(|e| report(order_id, e))?;
        self.transition(order_id, status, notes).await
    }

    #[instrument(skip(self, new_status, notes), fields(attempted = %new_status))]
    pub async fn transition(
        &self,
        order_id: i64,
        new_status: OrderStatus,
        notes: Option<&str>,
    ) -> Result<StatusChange> {
        let mut tx = self.store.begin().await.map_err(|e| report(order_id, e.into()))?;
        let mut outbox = Outbox::default();
        match self.apply_in(&mut tx, &mut outbox, order_id, new_status, notes).await {
            Ok(change) => {
                tx.commit().await.map_err(|e| report(order_id, e.into()))?;
                self.release(outbox).await;
                Ok(change)
            }
            Err(e) => Err(abort(tx, order_id, e).await),
        }
    }

    #[instrument(skip(self, request))]
    pub async fn schedule_fulfillment(
        &self,
        order_id: i64,
        request: FulfillmentRequest,
    ) -> Result<StatusChange> {
        let fulfillment = request.validate().map_err(|e| report(order_id, e))?;

        let mut tx = self.store.begin().await.map_err(|e| report(order_id, e.into()))?;
        let mut outbox = Outbox::default();
        let result = async {
            let order = find_order(&mut tx, order_id).await?;
            let record = ShippingRecord::scheduled(order_id, &fulfillment, Utc::now());
            tx.upsert_shipping(&record).await?;
            let note = Some(NOTE_DELIVERY_SCHEDULED);
            let change = self
                .apply_in(&mut tx, &mut outbox, order_id, OrderStatus::Processing, note)
                .await?;
            if let Some(location) = record.pickup_location.as_deref() {
                outbox.messages.extend(self.composer.pickup_instructions(&order, location));
            }
            let pickup = fulfillment.is_pickup();
            outbox.events.push(OrderEvent::FulfillmentScheduled { order_id, pickup });
            Ok::<_, WorkflowError>(change)
        }
        .await;

        match result {
            Ok(change) => {
                tx.commit().await.map_err(|e| report(order_id, e.into()))?;
                info!(order_id, pickup = fulfillment.is_pickup(), "Fulfillment scheduled");
                self.release(outbox).await;
                Ok(change)
            }
            Err(e) => Err(abort(tx, order_id, e).await),
        }
    }

    /// Upserts the order's payment row. A completed payment also moves the
    /// order to `processing`, unless it is already shipped or in the return
    /// flow. On a cancelled or delivered order it fails and nothing is stored.
    #[instrument(skip(self, data))]
    pub async fn record_payment(&self, order_id: i64, data: PaymentData) -> Result<PaymentOutcome> {
        let payment = data.validate().map_err(|e| report(order_id, e))?;

        let mut tx = self.store.begin().await.map_err(|e| report(order_id, e.into()))?;
        let mut outbox = Outbox::default();
        let result = async {
            let order = find_order(&mut tx, order_id).await?;
            let now = Utc::now();
            let record = match tx.find_payment(order_id).await? {
                Some(existing) => {
                    tx.update_payment(existing.id, &payment, now).await?;
                    PaymentRecord {
                        method: payment.method.clone(),
                        status: payment.status,
                        transaction_id: payment.transaction_id.clone(),
                        ..existing
                    }
                }
                None => {
                    let amount = order.total_amount.unwrap_or(Decimal::ZERO);
                    tx.insert_payment(order_id, &payment, amount, now).await?
                }
            };

            // Terminal orders still go through apply_in so the terminal rule aborts the upsert.
            let completed = payment.status == PaymentStatus::Completed;
            let status_change = if completed && !order.status.is_past_dispatch() {
                let note = Some(NOTE_PAYMENT_COMPLETED);
                let change = self
                    .apply_in(&mut tx, &mut outbox, order_id, OrderStatus::Processing, note)
                    .await?;
                Some(change)
            } else {
                None
            };
            outbox.events.push(OrderEvent::PaymentRecorded {
                order_id,
                method: payment.method.clone(),
                status: payment.status,
            });
            Ok::<_, WorkflowError>(PaymentOutcome { payment: record, status_change })
        }
        .await;

        match result {
            Ok(outcome) => {
                tx.commit().await.map_err(|e| report(order_id, e.into()))?;
                let payment = &outcome.payment;
                info!(
                    order_id,
                    method = %payment.method,
                    status = %payment.status,
                    "Payment recorded"
                );
                self.release(outbox).await;
                Ok(outcome)
            }
            Err(e) => Err(abort(tx, order_id, e).await),
        }
    }

    /// Cancels the order, storing the reason on the order and in its history.
    #[instrument(skip(self, reason))]
    pub async fn cancel_order(&self, order_id: i64, reason: &str) -> Result<StatusChange> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(report(order_id, WorkflowError::MissingField("reason")));
        }

        let mut tx = self.store.begin().await.map_err(|e| report(order_id, e.into()))?;
        let mut outbox = Outbox::default();
        let result = async {
            let change = self
                .apply_in(&mut tx, &mut outbox, order_id, OrderStatus::Cancelled, Some(reason))
                .await?;
            if !change.is_noop() {
                tx.set_cancellation_reason(order_id, reason).await?;
                outbox.events.push(OrderEvent::Cancelled { order_id, reason: reason.to_string() });
            }
            Ok::<_, WorkflowError>(change)
        }
        .await;

        match result {
            Ok(change) => {
                tx.commit().await.map_err(|e| report(order_id, e.into()))?;
                self.release(outbox).await;
                Ok(change)
            }
            Err(e) => Err(abort(tx, order_id, e).await),
        }
    }

    /// Order detail aggregation; `None` when the id does not resolve.
    pub async fn order_detail(&self, order_id: i64) -> Result<Option<OrderDetail>> {
        self.store.order_detail(order_id).await.map_err(|e| report(order_id, e.into()))
    }

    /// The status transition proper, inside a caller-owned transaction.
    async fn apply_in(
        &self,
        tx: &mut S::Tx,
        outbox: &mut Outbox,
        order_id: i64,
        new_status: OrderStatus,
        notes: Option<&str>,
    ) -> Result<StatusChange> {
        let order = find_order(tx, order_id).await?;
        let current = order.status;

        if !current.can_transition_to(new_status) {
            let attempted = new_status;
            return Err(WorkflowError::TerminalStateViolation { order_id, current, attempted });
        }
        if current.is_terminal() {
            info!(order_id, status = %current, "Terminal status re-applied; nothing to do");
            return Ok(StatusChange { order_id, from: current, to: new_status, history: None });
        }

        let now = Utc::now();
        tx.set_status(order_id, new_status, now).await?;
        let entry = tx.append_history(order_id, new_status, notes, now).await?;
        if let Some(mirror) = new_status.shipping_mirror() {
            tx.mirror_shipping_status(order_id, mirror, now).await?;
        }
        if new_status == OrderStatus::Refunded {
            let amount = order.total_amount.unwrap_or(Decimal::ZERO);
            tx.insert_refund_payment(order_id, amount, now).await?;
        }

        let shipping = match new_status {
            OrderStatus::Shipped => tx.find_shipping(order_id).await?,
            _ => None,
        };
        outbox.messages.extend(self.composer.status_update(&order, new_status, shipping.as_ref()));
        outbox.events.push(OrderEvent::StatusChanged {
            order_id,
            from: current,
            to: new_status,
            notes: notes.map(str::to_string),
        });

        info!(order_id, from = %current, to = %new_status, "Order status updated");
        Ok(StatusChange { order_id, from: current, to: new_status, history: Some(entry) })
    }

    async fn release(&self, outbox: Outbox) {
        for message in &outbox.messages {
            message.dispatch(&self.notifier).await;
        }
        self.events.publish(&outbox.events).await;
    }
}

/// Logs a failed operation with its context and hands the error back.
fn report(order_id: i64, e: WorkflowError) -> WorkflowError {
    match &e {
        WorkflowError::TerminalStateViolation { current, attempted, .. } => {
            warn!(order_id, %current, %attempted, error = %e, "Order workflow rule violated")
        }
        _ if e.is_rule_violation() => {
            warn!(order_id, error = %e, "Order workflow request rejected")
        }
        _ => error!(order_id, error = %e, "Order workflow persistence failure"),
    }
    e
}

async fn find_order<T: OrderTx>(tx: &mut T, order_id: i64) -> Result<OrderHead> {
    tx.find_order(order_id).await?.ok_or(WorkflowError::OrderNotFound(order_id))
}

async fn abort<T: OrderTx>(tx: T, order_id: i64, e: WorkflowError) -> WorkflowError {
    if let Err(rollback) = tx.rollback().await {
        error!(order_id, error = %rollback, "Rollback failed");
    }
    report(order_id, e)
}
