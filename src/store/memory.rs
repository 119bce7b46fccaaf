//! In-memory order store.
//!
//! A transaction works on a private copy of the data and swaps it in on
//! commit, so an uncommitted transaction leaves no trace. Transactions are
//! serialized: `begin` waits until the open transaction commits or is
//! dropped, so the copy it takes always includes every earlier commit.
//! The seeding helpers write straight to the committed data and must not run
//! while a transaction is open.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as TxLock, OwnedMutexGuard};

use super::{OrderStore, OrderTx, StoreError, StoreResult};
use crate::domain::aggregates::order::{unit_price, REFUND_METHOD};
use crate::domain::aggregates::{
    AccountStatus, Customer, DeliverySchedule, OrderDetail, OrderHead, OrderLine, OrderStatus,
    Payment, PaymentRecord, PaymentStatus, Product, ShippingRecord, ShippingStatus,
    StatusHistoryEntry, Variation,
};
use crate::domain::value_objects::SizeCode;

#[derive(Clone, Debug)]
pub struct MemoryOrder {
    pub id: i64,
    pub customer_id: i64,
    pub total_amount: Option<Decimal>,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub shipping_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MemoryOrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub quantity: i32,
}

#[derive(Clone, Debug)]
pub struct MemoryData {
    pub customers: BTreeMap<i64, Customer>,
    pub orders: BTreeMap<i64, MemoryOrder>,
    pub order_items: Vec<MemoryOrderItem>,
    pub history: Vec<StatusHistoryEntry>,
    pub shipping: BTreeMap<i64, ShippingRecord>,
    pub payments: Vec<PaymentRecord>,
    pub delivery_schedules: BTreeMap<i64, DeliverySchedule>,
    pub products: BTreeMap<i64, Product>,
    pub variations: BTreeMap<i64, Variation>,
    next_id: i64,
}

impl Default for MemoryData {
    fn default() -> Self {
        Self {
            customers: BTreeMap::new(),
            orders: BTreeMap::new(),
            order_items: Vec::new(),
            history: Vec::new(),
            shipping: BTreeMap::new(),
            payments: Vec::new(),
            delivery_schedules: BTreeMap::new(),
            products: BTreeMap::new(),
            variations: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl MemoryData {
    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn reserve(&mut self, id: i64) { self.next_id = self.next_id.max(id + 1); }

    pub fn history_for(&self, order_id: i64) -> Vec<&StatusHistoryEntry> {
        self.history.iter().filter(|h| h.order_id == order_id).collect()
    }

    pub fn payments_for(&self, order_id: i64) -> Vec<&PaymentRecord> {
        self.payments.iter().filter(|p| p.order_id == order_id).collect()
    }

    fn head(&self, order_id: i64) -> Option<OrderHead> {
        let order = self.orders.get(&order_id)?;
        let customer = self.customers.get(&order.customer_id);
        Some(OrderHead {
            id: order.id,
            customer_id: order.customer_id,
            customer_name: customer.map(|c| c.name.clone()).unwrap_or_default(),
            customer_email: customer.map(|c| c.email.clone()),
            customer_phone: customer.and_then(|c| c.phone.clone()),
            total_amount: order.total_amount,
            status: order.status,
            order_date: order.order_date,
            shipping_date: order.shipping_date,
            delivery_date: order.delivery_date,
            cancellation_reason: order.cancellation_reason.clone(),
        })
    }

    fn lines(&self, order_id: i64) -> Vec<OrderLine> {
        self.order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .filter_map(|item| {
                let product = self.products.get(&item.product_id)?;
                let variation = item.variation_id.and_then(|id| self.variations.get(&id));
                Some(OrderLine {
                    id: item.id,
                    product_id: product.id,
                    variation_id: item.variation_id,
                    product_name: product.name.clone(),
                    image: product.image.clone(),
                    size: variation.map(|v| v.size.to_string()),
                    quantity: item.quantity,
                    unit_price: unit_price(
                        product.base_price,
                        variation.map(|v| v.price_adjustment),
                    ),
                })
            })
            .collect()
    }
}

/// Write that can be made to fail once, to exercise rollback paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    SetStatus,
    AppendHistory,
    MirrorShipping,
    UpsertShipping,
    InsertPayment,
    InsertRefund,
    Commit,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryData>>,
    fail_point: Arc<Mutex<Option<FailPoint>>>,
    tx_lock: Arc<TxLock<()>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn data(&self) -> MutexGuard<'_, MemoryData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next transaction that reaches `point` fail with [`StoreError::Unavailable`].
    pub fn fail_on(&self, point: FailPoint) {
        *self.fail_point.lock().unwrap_or_else(PoisonError::into_inner) = Some(point);
    }

    /// Copy of the committed data.
    pub fn snapshot(&self) -> MemoryData { self.data().clone() }

    pub fn add_customer(&self, name: &str, email: &str) -> i64 {
        let mut data = self.data();
        let id = data.next_id();
        data.customers.insert(id, Customer {
            id, name: name.to_string(), email: email.to_string(), phone: None,
            status: AccountStatus::Active, created_at: Utc::now(),
        });
        id
    }

    /// Inserts an order under a caller-chosen id.
    pub fn seed_order(
        &self,
        order_id: i64,
        customer_id: i64,
        total_amount: Option<Decimal>,
        status: OrderStatus,
    ) {
        let mut data = self.data();
        data.reserve(order_id);
        data.orders.insert(order_id, MemoryOrder {
            id: order_id, customer_id, total_amount, status, order_date: Utc::now(),
            shipping_date: None, delivery_date: None, cancellation_reason: None,
        });
    }

    pub fn add_product(&self, name: &str, base_price: Decimal) -> i64 {
        let mut data = self.data();
        let id = data.next_id();
        data.products.insert(id, Product {
            id, name: name.to_string(), description: None, base_price, category: None, image: None,
            created_at: Utc::now(),
        });
        id
    }

    pub fn add_variation(
        &self,
        product_id: i64,
        size: SizeCode,
        stock: i32,
        price_adjustment: Decimal,
    ) -> i64 {
        let mut data = self.data();
        let id = data.next_id();
        let is_default = size.is_default();
        let variation = Variation { id, product_id, size, stock, price_adjustment, is_default };
        data.variations.insert(id, variation);
        id
    }

    pub fn add_order_item(
        &self,
        order_id: i64,
        product_id: i64,
        variation_id: Option<i64>,
        quantity: i32,
    ) -> i64 {
        let mut data = self.data();
        let id = data.next_id();
        data.order_items.push(MemoryOrderItem { id, order_id, product_id, variation_id, quantity });
        id
    }

    pub fn add_payment(
        &self,
        order_id: i64,
        method: &str,
        status: PaymentStatus,
        amount: Decimal,
    ) -> i64 {
        let mut data = self.data();
        let id = data.next_id();
        data.payments.push(PaymentRecord {
            id, order_id, method: method.to_string(), status, transaction_id: None, amount,
            created_at: Utc::now(),
        });
        id
    }

    pub fn set_delivery_preference(&self, schedule: DeliverySchedule) {
        self.data().delivery_schedules.insert(schedule.order_id, schedule);
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        let turn = self.tx_lock.clone().lock_owned().await;
        Ok(MemoryTx { store: self.clone(), working: self.snapshot(), _turn: turn })
    }

    async fn order_detail(&self, order_id: i64) -> StoreResult<Option<OrderDetail>> {
        let data = self.data();
        let Some(head) = data.head(order_id) else { return Ok(None) };
        let payment =
            data.payments.iter().filter(|p| p.order_id == order_id).max_by_key(|p| p.id).cloned();
        let history = data.history.iter().filter(|h| h.order_id == order_id).cloned().collect();
        Ok(Some(OrderDetail::assemble(
            head,
            data.lines(order_id),
            data.shipping.get(&order_id).cloned(),
            payment,
            data.delivery_schedules.get(&order_id).cloned(),
            history,
        )))
    }
}

pub struct MemoryTx {
    store: MemoryStore,
    working: MemoryData,
    /// Held until commit or drop.
    _turn: OwnedMutexGuard<()>,
}

impl MemoryTx {
    fn check(&self, point: FailPoint) -> StoreResult<()> {
        let mut armed = self.store.fail_point.lock().unwrap_or_else(PoisonError::into_inner);
        if *armed == Some(point) {
            *armed = None;
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn order_mut(&mut self, order_id: i64) -> StoreResult<&mut MemoryOrder> {
        self.working
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| {
                StoreError::Corrupt(format!("order {order_id} vanished mid-transaction"))
            })
    }
}

#[async_trait]
impl OrderTx for MemoryTx {
    async fn find_order(&mut self, order_id: i64) -> StoreResult<Option<OrderHead>> {
        Ok(self.working.head(order_id))
    }

    async fn set_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.check(FailPoint::SetStatus)?;
        let order = self.order_mut(order_id)?;
        order.status = status;
        match status {
            OrderStatus::Shipped => order.shipping_date = Some(now),
            OrderStatus::Delivered => order.delivery_date = Some(now),
            _ => {}
        }
        Ok(())
    }

    async fn set_cancellation_reason(&mut self, order_id: i64, reason: &str) -> StoreResult<()> {
        self.order_mut(order_id)?.cancellation_reason = Some(reason.to_string());
        Ok(())
    }

    async fn append_history(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusHistoryEntry> {
        self.check(FailPoint::AppendHistory)?;
        let entry = StatusHistoryEntry {
            id: self.working.next_id(),
            order_id,
            status,
            notes: notes.map(str::to_string),
            created_at: now,
        };
        self.working.history.push(entry.clone());
        Ok(entry)
    }

    async fn find_shipping(&mut self, order_id: i64) -> StoreResult<Option<ShippingRecord>> {
        Ok(self.working.shipping.get(&order_id).cloned())
    }

    async fn mirror_shipping_status(
        &mut self,
        order_id: i64,
        status: ShippingStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.check(FailPoint::MirrorShipping)?;
        let record = self.working.shipping.entry(order_id).or_insert_with(|| ShippingRecord {
            order_id, pickup_location: None, carrier: None, tracking_number: None,
            estimated_delivery: None, status, updated_at: now,
        });
        record.status = status;
        record.updated_at = now;
        Ok(())
    }

    async fn upsert_shipping(&mut self, record: &ShippingRecord) -> StoreResult<()> {
        self.check(FailPoint::UpsertShipping)?;
        self.working.shipping.insert(record.order_id, record.clone());
        Ok(())
    }

    async fn find_payment(&mut self, order_id: i64) -> StoreResult<Option<PaymentRecord>> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.order_id == order_id && p.method != REFUND_METHOD)
            .min_by_key(|p| p.id)
            .cloned())
    }

    async fn insert_payment(
        &mut self,
        order_id: i64,
        payment: &Payment,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentRecord> {
        self.check(FailPoint::InsertPayment)?;
        let record = PaymentRecord {
            id: self.working.next_id(),
            order_id,
            method: payment.method.clone(),
            status: payment.status,
            transaction_id: payment.transaction_id.clone(), amount, created_at: now,
        };
        self.working.payments.push(record.clone());
        Ok(record)
    }

    async fn update_payment(
        &mut self,
        payment_id: i64,
        payment: &Payment,
        _now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.check(FailPoint::InsertPayment)?;
        let record = self
            .working
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| {
                StoreError::Corrupt(format!("payment {payment_id} vanished mid-transaction"))
            })?;
        record.method = payment.method.clone();
        record.status = payment.status;
        record.transaction_id = payment.transaction_id.clone();
        Ok(())
    }

    async fn insert_refund_payment(
        &mut self,
        order_id: i64,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentRecord> {
        self.check(FailPoint::InsertRefund)?;
        let record = PaymentRecord {
            id: self.working.next_id(),
            order_id,
            method: REFUND_METHOD.to_string(),
            status: PaymentStatus::Refunded,
            transaction_id: None, amount, created_at: now,
        };
        self.working.payments.push(record.clone());
        Ok(record)
    }

    async fn commit(self) -> StoreResult<()> {
        self.check(FailPoint::Commit)?;
        *self.store.data() = self.working;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> { Ok(()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_pending(ids: &[i64]) -> MemoryStore {
        let store = MemoryStore::new();
        let customer = store.add_customer("Maria Santos", "maria@example.com");
        for id in ids {
            store.seed_order(*id, customer, None, OrderStatus::Pending);
        }
        store
    }

    #[tokio::test]
    async fn test_overlapping_transactions_keep_both_writes() {
        let store = store_with_pending(&[101, 102]);
        let mut first = store.begin().await.unwrap();

        let other = store.clone();
        let second = tokio::spawn(async move {
            let mut tx = other.begin().await.unwrap();
            tx.set_status(102, OrderStatus::Processing, Utc::now()).await.unwrap();
            tx.commit().await.unwrap();
        });
        tokio::task::yield_now().await;
        assert!(!second.is_finished(), "second transaction must wait for the first");

        first.set_status(101, OrderStatus::Processing, Utc::now()).await.unwrap();
        first.commit().await.unwrap();
        second.await.unwrap();

        let data = store.snapshot();
        assert_eq!(data.orders[&101].status, OrderStatus::Processing);
        assert_eq!(data.orders[&102].status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_the_store() {
        let store = store_with_pending(&[103]);
        let mut tx = store.begin().await.unwrap();
        tx.set_status(103, OrderStatus::Shipped, Utc::now()).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.find_order(103).await.unwrap().unwrap().status, OrderStatus::Pending);
        tx.rollback().await.unwrap();
        assert_eq!(store.snapshot().orders[&103].status, OrderStatus::Pending);
    }
}
