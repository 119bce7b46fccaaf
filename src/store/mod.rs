//! Persistence collaborator used by the order workflow.
//!
//! Every write goes through an [`OrderTx`]. Dropping a transaction without
//! calling [`OrderTx::commit`] discards all of its writes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::aggregates::{
    OrderDetail, OrderHead, OrderStatus, Payment, PaymentRecord, ShippingRecord, ShippingStatus,
    StatusHistoryEntry,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("Unreadable row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    type Tx: OrderTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Read-only aggregation for the order detail screen.
    async fn order_detail(&self, order_id: i64) -> StoreResult<Option<OrderDetail>>;
}

#[async_trait]
pub trait OrderTx: Send {
    /// Loads the order and its customer's contact details, locking the order row.
    async fn find_order(&mut self, order_id: i64) -> StoreResult<Option<OrderHead>>;

    /// Sets the status and stamps `shipping_date`/`delivery_date` when entering those states.
    async fn set_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn set_cancellation_reason(&mut self, order_id: i64, reason: &str) -> StoreResult<()>;

    async fn append_history(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusHistoryEntry>;

    async fn find_shipping(&mut self, order_id: i64) -> StoreResult<Option<ShippingRecord>>;

    /// Upserts only the status of the order's shipping record.
    async fn mirror_shipping_status(
        &mut self,
        order_id: i64,
        status: ShippingStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Upserts every field of the order's shipping record.
    async fn upsert_shipping(&mut self, record: &ShippingRecord) -> StoreResult<()>;

    /// The order's regular payment row; refund rows are not considered.
    async fn find_payment(&mut self, order_id: i64) -> StoreResult<Option<PaymentRecord>>;

    async fn insert_payment(
        &mut self,
        order_id: i64,
        payment: &Payment,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentRecord>;

    async fn update_payment(
        &mut self,
        payment_id: i64,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Always inserts a new `refund` row, leaving earlier payment rows alone.
    async fn insert_refund_payment(
        &mut self,
        order_id: i64,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentRecord>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}
