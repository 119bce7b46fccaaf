//! PostgreSQL order store (sqlx).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use super::{OrderStore, OrderTx, StoreError, StoreResult};
use crate::domain::aggregates::order::{unit_price, REFUND_METHOD};
use crate::domain::aggregates::{
    DeliverySchedule, OrderDetail, OrderHead, OrderLine, OrderStatus, Payment, PaymentRecord,
    ShippingRecord, ShippingStatus, StatusHistoryEntry,
};

const ORDER_HEAD_SQL: &str = "SELECT o.id, o.user_id AS customer_id, u.name AS customer_name, \
    u.email AS customer_email, u.phone AS customer_phone, o.total_amount, o.status, o.order_date, \
    o.shipping_date, o.delivery_date, o.cancellation_reason \
    FROM orders o LEFT JOIN users u ON u.id = o.user_id WHERE o.id = $1";

const SHIPPING_SQL: &str = "SELECT order_id, pickup_location, carrier, tracking_number, \
    estimated_delivery, status, updated_at FROM shipping WHERE order_id = $1";

const PAYMENT_COLUMNS: &str = "id, order_id, method, status, transaction_id, amount, created_at";

#[derive(sqlx::FromRow)]
struct OrderHeadRow {
    id: i64,
    customer_id: i64,
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    total_amount: Option<Decimal>,
    status: String,
    order_date: DateTime<Utc>,
    shipping_date: Option<DateTime<Utc>>,
    delivery_date: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
}

impl TryFrom<OrderHeadRow> for OrderHead {
    type Error = StoreError;
    fn try_from(r: OrderHeadRow) -> StoreResult<Self> {
        Ok(OrderHead {
            id: r.id,
            customer_id: r.customer_id,
            customer_name: r.customer_name.unwrap_or_default(),
            customer_email: r.customer_email,
            customer_phone: r.customer_phone,
            total_amount: r.total_amount,
            status: parse_column(&r.status, "orders.status")?,
            order_date: r.order_date,
            shipping_date: r.shipping_date,
            delivery_date: r.delivery_date,
            cancellation_reason: r.cancellation_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    order_id: i64,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for StatusHistoryEntry {
    type Error = StoreError;
    fn try_from(r: HistoryRow) -> StoreResult<Self> {
        Ok(StatusHistoryEntry {
            id: r.id,
            order_id: r.order_id,
            status: parse_column(&r.status, "order_status_history.status")?,
            notes: r.notes,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ShippingRow {
    order_id: i64,
    pickup_location: Option<String>,
    carrier: Option<String>,
    tracking_number: Option<String>,
    estimated_delivery: Option<NaiveDate>,
    status: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShippingRow> for ShippingRecord {
    type Error = StoreError;
    fn try_from(r: ShippingRow) -> StoreResult<Self> {
        Ok(ShippingRecord {
            order_id: r.order_id,
            pickup_location: r.pickup_location,
            carrier: r.carrier,
            tracking_number: r.tracking_number,
            estimated_delivery: r.estimated_delivery,
            status: parse_column(&r.status, "shipping.status")?,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    order_id: i64,
    method: String,
    status: String,
    transaction_id: Option<String>,
    amount: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = StoreError;
    fn try_from(r: PaymentRow) -> StoreResult<Self> {
        Ok(PaymentRecord {
            id: r.id,
            order_id: r.order_id,
            method: r.method,
            status: parse_column(&r.status, "payments.status")?,
            transaction_id: r.transaction_id,
            amount: r.amount,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    id: i64,
    product_id: i64,
    variation_id: Option<i64>,
    product_name: String,
    image: Option<String>,
    size: Option<String>,
    quantity: i32,
    base_price: Decimal,
    price_adjustment: Option<Decimal>,
}

impl From<LineRow> for OrderLine {
    fn from(r: LineRow) -> Self {
        OrderLine {
            id: r.id,
            product_id: r.product_id,
            variation_id: r.variation_id,
            product_name: r.product_name,
            image: r.image,
            size: r.size,
            quantity: r.quantity,
            unit_price: unit_price(r.base_price, r.price_adjustment),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    order_id: i64,
    preferred_date: Option<NaiveDate>,
    time_slot: Option<String>,
    is_pickup: bool,
    pickup_location: Option<String>,
}

fn parse_column<T: std::str::FromStr>(value: &str, column: &str) -> StoreResult<T> {
    value.parse().map_err(|_| StoreError::Corrupt(format!("{column} = {value:?}")))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl OrderStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        Ok(PgTx { tx: self.pool.begin().await? })
    }

    async fn order_detail(&self, order_id: i64) -> StoreResult<Option<OrderDetail>> {
        let head = sqlx::query_as::<_, OrderHeadRow>(ORDER_HEAD_SQL)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(head) = head else { return Ok(None) };
        let head = OrderHead::try_from(head)?;

        let items = sqlx::query_as::<_, LineRow>(
            "SELECT oi.id, oi.product_id, oi.variation_id, p.name AS product_name, p.image, \
             pv.size, oi.quantity, p.base_price, pv.price_adjustment \
             FROM order_items oi JOIN products p ON p.id = oi.product_id \
             LEFT JOIN product_variations pv ON pv.id = oi.variation_id \
             WHERE oi.order_id = $1 ORDER BY oi.id",
        )
        .bind(order_id).fetch_all(&self.pool).await?
        .into_iter().map(OrderLine::from).collect();

        let shipping = sqlx::query_as::<_, ShippingRow>(SHIPPING_SQL)
            .bind(order_id).fetch_optional(&self.pool).await?
            .map(ShippingRecord::try_from).transpose()?;

        let payment = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY id DESC LIMIT 1"
        ))
        .bind(order_id).fetch_optional(&self.pool).await?
        .map(PaymentRecord::try_from).transpose()?;

        let delivery_preference = sqlx::query_as::<_, ScheduleRow>(
            "SELECT order_id, preferred_date, time_slot, is_pickup, pickup_location \
             FROM delivery_schedules WHERE order_id = $1",
        )
        .bind(order_id).fetch_optional(&self.pool).await?
        .map(|r| DeliverySchedule {
            order_id: r.order_id,
            preferred_date: r.preferred_date,
            time_slot: r.time_slot,
            is_pickup: r.is_pickup,
            pickup_location: r.pickup_location,
        });

        let history = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, order_id, status, notes, created_at FROM order_status_history \
             WHERE order_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(order_id).fetch_all(&self.pool).await?
        .into_iter().map(StatusHistoryEntry::try_from).collect::<StoreResult<Vec<_>>>()?;

        let detail =
            OrderDetail::assemble(head, items, shipping, payment, delivery_preference, history);
        Ok(Some(detail))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTx for PgTx {
    async fn find_order(&mut self, order_id: i64) -> StoreResult<Option<OrderHead>> {
        sqlx::query_as::<_, OrderHeadRow>(&format!("{ORDER_HEAD_SQL} FOR UPDATE OF o"))
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(OrderHead::try_from)
            .transpose()
    }

    async fn set_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE orders SET status = $2, \
             shipping_date = CASE WHEN $2 = 'shipped' THEN $3 ELSE shipping_date END, \
             delivery_date = CASE WHEN $2 = 'delivered' THEN $3 ELSE delivery_date END \
             WHERE id = $1",
        )
        .bind(order_id).bind(status.as_ref()).bind(now)
        .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn set_cancellation_reason(&mut self, order_id: i64, reason: &str) -> StoreResult<()> {
        sqlx::query("UPDATE orders SET cancellation_reason = $2 WHERE id = $1")
            .bind(order_id).bind(reason)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn append_history(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusHistoryEntry> {
        let row = sqlx::query_as::<_, HistoryRow>(
            "INSERT INTO order_status_history (order_id, status, notes, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING id, order_id, status, notes, created_at",
        )
        .bind(order_id).bind(status.as_ref()).bind(notes).bind(now)
        .fetch_one(&mut *self.tx).await?;
        row.try_into()
    }

    async fn find_shipping(&mut self, order_id: i64) -> StoreResult<Option<ShippingRecord>> {
        sqlx::query_as::<_, ShippingRow>(SHIPPING_SQL)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(ShippingRecord::try_from)
            .transpose()
    }

    async fn mirror_shipping_status(
        &mut self,
        order_id: i64,
        status: ShippingStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO shipping (order_id, status, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (order_id) \
             DO UPDATE SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at",
        )
        .bind(order_id).bind(status.as_ref()).bind(now)
        .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn upsert_shipping(&mut self, record: &ShippingRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO shipping (order_id, pickup_location, carrier, tracking_number,
                                  estimated_delivery, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id)
            DO UPDATE SET
                pickup_location = EXCLUDED.pickup_location,
                carrier = EXCLUDED.carrier,
                tracking_number = EXCLUDED.tracking_number,
                estimated_delivery = EXCLUDED.estimated_delivery,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.order_id)
        .bind(&record.pickup_location)
        .bind(&record.carrier)
        .bind(&record.tracking_number)
        .bind(record.estimated_delivery)
        .bind(record.status.as_ref())
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_payment(&mut self, order_id: i64) -> StoreResult<Option<PaymentRecord>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 AND method <> $2 \
             ORDER BY id LIMIT 1 FOR UPDATE"
        ))
        .bind(order_id).bind(REFUND_METHOD)
        .fetch_optional(&mut *self.tx).await?
        .map(PaymentRecord::try_from)
        .transpose()
    }

    async fn insert_payment(
        &mut self,
        order_id: i64,
        payment: &Payment,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentRecord> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments (order_id, method, status, transaction_id, amount, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(order_id)
        .bind(&payment.method)
        .bind(payment.status.as_ref())
        .bind(&payment.transaction_id)
        .bind(amount)
        .bind(now)
        .fetch_one(&mut *self.tx).await?;
        row.try_into()
    }

    async fn update_payment(
        &mut self,
        payment_id: i64,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE payments SET method = $2, status = $3, transaction_id = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(payment_id)
        .bind(&payment.method)
        .bind(payment.status.as_ref())
        .bind(&payment.transaction_id)
        .bind(now)
        .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert_refund_payment(
        &mut self,
        order_id: i64,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentRecord> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments (order_id, method, status, amount, created_at) \
             VALUES ($1, $2, 'refunded', $3, $4) RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(order_id).bind(REFUND_METHOD).bind(amount).bind(now)
        .fetch_one(&mut *self.tx).await?;
        row.try_into()
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
