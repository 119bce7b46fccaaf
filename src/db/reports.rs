//! Sales report over completed business.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::ORDER_TOTAL_SQL;
use crate::AdminError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    #[default]
    Day,
    Month,
}

impl Grouping {
    fn trunc_unit(self) -> &'static str {
        match self {
            Grouping::Day => "day",
            Grouping::Month => "month",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub group_by: Grouping,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SalesBucket {
    pub period: NaiveDate,
    pub orders: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TopProduct {
    pub product_id: i64,
    pub name: String,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub revenue: Decimal,
    pub orders: i64,
    pub average_order_value: Decimal,
}

impl SalesSummary {
    pub fn from_buckets(buckets: &[SalesBucket]) -> Self {
        let revenue: Decimal = buckets.iter().map(|b| b.revenue).sum();
        let orders: i64 = buckets.iter().map(|b| b.orders).sum();
        let average_order_value = if orders == 0 {
            Decimal::ZERO
        } else {
            (revenue / Decimal::from(orders)).round_dp(2)
        };
        Self { revenue, orders, average_order_value }
    }
}

#[derive(Debug, Serialize)]
pub struct SalesReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub group_by: Grouping,
    pub summary: SalesSummary,
    pub buckets: Vec<SalesBucket>,
    pub top_products: Vec<TopProduct>,
}

/// Cancelled and refunded orders are left out; `to` is inclusive.
pub async fn sales_report(pool: &PgPool, query: &ReportQuery) -> Result<SalesReport, AdminError> {
    if query.from > query.to {
        return Err(AdminError::Validation("Start date is after end date".into()));
    }
    let buckets = sqlx::query_as::<_, SalesBucket>(&format!(
        "SELECT date_trunc('{unit}', o.order_date)::date AS period, COUNT(*) AS orders, \
         COALESCE(SUM({ORDER_TOTAL_SQL}), 0) AS revenue \
         FROM orders o \
         WHERE o.status NOT IN ('cancelled', 'refunded') \
           AND o.order_date >= $1 AND o.order_date < ($2::date + 1) \
         GROUP BY 1 ORDER BY 1",
        unit = query.group_by.trunc_unit(),
    ))
    .bind(query.from)
    .bind(query.to)
    .fetch_all(pool)
    .await?;

    let top_products = sqlx::query_as::<_, TopProduct>(
        "SELECT p.id AS product_id, p.name, SUM(oi.quantity)::bigint AS units \
         FROM order_items oi \
         JOIN orders o ON o.id = oi.order_id \
         JOIN products p ON p.id = oi.product_id \
         WHERE o.status NOT IN ('cancelled', 'refunded') \
           AND o.order_date >= $1 AND o.order_date < ($2::date + 1) \
         GROUP BY p.id, p.name ORDER BY units DESC, p.name LIMIT 5",
    )
    .bind(query.from)
    .bind(query.to)
    .fetch_all(pool)
    .await?;

    Ok(SalesReport {
        from: query.from,
        to: query.to,
        group_by: query.group_by,
        summary: SalesSummary::from_buckets(&buckets),
        buckets,
        top_products,
    })
}
