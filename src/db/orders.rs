//! Order listing with optional filters.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{like_pattern, PageParams, PaginatedResponse, ORDER_TOTAL_SQL};
use crate::domain::aggregates::OrderStatus;
use crate::AdminError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListFilter {
    pub status: Option<String>,
    /// Customer name, email, or an order number.
    pub search: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderSummary {
    pub id: i64,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub total_amount: Decimal,
    pub status: String,
    pub order_date: DateTime<Utc>,
    pub item_count: i64,
}

/// Appends the WHERE conditions for `filter`; an unknown status is rejected.
pub(crate) fn push_filters(
    qb: &mut QueryBuilder<'static, Postgres>,
    filter: &OrderListFilter,
) -> Result<(), AdminError> {
    if let Some(status) = filter.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status = OrderStatus::parse(status).map_err(|e| AdminError::Validation(e.to_string()))?;
        qb.push(" AND o.status = ").push_bind(status.as_ref().to_string());
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (u.name ILIKE ").push_bind(pattern.clone());
        qb.push(" OR u.email ILIKE ").push_bind(pattern);
        if let Ok(id) = search.trim_start_matches('#').parse::<i64>() {
            qb.push(" OR o.id = ").push_bind(id);
        }
        qb.push(")");
    }
    if let Some(from) = filter.from {
        qb.push(" AND o.order_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        // Inclusive of the whole `to` day.
        let end = to.checked_add_days(Days::new(1)).unwrap_or(to);
        qb.push(" AND o.order_date < ").push_bind(end);
    }
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(AdminError::Validation("Start date is after end date".into()));
        }
    }
    Ok(())
}

pub(crate) fn order_query(
    filter: &OrderListFilter,
    page: &PageParams,
) -> Result<QueryBuilder<'static, Postgres>, AdminError> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT o.id, u.name AS customer_name, u.email AS customer_email, \
         {ORDER_TOTAL_SQL} AS total_amount, o.status, o.order_date, \
         (SELECT COUNT(*) FROM order_items i WHERE i.order_id = o.id) AS item_count \
         FROM orders o LEFT JOIN users u ON u.id = o.user_id WHERE 1 = 1"
    ));
    push_filters(&mut qb, filter)?;
    qb.push(" ORDER BY o.order_date DESC LIMIT ").push_bind(page.per_page() as i64);
    qb.push(" OFFSET ").push_bind(page.offset());
    Ok(qb)
}

pub async fn list_orders(
    pool: &PgPool,
    filter: &OrderListFilter,
    page: &PageParams,
) -> Result<PaginatedResponse<OrderSummary>, AdminError> {
    let data: Vec<OrderSummary> =
        order_query(filter, page)?.build_query_as().fetch_all(pool).await?;
    let mut count = QueryBuilder::new(
        "SELECT COUNT(*) FROM orders o LEFT JOIN users u ON u.id = o.user_id WHERE 1 = 1",
    );
    push_filters(&mut count, filter)?;
    let (total,): (i64,) = count.build_query_as().fetch_one(pool).await?;
    Ok(PaginatedResponse { data, total, page: page.page() })
}
