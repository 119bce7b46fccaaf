//! Customer accounts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{like_pattern, PageParams, PaginatedResponse};
use crate::domain::aggregates::{AccountStatus, Customer, CustomerSummary};
use crate::AdminError;

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, status, created_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilter {
    pub search: Option<String>,
    pub status: Option<AccountStatus>,
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: i64,
    name: String,
    email: String,
    phone: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = AdminError;
    fn try_from(r: CustomerRow) -> Result<Self, AdminError> {
        let status = r
            .status
            .parse()
            .map_err(|_| AdminError::Validation(format!("Unknown account status {:?}", r.status)))?;
        Ok(Customer {
            id: r.id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            status,
            created_at: r.created_at,
        })
    }
}

fn push_filters(qb: &mut QueryBuilder<'static, Postgres>, filter: &CustomerFilter) {
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (name ILIKE ").push_bind(pattern.clone());
        qb.push(" OR email ILIKE ").push_bind(pattern);
        qb.push(")");
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_ref().to_string());
    }
}

pub(crate) fn customer_query(
    filter: &CustomerFilter,
    page: &PageParams,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {CUSTOMER_COLUMNS} FROM users WHERE 1 = 1"));
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(page.per_page() as i64);
    qb.push(" OFFSET ").push_bind(page.offset());
    qb
}

pub async fn list_customers(
    pool: &PgPool,
    filter: &CustomerFilter,
    page: &PageParams,
) -> Result<PaginatedResponse<Customer>, AdminError> {
    let rows: Vec<CustomerRow> =
        customer_query(filter, page).build_query_as().fetch_all(pool).await?;
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users WHERE 1 = 1");
    push_filters(&mut count, filter);
    let (total,): (i64,) = count.build_query_as().fetch_one(pool).await?;
    Ok(PaginatedResponse {
        data: rows.into_iter().map(Customer::try_from).collect::<Result<_, _>>()?,
        total,
        page: page.page(),
    })
}

/// Account with order count and spend; cancelled and refunded orders do not count.
pub async fn customer_summary(pool: &PgPool, id: i64) -> Result<CustomerSummary, AdminError> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM users WHERE id = $1"
    ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AdminError::CustomerNotFound(id))?;
    let (order_count, lifetime_spend): (i64, Option<Decimal>) = sqlx::query_as(&format!(
        "SELECT COUNT(*), SUM({}) FROM orders o \
         WHERE o.user_id = $1 AND o.status NOT IN ('cancelled', 'refunded')",
        super::ORDER_TOTAL_SQL
    ))
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(CustomerSummary {
        customer: row.try_into()?,
        order_count,
        lifetime_spend: lifetime_spend.unwrap_or(Decimal::ZERO),
    })
}

pub async fn set_status(pool: &PgPool, id: i64, status: AccountStatus) -> Result<(), AdminError> {
    let result = sqlx::query("UPDATE users SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_ref())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AdminError::CustomerNotFound(id));
    }
    tracing::info!(customer_id = id, status = %status, "Customer account status changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_query() {
        let filter =
            CustomerFilter { search: Some("ana".into()), status: Some(AccountStatus::Blocked) };
        let qb = customer_query(&filter, &PageParams { page: Some(2), per_page: Some(10) });
        let sql = qb.sql();
        assert!(sql.contains("(name ILIKE $1 OR email ILIKE $2)"));
        assert!(sql.contains("status = $3"));
        assert!(sql.contains("LIMIT $4 OFFSET $5"));
    }
}
