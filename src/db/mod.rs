//! Direct queries behind the catalog, customer, order listing and report screens.

pub mod catalog;
pub mod customers;
pub mod orders;
pub mod reports;

use serde::{Deserialize, Serialize};

/// Stored order total, or the sum of its lines when the stored total is empty.
/// Expects the order aliased as `o`.
pub(crate) const ORDER_TOTAL_SQL: &str = "COALESCE(NULLIF(o.total_amount, 0), (\
    SELECT COALESCE(SUM(oi.quantity * (p.base_price + COALESCE(pv.price_adjustment, 0))), 0) \
    FROM order_items oi JOIN products p ON p.id = oi.product_id \
    LEFT JOIN product_variations pv ON pv.id = oi.variation_id \
    WHERE oi.order_id = o.id))";

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    pub fn page(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn per_page(&self) -> u32 { self.per_page.unwrap_or(20).clamp(1, 100) }
    pub fn offset(&self) -> i64 { (i64::from(self.page()) - 1) * i64::from(self.per_page()) }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

/// `%term%` for ILIKE, with LIKE wildcards in the term escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}
