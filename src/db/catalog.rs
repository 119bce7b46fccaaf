//! Products, size variations and stock.

use std::collections::HashMap;

use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::like_pattern;
use crate::domain::aggregates::product::check_default_variation;
use crate::domain::aggregates::{
    Product, ProductDraft, ProductListing, Variation, VariationDraft, VariationStock,
};
use crate::domain::value_objects::{SizeCode, StockDelta};
use crate::AdminError;

const PRODUCT_COLUMNS: &str = "id, name, description, base_price, category, image, created_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(sqlx::FromRow)]
struct VariationRow {
    id: i64,
    product_id: i64,
    size: String,
    stock: i32,
    price_adjustment: rust_decimal::Decimal,
    is_default: bool,
}

impl TryFrom<VariationRow> for Variation {
    type Error = AdminError;
    fn try_from(r: VariationRow) -> Result<Self, AdminError> {
        let size = SizeCode::new(r.size).map_err(|e| AdminError::Validation(e.to_string()))?;
        Ok(Variation {
            id: r.id,
            product_id: r.product_id,
            size,
            stock: r.stock,
            price_adjustment: r.price_adjustment,
            is_default: r.is_default,
        })
    }
}

pub(crate) fn product_query(filter: &ProductFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE 1 = 1"));
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND name ILIKE ").push_bind(like_pattern(search));
    }
    if let Some(category) = filter.category.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND category = ").push_bind(category.trim().to_string());
    }
    qb.push(" ORDER BY name");
    qb
}

pub async fn list_products(
    pool: &PgPool,
    filter: &ProductFilter,
) -> Result<Vec<ProductListing>, AdminError> {
    let products: Vec<Product> = product_query(filter).build_query_as().fetch_all(pool).await?;
    let ids: Vec<i64> = products.iter().map(|p| p.id).collect();
    let rows = sqlx::query_as::<_, VariationRow>(
        "SELECT id, product_id, size, stock, price_adjustment, is_default \
         FROM product_variations WHERE product_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_product: HashMap<i64, Vec<Variation>> = HashMap::new();
    for row in rows {
        let variation = Variation::try_from(row)?;
        by_product.entry(variation.product_id).or_default().push(variation);
    }

    Ok(products
        .into_iter()
        .map(|product| {
            let variations = by_product.remove(&product.id).unwrap_or_default();
            if let Err(e) = check_default_variation(&variations) {
                let product_id = product.id;
                tracing::warn!(product_id, error = %e, "Product variation invariant broken");
            }
            ProductListing::new(product, variations)
        })
        .collect())
}

/// Creates the product together with its default `M` variation.
pub async fn create_product(pool: &PgPool, draft: &ProductDraft) -> Result<Product, AdminError> {
    draft.check()?;
    let mut tx = pool.begin().await?;
    let product = sqlx::query_as::<_, Product>(&format!(
        "INSERT INTO products (name, description, base_price, category, image, created_at) \
         VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(draft.name.trim())
    .bind(&draft.description)
    .bind(draft.base_price)
    .bind(&draft.category)
    .bind(&draft.image)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO product_variations (product_id, size, stock, price_adjustment, is_default) \
         VALUES ($1, $2, $3, 0, TRUE)",
    )
    .bind(product.id)
    .bind(SizeCode::DEFAULT)
    .bind(draft.initial_stock)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(product_id = product.id, "Product created");
    Ok(product)
}

pub async fn update_product(
    pool: &PgPool,
    id: i64,
    draft: &ProductDraft,
) -> Result<Product, AdminError> {
    draft.check()?;
    sqlx::query_as::<_, Product>(&format!(
        "UPDATE products SET name = $2, description = $3, base_price = $4, category = $5, \
         image = $6 \
         WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(id)
    .bind(draft.name.trim())
    .bind(&draft.description)
    .bind(draft.base_price)
    .bind(&draft.category)
    .bind(&draft.image)
    .fetch_optional(pool)
    .await?
    .ok_or(AdminError::ProductNotFound(id))
}

pub async fn delete_product(pool: &PgPool, id: i64) -> Result<(), AdminError> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(AdminError::ProductNotFound(id));
    }
    Ok(())
}

/// Variation stock rows for the stock-adjustment dialog, smallest size first.
pub async fn variation_stock(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<VariationStock>, AdminError> {
    let mut rows = sqlx::query_as::<_, VariationStock>(
        "SELECT id, size, stock FROM product_variations WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    sort_by_size(&mut rows);
    Ok(rows)
}

pub(crate) fn sort_by_size(rows: &mut [VariationStock]) {
    rows.sort_by_cached_key(|r| {
        let size = SizeCode::new(r.size.clone()).ok();
        (size.is_none(), size)
    });
}

pub async fn add_variation(
    pool: &PgPool,
    product_id: i64,
    draft: &VariationDraft,
) -> Result<Variation, AdminError> {
    let size = draft.size_code()?;
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(AdminError::ProductNotFound(product_id));
    }
    let row = sqlx::query_as::<_, VariationRow>(
        "INSERT INTO product_variations (product_id, size, stock, price_adjustment, is_default) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (product_id, size) DO NOTHING \
         RETURNING id, product_id, size, stock, price_adjustment, is_default",
    )
    .bind(product_id)
    .bind(size.as_str())
    .bind(draft.stock)
    .bind(draft.price_adjustment)
    .bind(size.is_default())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AdminError::Validation(format!("Size {size} already exists for this product")))?;
    row.try_into()
}

/// Applies `stock = stock + delta` and returns the new stock. No floor at zero.
pub async fn adjust_stock(
    pool: &PgPool,
    variation_id: i64,
    delta: StockDelta,
) -> Result<i32, AdminError> {
    if delta.is_zero() {
        return Err(AdminError::Validation("Stock change cannot be zero".into()));
    }
    let (stock,): (i32,) = sqlx::query_as(
        "UPDATE product_variations SET stock = stock + $2 WHERE id = $1 RETURNING stock",
    )
    .bind(variation_id)
    .bind(delta.value())
    .fetch_optional(pool)
    .await?
    .ok_or(AdminError::VariationNotFound(variation_id))?;
    if stock < 0 {
        tracing::warn!(variation_id, stock, delta = delta.value(), "Stock adjusted below zero");
    } else {
        tracing::info!(variation_id, stock, delta = delta.value(), "Stock adjusted");
    }
    Ok(stock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_query_filters() {
        let filter = ProductFilter { search: Some("tee".into()), category: Some("Shirts".into()) };
        let qb = product_query(&filter);
        let sql = qb.sql();
        assert!(sql.contains("name ILIKE $1"));
        assert!(sql.contains("category = $2"));
        assert!(sql.ends_with("ORDER BY name"));
    }

    #[test]
    fn test_product_query_ignores_blank_filters() {
        let qb = product_query(&ProductFilter { search: Some("  ".into()), category: None });
        assert!(!qb.sql().contains("ILIKE"));
    }

    #[test]
    fn test_variation_stock_sorted_by_size() {
        let mut rows = vec![
            VariationStock { id: 1, size: "XL".into(), stock: 2 },
            VariationStock { id: 2, size: "S".into(), stock: 5 },
            VariationStock { id: 3, size: "M".into(), stock: -1 },
        ];
        sort_by_size(&mut rows);
        let sizes: Vec<&str> = rows.iter().map(|r| r.size.as_str()).collect();
        assert_eq!(sizes, vec!["S", "M", "XL"]);
    }
}
