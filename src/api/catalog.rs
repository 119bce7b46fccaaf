//! Product, variation and stock endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::{ApiResult, FlashMessage};
use crate::db::catalog::{self, ProductFilter};
use crate::domain::aggregates::{
    Product, ProductDraft, ProductListing, Variation, VariationDraft, VariationStock,
};
use crate::domain::value_objects::{display_stock, StockDelta};

pub fn routes(pool: PgPool) -> Router {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", put(update_product).delete(delete_product))
        .route("/products/:id/variations", get(variations).post(add_variation))
        .route("/variations/:id/stock", post(adjust_stock))
        .with_state(pool)
}

async fn list_products(
    State(pool): State<PgPool>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<Json<Vec<ProductListing>>> {
    Ok(Json(catalog::list_products(&pool, &filter).await?))
}

async fn create_product(
    State(pool): State<PgPool>,
    Json(draft): Json<ProductDraft>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(catalog::create_product(&pool, &draft).await?)))
}

async fn update_product(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(draft): Json<ProductDraft>,
) -> ApiResult<Json<Product>> {
    Ok(Json(catalog::update_product(&pool, id, &draft).await?))
}

async fn delete_product(State(pool): State<PgPool>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    catalog::delete_product(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `[{id, size, stock}]` for the stock-adjustment dialog.
async fn variations(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<VariationStock>>> {
    Ok(Json(catalog::variation_stock(&pool, id).await?))
}

async fn add_variation(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(draft): Json<VariationDraft>,
) -> ApiResult<(StatusCode, Json<Variation>)> {
    Ok((StatusCode::CREATED, Json(catalog::add_variation(&pool, id, &draft).await?)))
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub delta: i32,
}

#[derive(Debug, Serialize)]
struct StockLevel {
    variation_id: i64,
    stock: i32,
    display_stock: i32,
}

async fn adjust_stock(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(req): Json<StockAdjustment>,
) -> ApiResult<FlashMessage> {
    let stock = catalog::adjust_stock(&pool, id, StockDelta::new(req.delta)).await?;
    let level = StockLevel { variation_id: id, stock, display_stock: display_stock(stock) };
    Ok(FlashMessage::success("Stock updated").with_data(&level))
}
