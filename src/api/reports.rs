use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use sqlx::PgPool;

use super::ApiResult;
use crate::db::reports::{sales_report, ReportQuery, SalesReport};

pub fn routes(pool: PgPool) -> Router {
    Router::new().route("/reports/sales", get(sales)).with_state(pool)
}

async fn sales(
    State(pool): State<PgPool>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<SalesReport>> {
    Ok(Json(sales_report(&pool, &query).await?))
}
