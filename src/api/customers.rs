use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;

use super::{ApiResult, FlashMessage};
use crate::db::customers::{self, CustomerFilter};
use crate::db::{PageParams, PaginatedResponse};
use crate::domain::aggregates::{AccountStatus, Customer, CustomerSummary};

pub fn routes(pool: PgPool) -> Router {
    Router::new()
        .route("/customers", get(list))
        .route("/customers/:id", get(detail))
        .route("/customers/:id/status", put(set_status))
        .with_state(pool)
}

async fn list(
    State(pool): State<PgPool>,
    Query(filter): Query<CustomerFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<PaginatedResponse<Customer>>> {
    Ok(Json(customers::list_customers(&pool, &filter, &page).await?))
}

async fn detail(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CustomerSummary>> {
    Ok(Json(customers::customer_summary(&pool, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: AccountStatus,
}

async fn set_status(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<FlashMessage> {
    customers::set_status(&pool, id, req.status).await?;
    let message = match req.status {
        AccountStatus::Active => format!("Customer #{id} activated"),
        AccountStatus::Blocked => format!("Customer #{id} blocked"),
    };
    Ok(FlashMessage::success(message))
}
