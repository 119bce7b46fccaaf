//! HTTP surface for the admin screens.
//!
//! Every mutating endpoint answers with a flash message
//! `{ "kind": "success" | "error", "message": ... }`, optionally carrying the
//! changed record under `data`.

pub mod catalog;
pub mod customers;
pub mod orders;
pub mod reports;

use std::sync::Arc;

use axum::{http::StatusCode, response::{IntoResponse, Response}, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::notify::Notifier;
use crate::store::OrderStore;
use crate::{AdminError, OrderWorkflow, WorkflowError};

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

#[derive(Clone, Debug, Serialize)]
pub struct FlashMessage {
    pub kind: FlashKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl FlashMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self { kind: FlashKind::Success, message: message.into(), data: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: FlashKind::Error, message: message.into(), data: None }
    }

    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

impl IntoResponse for FlashMessage {
    fn into_response(self) -> Response { Json(self).into_response() }
}

/// Error response: a status code plus an error flash.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    flash: FlashMessage,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, flash: FlashMessage::error(message) }
    }

    pub fn status(&self) -> StatusCode { self.status }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response { (self.status, Json(self.flash)).into_response() }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        // Workflow failures are already logged by the engine.
        let status = match &e {
            WorkflowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            WorkflowError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::TerminalStateViolation { .. } => StatusCode::CONFLICT,
            WorkflowError::Persistence(_) => {
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<AdminError> for ApiError {
    fn from(e: AdminError) -> Self {
        let status = match &e {
            AdminError::ProductNotFound(_)
            | AdminError::VariationNotFound(_)
            | AdminError::CustomerNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AdminError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AdminError::Database(db) => {
                tracing::error!(error = %db, "Admin query failed");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE);
            }
        };
        Self::new(status, e.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Full application router. Without a pool only the order workflow routes
/// are mounted.
pub fn router<S: OrderStore, N: Notifier>(
    workflow: Arc<OrderWorkflow<S, N>>,
    pool: Option<PgPool>,
) -> Router {
    let mut admin = orders::workflow_routes(workflow);
    if let Some(pool) = pool {
        admin = admin
            .merge(orders::listing_routes(pool.clone()))
            .merge(catalog::routes(pool.clone()))
            .merge(customers::routes(pool.clone()))
            .merge(reports::routes(pool));
    }

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "backoffice"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;
    use crate::store::StoreError;

    #[test]
    fn test_workflow_error_status_codes() {
        let conflict = ApiError::from(WorkflowError::TerminalStateViolation {
            order_id: 7,
            current: OrderStatus::Cancelled,
            attempted: OrderStatus::Processing,
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(WorkflowError::OrderNotFound(1)).status(), StatusCode::NOT_FOUND);
        let missing = ApiError::from(WorkflowError::MissingField("location"));
        assert_eq!(missing.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_persistence_details_stay_out_of_the_body() {
        let cause = StoreError::Unavailable("pool timed out".into());
        let err = ApiError::from(WorkflowError::Persistence(cause));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.flash.message, GENERIC_FAILURE);
    }

    #[test]
    fn test_flash_serialization() {
        let json = serde_json::to_value(FlashMessage::success("Saved")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "success", "message": "Saved"}));
    }
}
