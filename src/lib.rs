//! E-commerce admin back-office
//!
//! Administrative back-end for a clothing store.
//!
//! ## Features
//! - Order workflow: status transitions, fulfillment scheduling, payments,
//!   cancellations, returns and refunds
//! - Product catalog with size variations and stock adjustment
//! - Customer account administration
//! - Sales reporting

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod notify;
pub mod store;
pub mod workflow;

use thiserror::Error;

use crate::domain::aggregates::{OrderStatus, ProductError};
use crate::store::StoreError;

pub use crate::workflow::OrderWorkflow;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Order #{0} not found")]
    OrderNotFound(i64),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Order #{order_id} is {current} and cannot be changed to {attempted}")]
    TerminalStateViolation { order_id: i64, current: OrderStatus, attempted: OrderStatus },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl WorkflowError {
    /// Rule violations are caller mistakes; persistence errors are ours.
    pub fn is_rule_violation(&self) -> bool { !matches!(self, Self::Persistence(_)) }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors from the catalog, customer, listing and report screens.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Product #{0} not found")]
    ProductNotFound(i64),

    #[error("Variation #{0} not found")]
    VariationNotFound(i64),

    #[error("Customer #{0} not found")]
    CustomerNotFound(i64),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ProductError> for AdminError {
    fn from(e: ProductError) -> Self { AdminError::Validation(e.to_string()) }
}
