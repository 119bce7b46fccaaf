//! Aggregates module
pub mod product;
pub mod order;
pub mod customer;

pub use product::{
    Product, ProductDraft, ProductError, ProductListing, Variation, VariationDraft, VariationStock,
};
pub use order::{
    DeliverySchedule, Fulfillment, FulfillmentRequest, OrderDetail, OrderHead, OrderLine,
    OrderStatus, Payment, PaymentData, PaymentRecord, PaymentStatus, ShippingRecord, ShippingStatus,
    StatusHistoryEntry,
};
pub use customer::{AccountStatus, Customer, CustomerSummary};
