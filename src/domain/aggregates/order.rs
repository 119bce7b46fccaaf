//! Order Aggregate

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::WorkflowError;

/// Lifecycle status of an order. `Cancelled` and `Delivered` are terminal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    ReturnRequested,
    Returned,
    Refunded,
}

impl OrderStatus {
    /// Parses a status coming from a form or a database row.
    pub fn parse(value: &str) -> Result<Self, WorkflowError> {
        value.trim().parse().map_err(|_| WorkflowError::InvalidStatus(value.to_string()))
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Cancelled | Self::Delivered) }

    /// Terminal orders only accept a re-apply of their own status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        !self.is_terminal() || *self == next
    }

    /// Non-terminal statuses past dispatch, which a completed payment leaves alone.
    pub fn is_past_dispatch(&self) -> bool {
        matches!(self, Self::Shipped | Self::ReturnRequested | Self::Returned | Self::Refunded)
    }

    /// Shipping record status mirrored for this order status, if any.
    pub fn shipping_mirror(&self) -> Option<ShippingStatus> {
        match self {
            Self::Shipped => Some(ShippingStatus::Shipped),
            Self::Delivered => Some(ShippingStatus::Delivered),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShippingStatus { Processing, Shipped, Delivered }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus { Pending, Completed, Failed, Refunded }

/// Method recorded on the synthetic payment row a refund creates.
pub const REFUND_METHOD: &str = "refund";

// =============================================================================
// Commands
// =============================================================================

/// Admin fulfillment request as submitted; fields are checked by [`FulfillmentRequest::validate`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FulfillmentRequest {
    Pickup {
        #[serde(default)]
        location: Option<String>,
    },
    Delivery {
        #[serde(default)]
        date: Option<NaiveDate>,
        #[serde(default)]
        carrier: Option<String>,
        #[serde(default)]
        tracking_number: Option<String>,
    },
}

/// A fulfillment request with every mode-required field present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fulfillment {
    Pickup { location: String },
    Delivery { date: NaiveDate, carrier: String, tracking_number: Option<String> },
}

impl FulfillmentRequest {
    pub fn validate(self) -> Result<Fulfillment, WorkflowError> {
        match self {
            Self::Pickup { location } => Ok(Fulfillment::Pickup {
                location: non_empty(location).ok_or(WorkflowError::MissingField("location"))?,
            }),
            Self::Delivery { date, carrier, tracking_number } => Ok(Fulfillment::Delivery {
                date: date.ok_or(WorkflowError::MissingField("date"))?,
                carrier: non_empty(carrier).ok_or(WorkflowError::MissingField("carrier"))?,
                tracking_number: non_empty(tracking_number),
            }),
        }
    }
}

impl Fulfillment {
    pub fn is_pickup(&self) -> bool { matches!(self, Self::Pickup { .. }) }
}

/// Payment details as submitted by the admin.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentData {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payment {
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
}

impl PaymentData {
    pub fn validate(self) -> Result<Payment, WorkflowError> {
        let method = non_empty(self.method).ok_or(WorkflowError::MissingField("method"))?;
        let status = non_empty(self.status).ok_or(WorkflowError::MissingField("status"))?;
        let status = status.parse().map_err(|_| WorkflowError::InvalidStatus(status.clone()))?;
        Ok(Payment { method, status, transaction_id: non_empty(self.transaction_id) })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// =============================================================================
// Records
// =============================================================================

/// Core order fields joined with the owning customer's contact details.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderHead {
    pub id: i64,
    pub customer_id: i64,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub total_amount: Option<Decimal>,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub shipping_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin-controlled fulfillment record; pickup and carrier fields are mutually exclusive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingRecord {
    pub order_id: i64,
    pub pickup_location: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<NaiveDate>,
    pub status: ShippingStatus,
    pub updated_at: DateTime<Utc>,
}

impl ShippingRecord {
    /// Record for a freshly scheduled fulfillment, clearing the other mode's fields.
    pub fn scheduled(order_id: i64, fulfillment: &Fulfillment, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            order_id, pickup_location: None, carrier: None, tracking_number: None,
            estimated_delivery: None, status: ShippingStatus::Processing, updated_at: now,
        };
        match fulfillment {
            Fulfillment::Pickup { location } => record.pickup_location = Some(location.clone()),
            Fulfillment::Delivery { date, carrier, tracking_number } => {
                record.estimated_delivery = Some(*date);
                record.carrier = Some(carrier.clone());
                record.tracking_number = tracking_number.clone();
            }
        }
        record
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub order_id: i64,
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Customer-stated delivery preference. Read-only to the admin workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliverySchedule {
    pub order_id: i64,
    pub preferred_date: Option<NaiveDate>,
    pub time_slot: Option<String>,
    pub is_pickup: bool,
    pub pickup_location: Option<String>,
}

/// Order line resolved to its product and variation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub product_name: String,
    pub image: Option<String>,
    pub size: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
}

/// Unit price of a line: product base price plus the variation's adjustment.
pub fn unit_price(base_price: Decimal, price_adjustment: Option<Decimal>) -> Decimal {
    base_price + price_adjustment.unwrap_or(Decimal::ZERO)
}

/// Everything the order detail screen shows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: OrderHead,
    pub total_amount: Decimal,
    pub items: Vec<OrderLine>,
    pub shipping: Option<ShippingRecord>,
    pub payment: Option<PaymentRecord>,
    pub delivery_preference: Option<DeliverySchedule>,
    /// Newest first.
    pub history: Vec<StatusHistoryEntry>,
}

impl OrderDetail {
    pub fn assemble(
        order: OrderHead,
        items: Vec<OrderLine>,
        shipping: Option<ShippingRecord>,
        payment: Option<PaymentRecord>,
        delivery_preference: Option<DeliverySchedule>,
        mut history: Vec<StatusHistoryEntry>,
    ) -> Self {
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total_amount = derive_total(order.total_amount, &items);
        Self { order, total_amount, items, shipping, payment, delivery_preference, history }
    }
}

/// Stored total, or the sum of line totals when the stored total is empty.
pub fn derive_total(stored: Option<Decimal>, items: &[OrderLine]) -> Decimal {
    match stored {
        Some(total) if !total.is_zero() => total,
        _ => items.iter().map(OrderLine::line_total).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use strum::IntoEnumIterator;

    fn line(id: i64, qty: i32, price: Decimal) -> OrderLine {
        OrderLine {
            id,
            product_id: 1,
            variation_id: None,
            product_name: "Tee".into(),
            image: None,
            size: Some("M".into()),
            quantity: qty,
            unit_price: price,
        }
    }

    #[test]
    fn test_status_round_trip_names() {
        assert_eq!(OrderStatus::parse("return_requested").unwrap(), OrderStatus::ReturnRequested);
        assert_eq!(OrderStatus::ReturnRequested.as_ref(), "return_requested");
        let err = OrderStatus::parse("lost");
        assert!(matches!(err, Err(WorkflowError::InvalidStatus(s)) if s == "lost"));
    }

    #[test]
    fn test_terminal_statuses_only_accept_themselves() {
        for from in [OrderStatus::Cancelled, OrderStatus::Delivered] {
            for to in OrderStatus::iter() {
                assert_eq!(from.can_transition_to(to), from == to, "{from} -> {to}");
            }
        }
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::ReturnRequested));
    }

    #[test]
    fn test_past_dispatch_statuses() {
        let past: Vec<OrderStatus> =
            OrderStatus::iter().filter(OrderStatus::is_past_dispatch).collect();
        assert_eq!(
            past,
            vec![
                OrderStatus::Shipped,
                OrderStatus::ReturnRequested,
                OrderStatus::Returned,
                OrderStatus::Refunded,
            ]
        );
        assert!(past.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn test_pickup_requires_location() {
        let request = FulfillmentRequest::Pickup { location: Some("  ".into()) };
        let err = request.validate().unwrap_err();
        assert!(matches!(err, WorkflowError::MissingField("location")));
    }

    #[test]
    fn test_delivery_requires_date_and_carrier() {
        let missing_date =
            FulfillmentRequest::Delivery {
                date: None,
                carrier: Some("LBC".into()),
                tracking_number: None,
            };
        assert!(matches!(missing_date.validate(), Err(WorkflowError::MissingField("date"))));
        let missing_carrier = FulfillmentRequest::Delivery {
            date: NaiveDate::from_ymd_opt(2024, 5, 2),
            carrier: None,
            tracking_number: None,
        };
        assert!(matches!(missing_carrier.validate(), Err(WorkflowError::MissingField("carrier"))));
    }

    #[test]
    fn test_fulfillment_request_from_json() {
        let json =
            r#"{"mode":"delivery","date":"2024-05-02","carrier":"J&T","tracking_number":""}"#;
        let req: FulfillmentRequest = serde_json::from_str(json).unwrap();
        let fulfillment = req.validate().unwrap();
        assert_eq!(
            fulfillment,
            Fulfillment::Delivery {
                date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                carrier: "J&T".into(),
                tracking_number: None,
            }
        );
    }

    #[test]
    fn test_scheduled_record_clears_other_mode() {
        let pickup = Fulfillment::Pickup { location: "Main branch".into() };
        let record = ShippingRecord::scheduled(3, &pickup, Utc::now());
        assert_eq!(record.pickup_location.as_deref(), Some("Main branch"));
        assert!(record.carrier.is_none());
        assert!(record.tracking_number.is_none());
        assert!(record.estimated_delivery.is_none());
        assert_eq!(record.status, ShippingStatus::Processing);
    }

    #[test]
    fn test_payment_data_validation() {
        let missing =
            PaymentData { method: Some("gcash".into()), status: None, transaction_id: None };
        assert!(matches!(missing.validate(), Err(WorkflowError::MissingField("status"))));
        let ok = PaymentData {
            method: Some("gcash".into()),
            status: Some("completed".into()),
            transaction_id: Some("TX-1".into()),
        };
        assert_eq!(ok.validate().unwrap().status, PaymentStatus::Completed);
    }

    #[test]
    fn test_derive_total_falls_back_to_items() {
        let items = vec![line(1, 2, dec!(150.00)), line(2, 1, dec!(99.50))];
        assert_eq!(derive_total(None, &items), dec!(399.50));
        assert_eq!(derive_total(Some(Decimal::ZERO), &items), dec!(399.50));
        assert_eq!(derive_total(Some(dec!(420.00)), &items), dec!(420.00));
    }

    #[test]
    fn test_unit_price_adds_adjustment() {
        assert_eq!(unit_price(dec!(300), Some(dec!(25.50))), dec!(325.50));
        assert_eq!(unit_price(dec!(300), None), dec!(300));
    }
}
