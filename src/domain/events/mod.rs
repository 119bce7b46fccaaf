//! Domain events
use crate::domain::aggregates::{OrderStatus, PaymentStatus};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    StatusChanged { order_id: i64, from: OrderStatus, to: OrderStatus, notes: Option<String> },
    FulfillmentScheduled { order_id: i64, pickup: bool },
    PaymentRecorded { order_id: i64, method: String, status: PaymentStatus },
    Cancelled { order_id: i64, reason: String },
}

impl OrderEvent {
    pub fn order_id(&self) -> i64 {
        match self {
            Self::StatusChanged { order_id, .. }
            | Self::FulfillmentScheduled { order_id, .. }
            | Self::PaymentRecorded { order_id, .. }
            | Self::Cancelled { order_id, .. } => *order_id,
        }
    }

    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        let kind = match self {
            Self::StatusChanged { .. } => "status_changed",
            Self::FulfillmentScheduled { .. } => "fulfillment_scheduled",
            Self::PaymentRecorded { .. } => "payment_recorded",
            Self::Cancelled { .. } => "cancelled",
        };
        format!("backoffice.orders.{kind}")
    }
}

/// Publishes order events on NATS. Publishing is best-effort.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }
    pub fn disabled() -> Self { Self { nats: None } }

    pub async fn publish(&self, events: &[OrderEvent]) {
        let Some(client) = &self.nats else { return };
        for event in events {
            let payload = match serde_json::to_vec(event) {
                Ok(payload) => payload,
                Err(e) => {
                    let order_id = event.order_id();
                    tracing::warn!(order_id, error = %e, "Failed to encode order event");
                    continue;
                }
            };
            if let Err(e) = client.publish(event.subject(), payload.into()).await {
                let order_id = event.order_id();
                tracing::warn!(order_id, error = %e, "Failed to publish order event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_subject_and_payload() {
        let event = OrderEvent::StatusChanged {
            order_id: 42,
            from: OrderStatus::Processing,
            to: OrderStatus::Shipped,
            notes: None,
        };
        assert_eq!(event.subject(), "backoffice.orders.status_changed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["to"], "shipped");
    }
}
