//! Customer notifications.
//!
//! Delivery is best-effort: [`Notifier::send`] reports success as a bool and
//! callers never undo work because a message failed to go out.

mod smtp;

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::aggregates::{OrderHead, OrderStatus, ShippingRecord};
use crate::domain::value_objects::Money;

pub use smtp::SmtpNotifier;

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> bool;
}

#[async_trait]
impl Notifier for Box<dyn Notifier> {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> bool {
        (**self).send(to, subject, html_body).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

impl EmailMessage {
    pub async fn dispatch<N: Notifier + ?Sized>(&self, notifier: &N) -> bool {
        let sent = notifier.send(&self.to, &self.subject, &self.html_body).await;
        if !sent {
            tracing::warn!(to = %self.to, subject = %self.subject, "Notification not delivered");
        }
        sent
    }
}

/// Builds the customer-facing copy for order emails.
#[derive(Clone, Debug)]
pub struct MessageComposer {
    store_name: String,
}

impl MessageComposer {
    pub fn new(store_name: impl Into<String>) -> Self { Self { store_name: store_name.into() } }

    /// Status update email, or `None` when the customer has no address on file.
    pub fn status_update(
        &self,
        order: &OrderHead,
        status: OrderStatus,
        shipping: Option<&ShippingRecord>,
    ) -> Option<EmailMessage> {
        let to = recipient(order)?;
        let greeting = format!("<p>Hi {},</p>", escape(&order.customer_name));
        let body = match status {
            OrderStatus::Processing => {
                let mut body = format!(
                    "<p>Good news! Your order #{} is now being processed. \
                     We will let you know as soon as it ships.</p>",
                    order.id
                );
                if let Some(total) = order.total_amount.filter(|t| !t.is_zero()) {
                    let total = Money::php(total);
                    body.push_str(&format!("<p>Order total: <strong>{total}</strong></p>"));
                }
                body
            }
            OrderStatus::Shipped => {
                let mut body = format!("<p>Your order #{} is on its way.</p>", order.id);
                if let Some(carrier) = shipping.and_then(|s| s.carrier.as_deref()) {
                    body.push_str(&format!("<p>Carrier: <strong>{}</strong></p>", escape(carrier)));
                }
                if let Some(tracking) = shipping.and_then(|s| s.tracking_number.as_deref()) {
                    let tracking = escape(tracking);
                    body.push_str(&format!("<p>Tracking number: <strong>{tracking}</strong></p>"));
                }
                if let Some(eta) = shipping.and_then(|s| s.estimated_delivery) {
                    let eta = eta.format("%B %-d, %Y");
                    body.push_str(&format!("<p>Estimated delivery: {eta}</p>"));
                }
                body
            }
            OrderStatus::Delivered => format!(
                "<p>Your order #{} has been delivered. Thank you for shopping with {}!</p>",
                order.id,
                escape(&self.store_name)
            ),
            other => format!(
                "<p>The status of your order #{} has been updated to <strong>{}</strong>.</p>",
                order.id,
                label(other)
            ),
        };
        Some(EmailMessage {
            to,
            subject: format!("Order #{} Status Update: {}", order.id, label(status)),
            html_body: self.wrap(&greeting, &body),
        })
    }

    pub fn pickup_instructions(&self, order: &OrderHead, location: &str) -> Option<EmailMessage> {
        let to = recipient(order)?;
        let greeting = format!("<p>Hi {},</p>", escape(&order.customer_name));
        let body = format!(
            "<p>Your order #{} will be ready for pickup at <strong>{}</strong>.</p>\
             <p>Please bring a valid ID and your order number when you claim it.</p>",
            order.id,
            escape(location)
        );
        Some(EmailMessage {
            to,
            subject: format!("Order #{} Pickup Instructions", order.id),
            html_body: self.wrap(&greeting, &body),
        })
    }

    fn wrap(&self, greeting: &str, body: &str) -> String {
        format!(
            "<html><body style=\"font-family: Arial, sans-serif; color: #333;\">{greeting}{body}\
             <p>Regards,<br>{}</p></body></html>",
            escape(&self.store_name)
        )
    }
}

fn recipient(order: &OrderHead) -> Option<String> {
    order.customer_email.as_deref().map(str::trim).filter(|e| !e.is_empty()).map(str::to_string)
}

/// `return_requested` -> `Return Requested`
fn label(status: OrderStatus) -> String {
    status
        .as_ref()
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

/// Notifier used when no mail transport is configured.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> bool {
        tracing::info!(to, subject, "Mail transport not configured; notification logged only");
        true
    }
}

/// Keeps every message in memory. Can be switched to fail all sends.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self { Self::default() }

    pub fn failing() -> Self {
        let notifier = Self::default();
        *notifier.failing.lock().unwrap_or_else(PoisonError::into_inner) = true;
        notifier
    }

    /// Messages accepted so far; failed sends are not recorded.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> bool {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return false;
        }
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(EmailMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use crate::domain::aggregates::ShippingStatus;

    fn order(email: Option<&str>) -> OrderHead {
        OrderHead {
            id: 42,
            customer_id: 1,
            customer_name: "Maria <Santos>".into(),
            customer_email: email.map(str::to_string),
            customer_phone: None,
            total_amount: None,
            status: OrderStatus::Processing,
            order_date: Utc::now(),
            shipping_date: None, delivery_date: None, cancellation_reason: None,
        }
    }

    #[test]
    fn test_shipped_copy_includes_tracking() {
        let composer = MessageComposer::new("Threadline");
        let shipping = ShippingRecord {
            order_id: 42,
            pickup_location: None,
            carrier: Some("LBC".into()),
            tracking_number: Some("LBC123".into()),
            estimated_delivery: NaiveDate::from_ymd_opt(2024, 6, 3),
            status: ShippingStatus::Shipped,
            updated_at: Utc::now(),
        };
        let head = order(Some("maria@example.com"));
        let msg = composer.status_update(&head, OrderStatus::Shipped, Some(&shipping)).unwrap();
        assert_eq!(msg.subject, "Order #42 Status Update: Shipped");
        assert!(msg.html_body.contains("is on its way"));
        assert!(msg.html_body.contains("LBC123"));
        assert!(msg.html_body.contains("June 3, 2024"));
        assert!(msg.html_body.contains("Maria &lt;Santos&gt;"));
    }

    #[test]
    fn test_processing_copy_shows_total() {
        let composer = MessageComposer::new("Threadline");
        let mut head = order(Some("maria@example.com"));
        head.total_amount = Some(rust_decimal_macros::dec!(1499.5));
        let msg = composer.status_update(&head, OrderStatus::Processing, None).unwrap();
        assert!(msg.html_body.contains("Order total: <strong>PHP 1499.50</strong>"));
    }

    #[test]
    fn test_generic_copy_for_other_statuses() {
        let composer = MessageComposer::new("Threadline");
        let head = order(Some("maria@example.com"));
        let msg = composer.status_update(&head, OrderStatus::ReturnRequested, None).unwrap();
        assert_eq!(msg.subject, "Order #42 Status Update: Return Requested");
        assert!(msg.html_body.contains("has been updated to <strong>Return Requested</strong>"));
    }

    #[test]
    fn test_no_message_without_address() {
        let composer = MessageComposer::new("Threadline");
        assert!(composer.status_update(&order(None), OrderStatus::Delivered, None).is_none());
        assert!(composer.pickup_instructions(&order(Some("  ")), "Main branch").is_none());
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        assert!(notifier.send("a@example.com", "Hi", "<p>x</p>").await);
        assert_eq!(notifier.sent().len(), 1);
        let failing = RecordingNotifier::failing();
        assert!(!failing.send("a@example.com", "Hi", "<p>x</p>").await);
        assert!(failing.sent().is_empty());
    }
}
