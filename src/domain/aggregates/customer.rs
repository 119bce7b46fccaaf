//! Customer Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Blocked,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

/// Customer with order statistics, shown on the account detail screen.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomerSummary {
    #[serde(flatten)]
    pub customer: Customer,
    pub order_count: i64,
    pub lifetime_spend: Decimal,
}

impl CustomerSummary {
    pub fn average_order_value(&self) -> Decimal {
        if self.order_count == 0 {
            return Decimal::ZERO;
        }
        (self.lifetime_spend / Decimal::from(self.order_count)).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_summary_average() {
        let customer = Customer {
            id: 1,
            name: "Ana".into(),
            email: "ana@example.com".into(),
            phone: None,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        };
        let summary =
            CustomerSummary {
                customer: customer.clone(),
                order_count: 3,
                lifetime_spend: dec!(1000),
            };
        assert_eq!(summary.average_order_value(), dec!(333.33));
        let empty = CustomerSummary { customer, order_count: 0, lifetime_spend: Decimal::ZERO };
        assert_eq!(empty.average_order_value(), Decimal::ZERO);
    }

    #[test]
    fn test_account_status_text() {
        let status: AccountStatus = "blocked".parse().unwrap();
        assert_eq!(status, AccountStatus::Blocked);
        assert_eq!(AccountStatus::default().as_ref(), "active");
        assert!("suspended".parse::<AccountStatus>().is_err());
    }
}
