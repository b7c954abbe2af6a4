//! Receipts issued at settlement.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::order::Money;

/// How the patient pays at pickup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    /// The insurer is billed for everything; nothing is collected at the counter.
    InsuranceOnly,
}

impl PaymentMethod {
    /// Returns true if the tendered amount must cover the amount due.
    pub fn requires_upfront_payment(&self) -> bool {
        !matches!(self, PaymentMethod::InsuranceOnly)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::InsuranceOnly => "insurance_only",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned for an unrecognised payment method name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown payment method: {0}")]
pub struct UnknownPaymentMethod(pub String);

impl std::str::FromStr for PaymentMethod {
    type Err = UnknownPaymentMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "insurance_only" => Ok(PaymentMethod::InsuranceOnly),
            _ => Err(UnknownPaymentMethod(s.to_string())),
        }
    }
}

/// Proof of settlement. Created once per order and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_number: String,
    pub order_id: OrderId,
    pub amount_due: Money,
    pub amount_tendered: Money,
    pub change_given: Money,
    pub payment_method: PaymentMethod,
    pub issued_at: DateTime<Utc>,

    /// Staff member who took the payment.
    pub issued_by: String,
}

impl Receipt {
    /// Builds a receipt, computing the change as `max(0, tendered - due)`.
    pub fn issue(
        receipt_number: impl Into<String>,
        order_id: OrderId,
        amount_due: Money,
        amount_tendered: Money,
        payment_method: PaymentMethod,
        issued_by: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            receipt_number: receipt_number.into(),
            order_id,
            amount_due,
            amount_tendered,
            change_given: amount_tendered.saturating_excess_over(amount_due),
            payment_method,
            issued_at,
            issued_by: issued_by.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_is_tendered_minus_due() {
        let receipt = Receipt::issue(
            "RCPT-20240101-000001",
            OrderId::new(),
            Money::from_cents(2510),
            Money::from_cents(3000),
            PaymentMethod::Cash,
            "cashier",
            Utc::now(),
        );
        assert_eq!(receipt.change_given, Money::from_cents(490));
    }

    #[test]
    fn change_is_never_negative() {
        let receipt = Receipt::issue(
            "RCPT-20240101-000002",
            OrderId::new(),
            Money::from_cents(2510),
            Money::zero(),
            PaymentMethod::InsuranceOnly,
            "cashier",
            Utc::now(),
        );
        assert_eq!(receipt.change_given, Money::zero());
    }

    #[test]
    fn only_insurance_only_skips_upfront_payment() {
        assert!(PaymentMethod::Cash.requires_upfront_payment());
        assert!(PaymentMethod::Card.requires_upfront_payment());
        assert!(!PaymentMethod::InsuranceOnly.requires_upfront_payment());
    }

    #[test]
    fn payment_method_parsing() {
        assert_eq!("Cash".parse::<PaymentMethod>(), Ok(PaymentMethod::Cash));
        assert_eq!(
            "insurance_only".parse::<PaymentMethod>(),
            Ok(PaymentMethod::InsuranceOnly)
        );
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }
}
