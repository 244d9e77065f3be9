use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The payment providers this deployment can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Stripe,
    Paypal,
    Wechat,
    Alipay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Wechat => "wechat",
            PaymentMethod::Alipay => "alipay",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "Credit / Debit Card",
            PaymentMethod::Paypal => "PayPal",
            PaymentMethod::Wechat => "WeChat Pay",
            PaymentMethod::Alipay => "Alipay",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(PaymentMethod::Stripe),
            "paypal" => Ok(PaymentMethod::Paypal),
            "wechat" => Ok(PaymentMethod::Wechat),
            "alipay" => Ok(PaymentMethod::Alipay),
            other => Err(PaymentError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Provider status after normalization at the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// An attempt in one of these states still occupies the order's single
    /// active-attempt slot.
    pub fn is_active(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

/// What a gateway hands back when a payment session is created: either a
/// checkout URL to redirect to or a QR payload to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentHandle {
    pub method: PaymentMethod,
    pub session_id: String,
    pub checkout_url: Option<String>,
    pub qr_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One gateway session/transaction owned by an order. Read-only once
/// finalized; at most one attempt per order may be active at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub handle_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl PaymentAttempt {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Outcome of a synchronous verify call or of webhook normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResult {
    pub refund_id: String,
    pub transaction_id: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    PaymentCompleted,
    PaymentFailed,
    Refunded,
    Other,
}

/// Provider-agnostic view of a webhook payload, produced only after the
/// signature check passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub kind: WebhookEventKind,
    pub method: PaymentMethod,
    /// Order id the adapter embedded in provider metadata at create time.
    pub order_id: Option<Uuid>,
    pub transaction_id: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    /// The provider's own event type string, for logging.
    pub raw_type: String,
    pub occurred_at: DateTime<Utc>,
}

/// Authentication material the webhook ingress extracts from provider
/// headers. Most providers use only `primary`; PayPal's transmission fields
/// feed its verify-webhook-signature API.
#[derive(Debug, Clone, Default)]
pub struct WebhookSignature {
    pub primary: Option<String>,
    pub transmission_id: Option<String>,
    pub transmission_time: Option<String>,
    pub cert_url: Option<String>,
    pub auth_algo: Option<String>,
}

impl WebhookSignature {
    pub fn from_primary(signature: impl Into<String>) -> Self {
        Self {
            primary: Some(signature.into()),
            ..Self::default()
        }
    }
}

const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Converts a provider minor-unit amount (cents/fen) to the major-unit
/// decimal the order model uses. Exact; no float involved.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Converts a major-unit decimal to provider minor units. Rejects amounts
/// with sub-cent precision rather than rounding silently.
pub fn to_minor_units(amount: Decimal) -> Result<i64, PaymentError> {
    let scaled = amount
        .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
        .ok_or_else(|| PaymentError::ValidationError(format!("amount out of range: {amount}")))?;
    if scaled.fract() != Decimal::ZERO {
        return Err(PaymentError::ValidationError(format!(
            "amount has sub-cent precision: {amount}"
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| PaymentError::ValidationError(format!("amount out of range: {amount}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_unit_round_trip_boundaries() {
        for minor in [1i64, 99, 100, 100000] {
            let major = from_minor_units(minor);
            assert_eq!(to_minor_units(major).unwrap(), minor);
        }
    }

    #[test]
    fn test_minor_unit_known_values() {
        assert_eq!(from_minor_units(4990), dec!(49.90));
        assert_eq!(to_minor_units(dec!(299.00)).unwrap(), 29900);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
    }

    #[test]
    fn test_sub_cent_precision_rejected() {
        let err = to_minor_units(dec!(1.005)).unwrap_err();
        assert!(matches!(err, PaymentError::ValidationError(_)));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("stripe".parse::<PaymentMethod>().unwrap(), PaymentMethod::Stripe);
        assert_eq!("alipay".parse::<PaymentMethod>().unwrap(), PaymentMethod::Alipay);
        assert!(matches!(
            "bitcoin".parse::<PaymentMethod>(),
            Err(PaymentError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_attempt_activity() {
        assert!(PaymentStatus::Pending.is_active());
        assert!(PaymentStatus::Processing.is_active());
        assert!(!PaymentStatus::Completed.is_active());
        assert!(!PaymentStatus::Failed.is_active());
        assert!(!PaymentStatus::Refunded.is_active());
    }
}
