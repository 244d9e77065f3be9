//! Provider gateway adapters.
//!
//! Each adapter wraps one external payment provider behind the
//! `PaymentGateway` trait: session creation, synchronous verification,
//! webhook authentication/normalization and refunds. All amount conversion
//! between the order's major-unit decimals and a provider's wire format
//! happens here and nowhere else.

pub mod alipay;
pub mod paypal;
pub mod signature;
pub mod stripe;
pub mod wechat;

use crate::domain::order::Order;
use crate::error::{PaymentError, Result};
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared reqwest client builder: rustls, bounded timeout.
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| PaymentError::Internal(format!("http client: {e}")))
}

/// Short human-readable description providers display on their checkout
/// surfaces.
pub(crate) fn order_description(order: &Order) -> String {
    match order.items.first() {
        Some(item) if order.items.len() == 1 => format!("Custom {}", item.product_id),
        Some(item) => format!("Custom {} and {} more", item.product_id, order.items.len() - 1),
        None => format!("Order {}", order.id),
    }
}
