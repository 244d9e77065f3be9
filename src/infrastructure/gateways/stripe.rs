use super::{http_client, signature};
use crate::config::StripeConfig;
use crate::domain::order::Order;
use crate::domain::payment::{
    NormalizedEvent, PaymentHandle, PaymentMethod, PaymentResult, PaymentStatus, RefundResult,
    WebhookEventKind, WebhookSignature, from_minor_units, to_minor_units,
};
use crate::domain::ports::PaymentGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Card checkout via Stripe Checkout Sessions.
///
/// Amounts cross this boundary in minor units (cents). The order id rides
/// in `metadata[order_id]` so webhook events correlate without a lookup
/// table.
pub struct StripeGateway {
    http: reqwest::Client,
    cfg: StripeConfig,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: Option<i64>,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

impl StripeGateway {
    pub fn new(cfg: StripeConfig, currency: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            cfg,
            currency,
        })
    }

    fn sessions_url(&self) -> String {
        format!("{}/v1/checkout/sessions", self.cfg.api_base)
    }

    async fn fetch_session(&self, session_id: &str) -> Result<CheckoutSession> {
        let session = self
            .http
            .get(format!("{}/{}", self.sessions_url(), session_id))
            .bearer_auth(&self.cfg.secret_key)
            .send()
            .await?
            .error_for_status()?
            .json::<CheckoutSession>()
            .await?;
        Ok(session)
    }

    fn result_from_session(&self, session: CheckoutSession) -> PaymentResult {
        let paid = session.payment_status.as_deref() == Some("paid");
        PaymentResult {
            success: paid,
            transaction_id: session.payment_intent.unwrap_or(session.id),
            amount: session.amount_total.map(from_minor_units).unwrap_or(Decimal::ZERO),
            currency: session.currency.unwrap_or_else(|| self.currency.clone()),
            method: PaymentMethod::Stripe,
            status: if paid {
                PaymentStatus::Completed
            } else {
                PaymentStatus::Pending
            },
            timestamp: Utc::now(),
        }
    }
}

/// Parses a `stripe-signature` header of the form `t=<ts>,v1=<hex>[,…]`.
fn parse_signature_header(header: &str) -> Result<(String, String)> {
    let mut timestamp = None;
    let mut v1 = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value.to_string()),
            Some(("v1", value)) => v1 = Some(value.to_string()),
            _ => {}
        }
    }
    match (timestamp, v1) {
        (Some(t), Some(v)) => Ok((t, v)),
        _ => Err(PaymentError::AuthenticationFailed(
            "malformed stripe-signature header".to_string(),
        )),
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    fn is_configured(&self) -> bool {
        self.cfg.is_configured()
    }

    async fn create_payment(
        &self,
        order: &Order,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<PaymentHandle> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), return_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
            ("client_reference_id".to_string(), order.id.to_string()),
            ("metadata[order_id]".to_string(), order.id.to_string()),
        ];
        for (i, item) in order.items.iter().enumerate() {
            form.push((
                format!("line_items[{i}][price_data][currency]"),
                self.currency.clone(),
            ));
            form.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.product_id.clone(),
            ));
            form.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                to_minor_units(item.unit_price)?.to_string(),
            ));
            form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }

        let session = self
            .http
            .post(self.sessions_url())
            .bearer_auth(&self.cfg.secret_key)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<CheckoutSession>()
            .await?;

        Ok(PaymentHandle {
            method: PaymentMethod::Stripe,
            session_id: session.id,
            checkout_url: session.url,
            qr_code: None,
            expires_at: None,
        })
    }

    async fn verify_payment(&self, handle_id: &str) -> Result<PaymentResult> {
        let session = self.fetch_session(handle_id).await?;
        Ok(self.result_from_session(session))
    }

    async fn handle_webhook(
        &self,
        payload: &[u8],
        sig: &WebhookSignature,
    ) -> Result<NormalizedEvent> {
        let header = sig.primary.as_deref().ok_or_else(|| {
            PaymentError::AuthenticationFailed("missing stripe-signature header".to_string())
        })?;
        let (timestamp, v1) = parse_signature_header(header)?;
        let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + payload.len());
        signed_payload.extend_from_slice(timestamp.as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);
        signature::verify(&self.cfg.webhook_secret, &signed_payload, &v1)?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::ValidationError(format!("stripe webhook body: {e}")))?;

        let kind = match event.event_type.as_str() {
            "checkout.session.completed" => WebhookEventKind::PaymentCompleted,
            "checkout.session.expired" | "checkout.session.async_payment_failed" => {
                WebhookEventKind::PaymentFailed
            }
            "charge.refunded" => WebhookEventKind::Refunded,
            _ => WebhookEventKind::Other,
        };

        let object = event.data.object;
        Ok(NormalizedEvent {
            kind,
            method: PaymentMethod::Stripe,
            order_id: object
                .metadata
                .get("order_id")
                .and_then(|id| id.parse().ok()),
            transaction_id: object.payment_intent.unwrap_or_else(|| object.id.clone()),
            amount: object.amount_total.map(from_minor_units),
            currency: object.currency,
            raw_type: event.event_type,
            occurred_at: event
                .created
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                .unwrap_or_else(Utc::now),
        })
    }

    async fn refund_payment(
        &self,
        handle_id: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult> {
        // Refunds run against the payment intent behind the session.
        let session = self.fetch_session(handle_id).await?;
        let payment_intent = session.payment_intent.ok_or_else(|| {
            PaymentError::PaymentNotCompleted(format!("session {handle_id} has no payment intent"))
        })?;

        let mut form: Vec<(String, String)> =
            vec![("payment_intent".to_string(), payment_intent.clone())];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), to_minor_units(amount)?.to_string()));
        }

        let refund = self
            .http
            .post(format!("{}/v1/refunds", self.cfg.api_base))
            .bearer_auth(&self.cfg.secret_key)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<Refund>()
            .await?;

        Ok(RefundResult {
            refund_id: refund.id,
            transaction_id: payment_intent,
            amount: from_minor_units(refund.amount),
            status: PaymentStatus::Refunded,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn gateway() -> StripeGateway {
        StripeGateway::new(
            StripeConfig {
                secret_key: "sk_test_123".to_string(),
                webhook_secret: "whsec_test".to_string(),
                api_base: "https://api.stripe.com".to_string(),
            },
            "usd".to_string(),
        )
        .unwrap()
    }

    fn completed_payload(order_id: Uuid) -> Vec<u8> {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "created": 1754500000,
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "payment_intent": "pi_123",
                    "amount_total": 29900,
                    "currency": "usd",
                    "metadata": { "order_id": order_id.to_string() }
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    fn sign_payload(payload: &[u8]) -> WebhookSignature {
        let timestamp = "1754500000";
        let mut signed = timestamp.as_bytes().to_vec();
        signed.push(b'.');
        signed.extend_from_slice(payload);
        let v1 = signature::sign("whsec_test", &signed);
        WebhookSignature::from_primary(format!("t={timestamp},v1={v1}"))
    }

    #[test]
    fn test_parse_signature_header() {
        let (t, v1) = parse_signature_header("t=123,v1=abcdef").unwrap();
        assert_eq!(t, "123");
        assert_eq!(v1, "abcdef");

        // Extra schemes are tolerated.
        let (_, v1) = parse_signature_header("t=123,v1=abcdef,v0=ignored").unwrap();
        assert_eq!(v1, "abcdef");

        assert!(parse_signature_header("v1=abcdef").is_err());
    }

    #[tokio::test]
    async fn test_webhook_normalization() {
        let gateway = gateway();
        let order_id = Uuid::new_v4();
        let payload = completed_payload(order_id);
        let sig = sign_payload(&payload);

        let event = gateway.handle_webhook(&payload, &sig).await.unwrap();
        assert_eq!(event.kind, WebhookEventKind::PaymentCompleted);
        assert_eq!(event.order_id, Some(order_id));
        assert_eq!(event.transaction_id, "pi_123");
        assert_eq!(event.amount, Some(from_minor_units(29900)));
    }

    #[tokio::test]
    async fn test_webhook_bad_signature_rejected() {
        let gateway = gateway();
        let payload = completed_payload(Uuid::new_v4());
        let sig = WebhookSignature::from_primary("t=1754500000,v1=deadbeef");

        let err = gateway.handle_webhook(&payload, &sig).await.unwrap_err();
        assert!(matches!(err, PaymentError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_webhook_missing_signature_rejected() {
        let gateway = gateway();
        let payload = completed_payload(Uuid::new_v4());

        let err = gateway
            .handle_webhook(&payload, &WebhookSignature::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_unrecognized_event_is_other() {
        let gateway = gateway();
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": "invoice.paid",
            "data": { "object": { "id": "in_1", "metadata": {} } }
        })
        .to_string()
        .into_bytes();
        let sig = sign_payload(&payload);

        let event = gateway.handle_webhook(&payload, &sig).await.unwrap();
        assert_eq!(event.kind, WebhookEventKind::Other);
        assert_eq!(event.order_id, None);
    }
}
