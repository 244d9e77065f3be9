use super::{http_client, order_description};
use crate::config::PaypalConfig;
use crate::domain::order::Order;
use crate::domain::payment::{
    NormalizedEvent, PaymentHandle, PaymentMethod, PaymentResult, PaymentStatus, RefundResult,
    WebhookEventKind, WebhookSignature,
};
use crate::domain::ports::PaymentGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use tokio::sync::RwLock;

/// Redirect-approval flow via the PayPal Orders v2 API.
///
/// PayPal expresses amounts as major-unit strings with two decimals, so the
/// boundary conversion here is string formatting/parsing rather than a
/// minor-unit scale. The order id rides in `custom_id`. The native SDK's
/// callback completion style is hidden behind plain async calls.
pub struct PaypalGateway {
    http: reqwest::Client,
    cfg: PaypalConfig,
    currency: String,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct PaypalOrder {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    amount: Option<MoneyValue>,
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct MoneyValue {
    value: String,
    currency_code: String,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    verification_status: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event_type: String,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
    resource: WebhookResource,
}

#[derive(Debug, Deserialize)]
struct WebhookResource {
    id: String,
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    amount: Option<MoneyValue>,
}

/// Formats a major-unit decimal the way PayPal expects: two decimal places.
fn format_major(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

fn parse_major(value: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|_| PaymentError::ValidationError(format!("unparseable amount: {value}")))
}

impl PaypalGateway {
    pub fn new(cfg: PaypalConfig, currency: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            cfg,
            currency: currency.to_uppercase(),
            token: RwLock::new(None),
        })
    }

    /// Client-credentials token, cached until shortly before expiry.
    async fn access_token(&self) -> Result<String> {
        if let Some(cached) = self.token.read().await.as_ref()
            && cached.expires_at > Utc::now()
        {
            return Ok(cached.access_token.clone());
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.cfg.api_base))
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await?;

        let cached = CachedToken {
            access_token: response.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(response.expires_in - 60),
        };
        *self.token.write().await = Some(cached);
        Ok(response.access_token)
    }

    async fn fetch_order(&self, order_id: &str, token: &str) -> Result<PaypalOrder> {
        let order = self
            .http
            .get(format!("{}/v2/checkout/orders/{order_id}", self.cfg.api_base))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json::<PaypalOrder>()
            .await?;
        Ok(order)
    }

    async fn capture_order(&self, order_id: &str, token: &str) -> Result<PaypalOrder> {
        let order = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{order_id}/capture",
                self.cfg.api_base
            ))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?
            .error_for_status()?
            .json::<PaypalOrder>()
            .await?;
        Ok(order)
    }
}

#[async_trait]
impl PaymentGateway for PaypalGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Paypal
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
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": order.id.to_string(),
                "custom_id": order.id.to_string(),
                "description": order_description(order),
                "amount": {
                    "currency_code": self.currency,
                    "value": format_major(order.total_amount),
                },
            }],
            "application_context": {
                "return_url": return_url,
                "cancel_url": cancel_url,
            },
        });

        let created = self
            .http
            .post(format!("{}/v2/checkout/orders", self.cfg.api_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<PaypalOrder>()
            .await?;

        let approve_url = created
            .links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.clone());

        Ok(PaymentHandle {
            method: PaymentMethod::Paypal,
            session_id: created.id,
            checkout_url: approve_url,
            qr_code: None,
            expires_at: None,
        })
    }

    async fn verify_payment(&self, handle_id: &str) -> Result<PaymentResult> {
        let token = self.access_token().await?;
        let mut order = self.fetch_order(handle_id, &token).await?;

        // The buyer approved but nothing captured yet: capture now so the
        // return-navigation path settles the payment.
        if order.status == "APPROVED" {
            order = self.capture_order(handle_id, &token).await?;
        }

        let completed = order.status == "COMPLETED";
        let unit = order.purchase_units.first();
        let amount = unit
            .and_then(|u| u.amount.as_ref())
            .map(|m| parse_major(&m.value))
            .transpose()?
            .unwrap_or(Decimal::ZERO);
        let currency = unit
            .and_then(|u| u.amount.as_ref())
            .map(|m| m.currency_code.clone())
            .unwrap_or_else(|| self.currency.clone());
        let capture_id = unit
            .and_then(|u| u.payments.as_ref())
            .and_then(|p| p.captures.first())
            .map(|c| c.id.clone());

        Ok(PaymentResult {
            success: completed,
            transaction_id: capture_id.unwrap_or(order.id),
            amount,
            currency,
            method: PaymentMethod::Paypal,
            status: match order.status.as_str() {
                "COMPLETED" => PaymentStatus::Completed,
                "VOIDED" => PaymentStatus::Failed,
                _ => PaymentStatus::Pending,
            },
            timestamp: Utc::now(),
        })
    }

    async fn handle_webhook(
        &self,
        payload: &[u8],
        sig: &WebhookSignature,
    ) -> Result<NormalizedEvent> {
        let (transmission_sig, transmission_id, transmission_time, cert_url) = match (
            sig.primary.as_deref(),
            sig.transmission_id.as_deref(),
            sig.transmission_time.as_deref(),
            sig.cert_url.as_deref(),
        ) {
            (Some(s), Some(i), Some(t), Some(c)) => (s, i, t, c),
            _ => {
                return Err(PaymentError::AuthenticationFailed(
                    "missing paypal transmission headers".to_string(),
                ));
            }
        };

        let event_value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::ValidationError(format!("paypal webhook body: {e}")))?;

        // PayPal verifies its own webhook signatures server-side.
        let token = self.access_token().await?;
        let verification = self
            .http
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.cfg.api_base
            ))
            .bearer_auth(&token)
            .json(&json!({
                "auth_algo": sig.auth_algo.as_deref().unwrap_or("SHA256withRSA"),
                "cert_url": cert_url,
                "transmission_id": transmission_id,
                "transmission_sig": transmission_sig,
                "transmission_time": transmission_time,
                "webhook_id": self.cfg.webhook_id,
                "webhook_event": event_value,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<VerificationResponse>()
            .await?;
        if verification.verification_status != "SUCCESS" {
            return Err(PaymentError::AuthenticationFailed(
                "paypal signature verification failed".to_string(),
            ));
        }

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::ValidationError(format!("paypal webhook body: {e}")))?;

        let kind = match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" | "CHECKOUT.ORDER.COMPLETED" => {
                WebhookEventKind::PaymentCompleted
            }
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => {
                WebhookEventKind::PaymentFailed
            }
            "PAYMENT.CAPTURE.REFUNDED" => WebhookEventKind::Refunded,
            _ => WebhookEventKind::Other,
        };

        let amount = event
            .resource
            .amount
            .as_ref()
            .map(|m| parse_major(&m.value))
            .transpose()?;

        Ok(NormalizedEvent {
            kind,
            method: PaymentMethod::Paypal,
            order_id: event
                .resource
                .custom_id
                .as_deref()
                .and_then(|id| id.parse().ok()),
            transaction_id: event.resource.id,
            amount,
            currency: event.resource.amount.map(|m| m.currency_code),
            raw_type: event.event_type,
            occurred_at: event.create_time.unwrap_or_else(Utc::now),
        })
    }

    async fn refund_payment(
        &self,
        handle_id: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult> {
        let token = self.access_token().await?;
        let order = self.fetch_order(handle_id, &token).await?;
        let capture_id = order
            .purchase_units
            .first()
            .and_then(|u| u.payments.as_ref())
            .and_then(|p| p.captures.first())
            .map(|c| c.id.clone())
            .ok_or_else(|| {
                PaymentError::PaymentNotCompleted(format!("order {handle_id} has no capture"))
            })?;

        let body = match amount {
            Some(amount) => json!({
                "amount": {
                    "currency_code": self.currency,
                    "value": format_major(amount),
                }
            }),
            None => json!({}),
        };

        #[derive(Debug, Deserialize)]
        struct Refund {
            id: String,
            #[serde(default)]
            amount: Option<MoneyValue>,
        }

        let refund = self
            .http
            .post(format!(
                "{}/v2/payments/captures/{capture_id}/refund",
                self.cfg.api_base
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<Refund>()
            .await?;

        let refunded_amount = refund
            .amount
            .as_ref()
            .map(|m| parse_major(&m.value))
            .transpose()?
            .or(amount)
            .unwrap_or(Decimal::ZERO);

        Ok(RefundResult {
            refund_id: refund.id,
            transaction_id: capture_id,
            amount: refunded_amount,
            status: PaymentStatus::Refunded,
            timestamp: Utc::now(),
        })
    }
}
