use super::{http_client, order_description, signature};
use crate::config::AlipayConfig;
use crate::domain::order::Order;
use crate::domain::payment::{
    NormalizedEvent, PaymentHandle, PaymentMethod, PaymentResult, PaymentStatus, RefundResult,
    WebhookEventKind, WebhookSignature,
};
use crate::domain::ports::PaymentGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

/// QR-code flow via Alipay trade precreate.
///
/// Like PayPal, Alipay expresses amounts as major-unit strings with two
/// decimals. Confirmation is asynchronous via webhook, authenticated with
/// the merchant sign key (`alipay-signature`, key-based HMAC over the raw
/// payload). The order id rides in `passback_params`.
pub struct AlipayGateway {
    http: reqwest::Client,
    cfg: AlipayConfig,
}

#[derive(Debug, Deserialize)]
struct PrecreateEnvelope {
    alipay_trade_precreate_response: PrecreateResponse,
}

#[derive(Debug, Deserialize)]
struct PrecreateResponse {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    qr_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    alipay_trade_query_response: QueryResponse,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    code: String,
    #[serde(default)]
    trade_no: Option<String>,
    #[serde(default)]
    trade_status: Option<String>,
    #[serde(default)]
    total_amount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundEnvelope {
    alipay_trade_refund_response: RefundResponse,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    code: String,
    #[serde(default)]
    trade_no: Option<String>,
    #[serde(default)]
    refund_fee: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookNotification {
    #[serde(default)]
    notify_id: Option<String>,
    trade_status: String,
    out_trade_no: String,
    #[serde(default)]
    trade_no: Option<String>,
    #[serde(default)]
    total_amount: Option<String>,
    #[serde(default)]
    passback_params: Option<String>,
}

fn format_major(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

fn parse_major(value: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|_| PaymentError::ValidationError(format!("unparseable amount: {value}")))
}

fn map_trade_status(status: &str) -> PaymentStatus {
    match status {
        "TRADE_SUCCESS" | "TRADE_FINISHED" => PaymentStatus::Completed,
        "WAIT_BUYER_PAY" => PaymentStatus::Pending,
        _ => PaymentStatus::Failed,
    }
}

impl AlipayGateway {
    pub fn new(cfg: AlipayConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            cfg,
        })
    }

    /// Issues a signed gateway call and returns the raw response body.
    async fn call(&self, method: &str, biz_content: serde_json::Value) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(&json!({
            "app_id": self.cfg.app_id,
            "method": method,
            "notify_url": self.cfg.notify_url,
            "biz_content": biz_content,
        }))?;

        let response = self
            .http
            .post(format!("{}/gateway.do", self.cfg.api_base))
            .header("Content-Type", "application/json")
            .header("alipay-signature", signature::sign(&self.cfg.sign_key, &body))
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(response.to_vec())
    }
}

#[async_trait]
impl PaymentGateway for AlipayGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Alipay
    }

    fn is_configured(&self) -> bool {
        self.cfg.is_configured()
    }

    async fn create_payment(
        &self,
        order: &Order,
        _return_url: &str,
        _cancel_url: &str,
    ) -> Result<PaymentHandle> {
        let out_trade_no = order.id.simple().to_string();
        let body = self
            .call(
                "alipay.trade.precreate",
                json!({
                    "out_trade_no": out_trade_no,
                    "total_amount": format_major(order.total_amount),
                    "subject": order_description(order),
                    "passback_params": order.id.to_string(),
                }),
            )
            .await?;
        let envelope: PrecreateEnvelope = serde_json::from_slice(&body)?;
        let response = envelope.alipay_trade_precreate_response;

        if response.code != "10000" {
            return Err(PaymentError::ProviderUnavailable(format!(
                "alipay precreate failed: {} {}",
                response.code,
                response.msg.unwrap_or_default()
            )));
        }
        let qr_code = response.qr_code.ok_or_else(|| {
            PaymentError::ProviderUnavailable("alipay precreate returned no qr_code".to_string())
        })?;

        Ok(PaymentHandle {
            method: PaymentMethod::Alipay,
            session_id: out_trade_no,
            checkout_url: None,
            qr_code: Some(qr_code),
            expires_at: None,
        })
    }

    async fn verify_payment(&self, handle_id: &str) -> Result<PaymentResult> {
        let body = self
            .call("alipay.trade.query", json!({ "out_trade_no": handle_id }))
            .await?;
        let envelope: QueryEnvelope = serde_json::from_slice(&body)?;
        let response = envelope.alipay_trade_query_response;

        if response.code != "10000" {
            return Err(PaymentError::ProviderUnavailable(format!(
                "alipay query failed: {}",
                response.code
            )));
        }

        let status = response
            .trade_status
            .as_deref()
            .map(map_trade_status)
            .unwrap_or(PaymentStatus::Pending);
        let amount = response
            .total_amount
            .as_deref()
            .map(parse_major)
            .transpose()?
            .unwrap_or(Decimal::ZERO);

        Ok(PaymentResult {
            success: status == PaymentStatus::Completed,
            transaction_id: response.trade_no.unwrap_or_else(|| handle_id.to_string()),
            amount,
            currency: "cny".to_string(),
            method: PaymentMethod::Alipay,
            status,
            timestamp: Utc::now(),
        })
    }

    async fn handle_webhook(
        &self,
        payload: &[u8],
        sig: &WebhookSignature,
    ) -> Result<NormalizedEvent> {
        let header = sig.primary.as_deref().ok_or_else(|| {
            PaymentError::AuthenticationFailed("missing alipay-signature header".to_string())
        })?;
        signature::verify(&self.cfg.sign_key, payload, header)?;

        let event: WebhookNotification = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::ValidationError(format!("alipay webhook body: {e}")))?;

        let kind = match event.trade_status.as_str() {
            "TRADE_SUCCESS" | "TRADE_FINISHED" => WebhookEventKind::PaymentCompleted,
            "TRADE_CLOSED" => WebhookEventKind::PaymentFailed,
            _ => WebhookEventKind::Other,
        };

        let order_id = event
            .passback_params
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok());
        let amount = event
            .total_amount
            .as_deref()
            .map(parse_major)
            .transpose()?;

        Ok(NormalizedEvent {
            kind,
            method: PaymentMethod::Alipay,
            order_id,
            transaction_id: event
                .trade_no
                .or(event.notify_id)
                .unwrap_or(event.out_trade_no),
            amount,
            currency: Some("cny".to_string()),
            raw_type: event.trade_status,
            occurred_at: Utc::now(),
        })
    }

    async fn refund_payment(
        &self,
        handle_id: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult> {
        // Alipay requires an explicit refund amount; resolve a full refund
        // from the trade record first.
        let refund_amount = match amount {
            Some(amount) => amount,
            None => self.verify_payment(handle_id).await?.amount,
        };

        let body = self
            .call(
                "alipay.trade.refund",
                json!({
                    "out_trade_no": handle_id,
                    "refund_amount": format_major(refund_amount),
                }),
            )
            .await?;
        let envelope: RefundEnvelope = serde_json::from_slice(&body)?;
        let response = envelope.alipay_trade_refund_response;

        if response.code != "10000" {
            return Err(PaymentError::ProviderUnavailable(format!(
                "alipay refund failed: {}",
                response.code
            )));
        }

        let refunded = response
            .refund_fee
            .as_deref()
            .map(parse_major)
            .transpose()?
            .unwrap_or(refund_amount);

        Ok(RefundResult {
            refund_id: format!("rf-{handle_id}"),
            transaction_id: response.trade_no.unwrap_or_else(|| handle_id.to_string()),
            amount: refunded,
            status: PaymentStatus::Refunded,
            timestamp: Utc::now(),
        })
    }
}
