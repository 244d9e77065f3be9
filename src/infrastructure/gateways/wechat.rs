use super::{http_client, order_description, signature};
use crate::config::WechatConfig;
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
use serde_json::json;
use uuid::Uuid;

/// QR-code flow via WeChat Pay native transactions.
///
/// Amounts cross this boundary in minor units (fen). Confirmation is
/// asynchronous: the buyer scans the returned `code_url` and the provider
/// reports the outcome by webhook, authenticated with the merchant API key
/// (`wechatpay-signature`, key-based HMAC over the raw payload). The order
/// id rides in `attach`.
pub struct WechatGateway {
    http: reqwest::Client,
    cfg: WechatConfig,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct NativeCreateResponse {
    code_url: String,
}

#[derive(Debug, Deserialize)]
struct TransactionState {
    #[serde(default)]
    transaction_id: Option<String>,
    out_trade_no: String,
    trade_state: String,
    #[serde(default)]
    amount: Option<AmountBlock>,
}

#[derive(Debug, Deserialize)]
struct AmountBlock {
    total: i64,
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
    #[serde(default)]
    transaction_id: Option<String>,
    out_trade_no: String,
    #[serde(default)]
    attach: Option<String>,
    #[serde(default)]
    amount: Option<AmountBlock>,
}

fn map_trade_state(state: &str) -> PaymentStatus {
    match state {
        "SUCCESS" => PaymentStatus::Completed,
        "USERPAYING" | "NOTPAY" => PaymentStatus::Pending,
        "REFUND" => PaymentStatus::Refunded,
        _ => PaymentStatus::Failed,
    }
}

impl WechatGateway {
    pub fn new(cfg: WechatConfig, currency: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            cfg,
            currency: currency.to_uppercase(),
        })
    }

    /// Key-based request authentication over the exact bytes sent.
    fn auth_header(&self, body: &[u8]) -> String {
        format!(
            "WECHATPAY2-HMAC-SHA256 mchid=\"{}\",signature=\"{}\"",
            self.cfg.mch_id,
            signature::sign(&self.cfg.api_key, body)
        )
    }

    async fn fetch_transaction(&self, out_trade_no: &str) -> Result<TransactionState> {
        let state = self
            .http
            .get(format!(
                "{}/v3/pay/transactions/out-trade-no/{out_trade_no}?mchid={}",
                self.cfg.api_base, self.cfg.mch_id
            ))
            .header("Authorization", self.auth_header(&[]))
            .send()
            .await?
            .error_for_status()?
            .json::<TransactionState>()
            .await?;
        Ok(state)
    }
}

#[async_trait]
impl PaymentGateway for WechatGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Wechat
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
        // Provider limits out_trade_no to 32 chars; the hyphen-less uuid
        // fits exactly. The full order id still travels in `attach`.
        let out_trade_no = order.id.simple().to_string();
        let body = serde_json::to_vec(&json!({
            "mchid": self.cfg.mch_id,
            "description": order_description(order),
            "out_trade_no": out_trade_no,
            "notify_url": self.cfg.notify_url,
            "attach": order.id.to_string(),
            "amount": {
                "total": to_minor_units(order.total_amount)?,
                "currency": self.currency,
            },
        }))?;

        let created = self
            .http
            .post(format!("{}/v3/pay/transactions/native", self.cfg.api_base))
            .header("Authorization", self.auth_header(&body))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json::<NativeCreateResponse>()
            .await?;

        Ok(PaymentHandle {
            method: PaymentMethod::Wechat,
            session_id: out_trade_no,
            checkout_url: None,
            qr_code: Some(created.code_url),
            expires_at: None,
        })
    }

    async fn verify_payment(&self, handle_id: &str) -> Result<PaymentResult> {
        let state = self.fetch_transaction(handle_id).await?;
        let status = map_trade_state(&state.trade_state);

        Ok(PaymentResult {
            success: status == PaymentStatus::Completed,
            transaction_id: state.transaction_id.unwrap_or(state.out_trade_no),
            amount: state
                .amount
                .map(|a| from_minor_units(a.total))
                .unwrap_or(Decimal::ZERO),
            currency: self.currency.clone(),
            method: PaymentMethod::Wechat,
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
            PaymentError::AuthenticationFailed("missing wechatpay-signature header".to_string())
        })?;
        signature::verify(&self.cfg.api_key, payload, header)?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::ValidationError(format!("wechat webhook body: {e}")))?;

        let kind = match event.event_type.as_str() {
            "TRANSACTION.SUCCESS" => WebhookEventKind::PaymentCompleted,
            "TRANSACTION.CLOSED" | "TRANSACTION.PAYERROR" => WebhookEventKind::PaymentFailed,
            "REFUND.SUCCESS" => WebhookEventKind::Refunded,
            _ => WebhookEventKind::Other,
        };

        let resource = event.resource;
        let order_id = resource
            .attach
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok());

        Ok(NormalizedEvent {
            kind,
            method: PaymentMethod::Wechat,
            order_id,
            transaction_id: resource
                .transaction_id
                .unwrap_or_else(|| resource.out_trade_no.clone()),
            amount: resource.amount.map(|a| from_minor_units(a.total)),
            currency: Some(self.currency.clone()),
            raw_type: event.event_type,
            occurred_at: event.create_time.unwrap_or_else(Utc::now),
        })
    }

    async fn refund_payment(
        &self,
        handle_id: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult> {
        // The refund block needs the original total; fetch it when the
        // caller asked for a full refund.
        let state = self.fetch_transaction(handle_id).await?;
        let total_minor = state
            .amount
            .as_ref()
            .map(|a| a.total)
            .ok_or_else(|| PaymentError::PaymentNotCompleted(format!("no amount on {handle_id}")))?;
        let refund_minor = match amount {
            Some(amount) => to_minor_units(amount)?,
            None => total_minor,
        };

        let out_refund_no = format!("rf-{handle_id}");
        let body = serde_json::to_vec(&json!({
            "out_trade_no": handle_id,
            "out_refund_no": out_refund_no,
            "amount": {
                "refund": refund_minor,
                "total": total_minor,
                "currency": self.currency,
            },
        }))?;

        #[derive(Debug, Deserialize)]
        struct RefundResponse {
            refund_id: String,
        }

        let refund = self
            .http
            .post(format!("{}/v3/refund/domestic/refunds", self.cfg.api_base))
            .header("Authorization", self.auth_header(&body))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json::<RefundResponse>()
            .await?;

        Ok(RefundResult {
            refund_id: refund.refund_id,
            transaction_id: state.transaction_id.unwrap_or_else(|| handle_id.to_string()),
            amount: from_minor_units(refund_minor),
            status: PaymentStatus::Refunded,
            timestamp: Utc::now(),
        })
    }
}
