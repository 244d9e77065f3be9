use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use orderflow::application::dispatcher::PaymentDispatcher;
use orderflow::application::lifecycle::OrderLifecycle;
use orderflow::config::{
    AlipayConfig, AppConfig, CallbackConfig, GatewaysConfig, HttpConfig, PaypalConfig,
    StripeConfig, WechatConfig,
};
use orderflow::domain::order::{Order, OrderStatus};
use orderflow::domain::payment::{
    NormalizedEvent, PaymentHandle, PaymentMethod, PaymentResult, PaymentStatus, RefundResult,
    WebhookSignature,
};
use orderflow::domain::ports::{NotificationSink, PaymentGateway, SharedGateway, SharedOrderStore};
use orderflow::error::Result;
use orderflow::infrastructure::gateways::alipay::AlipayGateway;
use orderflow::infrastructure::gateways::paypal::PaypalGateway;
use orderflow::infrastructure::gateways::signature;
use orderflow::infrastructure::gateways::stripe::StripeGateway;
use orderflow::infrastructure::gateways::wechat::WechatGateway;
use orderflow::infrastructure::in_memory::{InMemoryAttemptStore, InMemoryOrderStore};
use orderflow::interfaces::http::{AppState, router};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;
use uuid::Uuid;

pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";
pub const WECHAT_API_KEY: &str = "wx-api-key";

/// Notification sink that counts dispatches, for asserting exactly-once
/// delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: AtomicUsize,
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send_order_status_update(
        &self,
        _order: &Order,
        _email: Option<&str>,
        _phone: Option<&str>,
        _old_status: OrderStatus,
    ) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Test double that keeps the real adapter's webhook authentication while
/// faking the network-bound operations, so full checkout flows run
/// in-process.
pub struct WebhookOnlyGateway {
    pub inner: SharedGateway,
    pub verify_succeeds: bool,
}

#[async_trait]
impl PaymentGateway for WebhookOnlyGateway {
    fn method(&self) -> PaymentMethod {
        self.inner.method()
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn create_payment(
        &self,
        order: &Order,
        _return_url: &str,
        _cancel_url: &str,
    ) -> Result<PaymentHandle> {
        Ok(PaymentHandle {
            method: self.method(),
            session_id: format!("cs_test_{}", order.id.simple()),
            checkout_url: Some("https://checkout.example/session".to_string()),
            qr_code: None,
            expires_at: None,
        })
    }

    async fn verify_payment(&self, handle_id: &str) -> Result<PaymentResult> {
        Ok(PaymentResult {
            success: self.verify_succeeds,
            transaction_id: format!("txn_{handle_id}"),
            amount: Decimal::ZERO,
            currency: "usd".to_string(),
            method: self.method(),
            status: if self.verify_succeeds {
                PaymentStatus::Completed
            } else {
                PaymentStatus::Pending
            },
            timestamp: Utc::now(),
        })
    }

    async fn handle_webhook(
        &self,
        payload: &[u8],
        sig: &WebhookSignature,
    ) -> Result<NormalizedEvent> {
        self.inner.handle_webhook(payload, sig).await
    }

    async fn refund_payment(
        &self,
        handle_id: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult> {
        Ok(RefundResult {
            refund_id: format!("re_{handle_id}"),
            transaction_id: handle_id.to_string(),
            amount: amount.unwrap_or(dec!(299.00)),
            status: PaymentStatus::Refunded,
            timestamp: Utc::now(),
        })
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        http: HttpConfig {
            address: "127.0.0.1:0".to_string(),
        },
        currency: "usd".to_string(),
        callbacks: CallbackConfig {
            return_url: "http://localhost:3000/payment/return".to_string(),
            cancel_url: "http://localhost:3000/payment/cancel".to_string(),
        },
        production_lead_days: 14,
        gateways: GatewaysConfig {
            stripe: StripeConfig {
                secret_key: "sk_test_123".to_string(),
                webhook_secret: STRIPE_WEBHOOK_SECRET.to_string(),
                api_base: "https://api.stripe.com".to_string(),
            },
            paypal: PaypalConfig {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                webhook_id: "wh-1".to_string(),
                api_base: "https://api-m.paypal.com".to_string(),
            },
            wechat: WechatConfig {
                mch_id: "1230000109".to_string(),
                api_key: WECHAT_API_KEY.to_string(),
                api_base: "https://api.mch.weixin.qq.com".to_string(),
                notify_url: "https://shop.example/payments/webhook/wechat".to_string(),
            },
            alipay: AlipayConfig {
                app_id: String::new(),
                sign_key: String::new(),
                api_base: "https://openapi.alipay.com".to_string(),
                notify_url: String::new(),
            },
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub orders: SharedOrderStore,
    pub notifier: Arc<RecordingNotifier>,
}

/// Wires a full application with in-memory stores. Stripe and WeChat keep
/// their real webhook authentication (wrapped so create/verify stay
/// offline); Alipay is left unconfigured to exercise capability queries.
pub fn test_app(verify_succeeds: bool) -> TestApp {
    let config = Arc::new(test_config());
    let orders: SharedOrderStore = Arc::new(InMemoryOrderStore::new());
    let attempts = Arc::new(InMemoryAttemptStore::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let stripe = StripeGateway::new(config.gateways.stripe.clone(), config.currency.clone())
        .expect("stripe gateway");
    let wechat = WechatGateway::new(config.gateways.wechat.clone(), config.currency.clone())
        .expect("wechat gateway");
    let paypal = PaypalGateway::new(config.gateways.paypal.clone(), config.currency.clone())
        .expect("paypal gateway");
    let alipay = AlipayGateway::new(config.gateways.alipay.clone()).expect("alipay gateway");

    let gateways: Vec<SharedGateway> = vec![
        Arc::new(WebhookOnlyGateway {
            inner: Arc::new(stripe),
            verify_succeeds,
        }),
        Arc::new(WebhookOnlyGateway {
            inner: Arc::new(wechat),
            verify_succeeds,
        }),
        Arc::new(paypal),
        Arc::new(alipay),
    ];

    let dispatcher = Arc::new(PaymentDispatcher::new(
        gateways,
        orders.clone(),
        attempts,
        config.currency.clone(),
    ));
    let lifecycle = Arc::new(OrderLifecycle::new(orders.clone(), notifier.clone()));

    let state = AppState {
        config,
        orders: orders.clone(),
        lifecycle,
        dispatcher,
    };

    TestApp {
        router: router(state),
        orders,
        notifier,
    }
}

/// Signs a payload the way Stripe's webhook scheme expects.
pub fn stripe_signature_header(payload: &[u8]) -> String {
    let timestamp = "1754500000";
    let mut signed = timestamp.as_bytes().to_vec();
    signed.push(b'.');
    signed.extend_from_slice(payload);
    let v1 = signature::sign(STRIPE_WEBHOOK_SECRET, &signed);
    format!("t={timestamp},v1={v1}")
}

pub fn stripe_completed_payload(order_id: Uuid, amount_minor: i64) -> Vec<u8> {
    json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "created": 1754500000,
        "data": {
            "object": {
                "id": format!("cs_test_{}", order_id.simple()),
                "payment_intent": "pi_123",
                "amount_total": amount_minor,
                "currency": "usd",
                "metadata": { "order_id": order_id.to_string() }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, value)
}

/// Raw-body POST used by webhook tests, where the exact bytes matter.
pub async fn post_raw(
    router: &Router,
    uri: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("POST").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Creates an order over the API and returns its id.
pub async fn create_order_via_api(router: &Router, total: Decimal) -> Uuid {
    let (status, body) = request(
        router,
        "POST",
        "/orders",
        Some(json!({
            "userId": "user-1",
            "email": "buyer@example.com",
            "items": [{
                "productId": "hoodie-custom",
                "size": "M",
                "quantity": 1,
                "unitPrice": total,
            }]
        })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "order creation failed: {body}");
    body["data"]["id"].as_str().unwrap().parse().unwrap()
}
