use crate::domain::payment::{
    PaymentAttempt, PaymentHandle, PaymentMethod, PaymentResult, PaymentStatus, RefundResult,
};
use crate::domain::ports::{SharedAttemptStore, SharedGateway, SharedOrderStore};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Fixed per-method processing fee rates. Unknown methods fall back to
/// `DEFAULT_FEE_RATE`; callers must not rely on that path for
/// correctness-critical totals.
const DEFAULT_FEE_RATE: Decimal = dec!(0.030);

fn fee_rate(method: &str) -> Decimal {
    match method {
        "stripe" => dec!(0.029),
        "paypal" => dec!(0.034),
        "wechat" => dec!(0.006),
        "alipay" => dec!(0.006),
        _ => DEFAULT_FEE_RATE,
    }
}

/// Pure fee estimate: `amount × rate`.
pub fn calculate_fees(amount: Decimal, method: &str) -> Decimal {
    amount * fee_rate(method)
}

/// Capability row returned by `GET /payments/methods`.
#[derive(Debug, Clone, Serialize)]
pub struct MethodInfo {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub fees: Decimal,
    pub description: String,
}

/// Routes payment operations to the adapter registered for a method.
///
/// The registry is built once at startup; every known method is registered
/// whether or not its credentials are present, so capability queries work
/// for unconfigured gateways while payment operations against them fail
/// with `GatewayNotConfigured`.
pub struct PaymentDispatcher {
    gateways: HashMap<PaymentMethod, SharedGateway>,
    orders: SharedOrderStore,
    attempts: SharedAttemptStore,
    currency: String,
}

impl PaymentDispatcher {
    pub fn new(
        gateways: Vec<SharedGateway>,
        orders: SharedOrderStore,
        attempts: SharedAttemptStore,
        currency: String,
    ) -> Self {
        let gateways = gateways
            .into_iter()
            .map(|gateway| (gateway.method(), gateway))
            .collect();
        Self {
            gateways,
            orders,
            attempts,
            currency,
        }
    }

    fn gateway(&self, method: PaymentMethod) -> Result<&SharedGateway> {
        self.gateways
            .get(&method)
            .ok_or_else(|| PaymentError::UnsupportedMethod(method.to_string()))
    }

    fn configured_gateway(&self, method: PaymentMethod) -> Result<&SharedGateway> {
        let gateway = self.gateway(method)?;
        if !gateway.is_configured() {
            return Err(PaymentError::GatewayNotConfigured(method.to_string()));
        }
        Ok(gateway)
    }

    /// Opens a payment session for an order.
    ///
    /// Validates the order (exists, non-empty items, positive total),
    /// enforces the single-active-attempt invariant, and records a
    /// `PaymentAttempt` only after the provider call succeeded. A timed-out
    /// create leaves nothing behind, so the buyer can retry cleanly.
    pub async fn create_payment(
        &self,
        method: PaymentMethod,
        order_id: Uuid,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<PaymentHandle> {
        let gateway = self.configured_gateway(method)?;

        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;
        if order.items.is_empty() {
            return Err(PaymentError::ValidationError(format!(
                "order {order_id} has no items"
            )));
        }
        if order.total_amount <= Decimal::ZERO {
            return Err(PaymentError::ValidationError(format!(
                "order {order_id} has a non-positive total"
            )));
        }
        if let Some(active) = self.attempts.active_for_order(order_id).await? {
            return Err(PaymentError::ValidationError(format!(
                "order {order_id} already has an active {} payment attempt",
                active.method
            )));
        }

        let handle = gateway.create_payment(&order, return_url, cancel_url).await?;

        self.attempts
            .record(PaymentAttempt {
                order_id,
                method,
                handle_id: handle.session_id.clone(),
                amount: order.total_amount,
                currency: self.currency.clone(),
                status: PaymentStatus::Pending,
                created_at: Utc::now(),
            })
            .await?;
        info!(%order_id, %method, session = %handle.session_id, "payment session created");

        Ok(handle)
    }

    /// Polls the provider for a session's status and finalizes the recorded
    /// attempt once the provider reports a settled outcome.
    pub async fn verify_payment(
        &self,
        method: PaymentMethod,
        handle_id: &str,
    ) -> Result<PaymentResult> {
        let gateway = self.configured_gateway(method)?;
        let result = gateway.verify_payment(handle_id).await?;
        if !result.status.is_active() {
            self.attempts.finalize(handle_id, result.status).await?;
        }
        Ok(result)
    }

    pub async fn refund_payment(
        &self,
        method: PaymentMethod,
        handle_id: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult> {
        let gateway = self.configured_gateway(method)?;
        let result = gateway.refund_payment(handle_id, amount).await?;
        self.attempts
            .finalize(handle_id, PaymentStatus::Refunded)
            .await?;
        info!(%handle_id, %method, amount = ?amount, "refund issued");
        Ok(result)
    }

    /// Authenticates and normalizes a raw webhook payload for a method.
    pub async fn handle_webhook(
        &self,
        method: PaymentMethod,
        payload: &[u8],
        signature: &crate::domain::payment::WebhookSignature,
    ) -> Result<crate::domain::payment::NormalizedEvent> {
        let gateway = self.gateway(method)?;
        gateway.handle_webhook(payload, signature).await
    }

    /// Marks the attempt behind a normalized event with its settled status.
    pub async fn finalize_attempt(&self, handle_id: &str, status: PaymentStatus) -> Result<()> {
        self.attempts.finalize(handle_id, status).await
    }

    /// Finalizes whatever attempt is still active for an order. Webhook
    /// events do not always carry the session id the attempt was recorded
    /// under, but they do carry the order id.
    pub async fn finalize_active(&self, order_id: Uuid, status: PaymentStatus) -> Result<()> {
        if let Some(attempt) = self.attempts.active_for_order(order_id).await? {
            self.attempts.finalize(&attempt.handle_id, status).await?;
        }
        Ok(())
    }

    /// All registered method identifiers, configured or not.
    pub fn supported_methods(&self) -> Vec<PaymentMethod> {
        let mut methods: Vec<_> = self.gateways.keys().copied().collect();
        methods.sort_by_key(|m| m.as_str());
        methods
    }

    pub fn method_infos(&self) -> Vec<MethodInfo> {
        self.supported_methods()
            .into_iter()
            .map(|method| {
                let gateway = &self.gateways[&method];
                MethodInfo {
                    id: method.as_str().to_string(),
                    name: method.display_name().to_string(),
                    enabled: gateway.is_configured(),
                    fees: fee_rate(method.as_str()),
                    description: match method {
                        PaymentMethod::Stripe => "Card checkout session".to_string(),
                        PaymentMethod::Paypal => "PayPal redirect approval".to_string(),
                        PaymentMethod::Wechat => "WeChat Pay QR code".to_string(),
                        PaymentMethod::Alipay => "Alipay QR code".to_string(),
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, OrderItem};
    use crate::domain::payment::{NormalizedEvent, WebhookSignature};
    use crate::domain::ports::{OrderStore, PaymentGateway};
    use crate::infrastructure::in_memory::{InMemoryAttemptStore, InMemoryOrderStore};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FakeGateway {
        method: PaymentMethod,
        configured: bool,
        fail_create: bool,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        fn method(&self) -> PaymentMethod {
            self.method
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn create_payment(
            &self,
            order: &Order,
            _return_url: &str,
            _cancel_url: &str,
        ) -> Result<PaymentHandle> {
            if self.fail_create {
                return Err(PaymentError::ProviderUnavailable("timeout".to_string()));
            }
            Ok(PaymentHandle {
                method: self.method,
                session_id: format!("sess_{}", order.id.simple()),
                checkout_url: Some("https://checkout.example/s".to_string()),
                qr_code: None,
                expires_at: None,
            })
        }

        async fn verify_payment(&self, handle_id: &str) -> Result<PaymentResult> {
            Ok(PaymentResult {
                success: false,
                transaction_id: handle_id.to_string(),
                amount: Decimal::ZERO,
                currency: "usd".to_string(),
                method: self.method,
                status: PaymentStatus::Pending,
                timestamp: Utc::now(),
            })
        }

        async fn handle_webhook(
            &self,
            _payload: &[u8],
            _signature: &WebhookSignature,
        ) -> Result<NormalizedEvent> {
            Err(PaymentError::AuthenticationFailed("fake".to_string()))
        }

        async fn refund_payment(
            &self,
            handle_id: &str,
            amount: Option<Decimal>,
        ) -> Result<RefundResult> {
            Ok(RefundResult {
                refund_id: format!("re_{handle_id}"),
                transaction_id: handle_id.to_string(),
                amount: amount.unwrap_or(Decimal::ZERO),
                status: PaymentStatus::Refunded,
                timestamp: Utc::now(),
            })
        }
    }

    fn sample_order() -> Order {
        Order::new(
            "user-1".to_string(),
            None,
            None,
            vec![OrderItem {
                product_id: "mug-custom".to_string(),
                size: None,
                accessories: vec![],
                customizations: Default::default(),
                quantity: 2,
                unit_price: dec!(24.95),
                total_price: dec!(49.90),
            }],
            None,
        )
    }

    async fn setup(gateways: Vec<SharedGateway>) -> (PaymentDispatcher, Uuid) {
        let orders = Arc::new(InMemoryOrderStore::new());
        let attempts = Arc::new(InMemoryAttemptStore::new());
        let order = sample_order();
        let order_id = order.id;
        orders.insert_order(order).await.unwrap();
        (
            PaymentDispatcher::new(gateways, orders, attempts, "usd".to_string()),
            order_id,
        )
    }

    fn fake(method: PaymentMethod) -> SharedGateway {
        Arc::new(FakeGateway {
            method,
            configured: true,
            fail_create: false,
        })
    }

    #[test]
    fn test_fee_table() {
        assert_eq!(calculate_fees(dec!(100.00), "stripe"), dec!(2.900));
        assert_eq!(calculate_fees(dec!(100.00), "paypal"), dec!(3.400));
        assert_eq!(calculate_fees(dec!(100.00), "wechat"), dec!(0.600));
        assert_eq!(calculate_fees(dec!(100.00), "alipay"), dec!(0.600));
        // Unknown methods fall back to 3% instead of erroring.
        assert_eq!(calculate_fees(dec!(100.00), "carrier_pigeon"), dec!(3.000));
    }

    #[tokio::test]
    async fn test_unsupported_method_rejected() {
        let (dispatcher, order_id) = setup(vec![fake(PaymentMethod::Stripe)]).await;
        let err = dispatcher
            .create_payment(PaymentMethod::Alipay, order_id, "http://r", "http://c")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::UnsupportedMethod(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_rejected_but_listed() {
        let unconfigured: SharedGateway = Arc::new(FakeGateway {
            method: PaymentMethod::Wechat,
            configured: false,
            fail_create: false,
        });
        let (dispatcher, order_id) = setup(vec![fake(PaymentMethod::Stripe), unconfigured]).await;

        let err = dispatcher
            .create_payment(PaymentMethod::Wechat, order_id, "http://r", "http://c")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::GatewayNotConfigured(_)));

        // Capability queries still report the method.
        assert_eq!(
            dispatcher.supported_methods(),
            vec![PaymentMethod::Stripe, PaymentMethod::Wechat]
        );
        let infos = dispatcher.method_infos();
        let wechat = infos.iter().find(|i| i.id == "wechat").unwrap();
        assert!(!wechat.enabled);
    }

    #[tokio::test]
    async fn test_create_records_single_active_attempt() {
        let (dispatcher, order_id) = setup(vec![fake(PaymentMethod::Stripe)]).await;

        let handle = dispatcher
            .create_payment(PaymentMethod::Stripe, order_id, "http://r", "http://c")
            .await
            .unwrap();
        assert!(handle.checkout_url.is_some());

        let err = dispatcher
            .create_payment(PaymentMethod::Stripe, order_id, "http://r", "http://c")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ValidationError(_)));

        // Finalizing the attempt frees the slot.
        dispatcher
            .finalize_attempt(&handle.session_id, PaymentStatus::Failed)
            .await
            .unwrap();
        dispatcher
            .create_payment(PaymentMethod::Stripe, order_id, "http://r", "http://c")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_create_records_nothing() {
        let failing: SharedGateway = Arc::new(FakeGateway {
            method: PaymentMethod::Stripe,
            configured: true,
            fail_create: true,
        });
        let (dispatcher, order_id) = setup(vec![failing]).await;

        let err = dispatcher
            .create_payment(PaymentMethod::Stripe, order_id, "http://r", "http://c")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ProviderUnavailable(_)));

        // No attempt recorded, so a retry is not blocked.
        assert!(
            dispatcher
                .attempts
                .active_for_order(order_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_create_for_missing_order() {
        let (dispatcher, _) = setup(vec![fake(PaymentMethod::Stripe)]).await;
        let err = dispatcher
            .create_payment(PaymentMethod::Stripe, Uuid::new_v4(), "http://r", "http://c")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::OrderNotFound(_)));
    }
}
