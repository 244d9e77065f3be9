use super::order::{Order, OrderStatus, TimelineEntry};
use super::payment::{
    NormalizedEvent, PaymentAttempt, PaymentHandle, PaymentMethod, PaymentResult, PaymentStatus,
    RefundResult, WebhookSignature,
};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;

    async fn insert_order(&self, order: Order) -> Result<()>;

    /// Conditionally applies a status change: the entry is recorded only if
    /// the order's current status still equals `expected`. Returns the
    /// updated order when applied, `None` when another writer got there
    /// first. This is the compare-and-set primitive the lifecycle
    /// controller's retry loop is built on.
    async fn update_order_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
    ) -> Result<Option<Order>>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn record(&self, attempt: PaymentAttempt) -> Result<()>;

    async fn get(&self, handle_id: &str) -> Result<Option<PaymentAttempt>>;

    async fn active_for_order(&self, order_id: Uuid) -> Result<Option<PaymentAttempt>>;

    /// Marks an attempt with its final provider outcome. Unknown handles are
    /// ignored (a webhook can arrive for a session created before restart).
    async fn finalize(&self, handle_id: &str, status: PaymentStatus) -> Result<()>;
}

/// Outbound notification collaborator. Content rendering and delivery live
/// outside this core; failures must never affect order state.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_order_status_update(
        &self,
        order: &Order,
        email: Option<&str>,
        phone: Option<&str>,
        old_status: OrderStatus,
    ) -> Result<()>;
}

/// Uniform contract each payment provider is wrapped behind. The registry
/// holds these as trait objects so tests can substitute fakes.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// False when provider credentials are missing. Unconfigured gateways
    /// stay registered so capability queries keep working.
    fn is_configured(&self) -> bool;

    /// Opens a provider session for the order. Must embed the order id in
    /// provider metadata so webhook events can be correlated back without a
    /// lookup table. Never touches the order itself.
    async fn create_payment(
        &self,
        order: &Order,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<PaymentHandle>;

    /// Synchronous poll against the provider. Anything short of the
    /// provider's paid/completed state comes back as a non-success result.
    async fn verify_payment(&self, handle_id: &str) -> Result<PaymentResult>;

    /// Authenticates and normalizes an inbound webhook payload. Must fail
    /// with `AuthenticationFailed` before interpreting an unauthenticated
    /// payload.
    async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &WebhookSignature,
    ) -> Result<NormalizedEvent>;

    /// Partial refund when `amount` is given, full refund otherwise.
    async fn refund_payment(
        &self,
        handle_id: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult>;
}

pub type SharedOrderStore = Arc<dyn OrderStore>;
pub type SharedAttemptStore = Arc<dyn AttemptStore>;
pub type SharedNotificationSink = Arc<dyn NotificationSink>;
pub type SharedGateway = Arc<dyn PaymentGateway>;
